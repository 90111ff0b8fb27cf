//! Reference expressions and their resolution
//!
//! A reference is a `${...}` expression inside a string value of a template:
//!
//! - `${bucket}` - the whole value of the top-level entry `bucket`
//! - `${bucket.arn}` - a field of that entry
//! - `${subnets.0.id}` - numeric segments index into lists
//! - `${env.AWS_REGION}` - a process environment variable
//!
//! Resolution walks a [`serde_json::Value`] and replaces every reference in a
//! string. A string that consists of exactly one reference is replaced by the
//! referenced value with its type intact; references embedded in longer text
//! are spliced in and must point at strings. Mapping keys are never rewritten.
//!
//! What a reference points at depends on the [`ReferenceScope`]:
//!
//! - [`StaticScope`] resolves against the template itself and defers
//!   references to component aliases, since their outputs do not exist yet
//! - [`OutputScope`] resolves against the outputs of components that already ran

use crate::core::StackError;
use anyhow::Result;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use strsim::levenshtein;

/// Pattern for a single reference expression.
static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([\w-]+(?:\.[\w-]+)*)\}").expect("reference pattern is a valid regex")
});

/// Root segment that addresses the process environment.
pub const ENV_ROOT: &str = "env";

/// Suggestions must be within this percentage of the target length in edit distance.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// A parsed `${...}` expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// The expression as written, including `${` and `}`
    pub expression: String,
    /// Dot-separated segments, never empty
    pub path: Vec<String>,
}

impl Reference {
    fn parse(expression: &str, inner: &str) -> Self {
        Self {
            expression: expression.to_string(),
            path: inner.split('.').map(str::to_string).collect(),
        }
    }

    /// The top-level segment: a template key, a component alias, or `env`.
    pub fn root(&self) -> &str {
        &self.path[0]
    }

    /// Segments after the root.
    pub fn rest(&self) -> &[String] {
        &self.path[1..]
    }

    /// Whether this reference reads the process environment.
    pub fn is_env(&self) -> bool {
        self.root() == ENV_ROOT
    }
}

/// All references in `text`, left to right.
pub fn find_references(text: &str) -> Vec<Reference> {
    REFERENCE_PATTERN
        .captures_iter(text)
        .map(|caps| Reference::parse(&caps[0], &caps[1]))
        .collect()
}

/// All references anywhere in the string values of `value`.
pub fn collect_references(value: &Value) -> Vec<Reference> {
    let mut found = Vec::new();
    collect_into(value, &mut found);
    found
}

fn collect_into(value: &Value, found: &mut Vec<Reference>) {
    match value {
        Value::String(text) => found.extend(find_references(text)),
        Value::Array(items) => items.iter().for_each(|item| collect_into(item, found)),
        Value::Object(map) => map.values().for_each(|item| collect_into(item, found)),
        _ => {}
    }
}

/// What a scope says about a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The reference resolves to this value
    Value(Value),
    /// The reference cannot be resolved yet and must stay verbatim
    Defer,
}

/// The context references are resolved against.
pub trait ReferenceScope {
    /// Look up a single reference.
    fn lookup(&self, reference: &Reference) -> Result<Lookup>;
}

/// Result of resolving a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The value with every resolvable reference replaced
    pub value: Value,
    /// Expressions that were replaced, in traversal order
    pub substituted: Vec<String>,
}

/// Replace every reference in `value` according to `scope`.
pub fn resolve_value(value: &Value, scope: &dyn ReferenceScope) -> Result<Resolution> {
    let mut substituted = Vec::new();
    let value = resolve_inner(value, scope, &mut substituted)?;
    Ok(Resolution {
        value,
        substituted,
    })
}

fn resolve_inner(
    value: &Value,
    scope: &dyn ReferenceScope,
    substituted: &mut Vec<String>,
) -> Result<Value> {
    match value {
        Value::String(text) => resolve_string(text, scope, substituted),
        Value::Array(items) => Ok(Value::Array(
            items.iter().map(|item| resolve_inner(item, scope, substituted)).collect::<Result<_>>()?,
        )),
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_inner(item, scope, substituted)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(
    text: &str,
    scope: &dyn ReferenceScope,
    substituted: &mut Vec<String>,
) -> Result<Value> {
    let matches: Vec<_> = REFERENCE_PATTERN.captures_iter(text).collect();
    if matches.is_empty() {
        return Ok(Value::String(text.to_string()));
    }

    // A lone reference keeps the type of whatever it points at
    if let [caps] = matches.as_slice() {
        if caps[0].len() == text.len() {
            let reference = Reference::parse(&caps[0], &caps[1]);
            return match scope.lookup(&reference)? {
                Lookup::Value(found) => {
                    substituted.push(reference.expression);
                    Ok(found)
                }
                Lookup::Defer => Ok(Value::String(text.to_string())),
            };
        }
    }

    let mut spliced = String::with_capacity(text.len());
    let mut last = 0;
    for caps in &matches {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        spliced.push_str(&text[last..whole.start]);
        last = whole.end;

        let reference = Reference::parse(&caps[0], &caps[1]);
        match scope.lookup(&reference)? {
            Lookup::Value(Value::String(found)) => {
                spliced.push_str(&found);
                substituted.push(reference.expression);
            }
            Lookup::Value(other) => {
                return Err(StackError::NonStringInterpolation {
                    expression: reference.expression,
                    text: text.to_string(),
                    value_type: type_name(&other).to_string(),
                }
                .into());
            }
            Lookup::Defer => spliced.push_str(&reference.expression),
        }
    }
    spliced.push_str(&text[last..]);
    Ok(Value::String(spliced))
}

/// Follow `segments` into `value`. Numeric segments index lists.
pub fn lookup_path<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

/// JSON type name used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Resolve `${env.NAME}`. An unset variable is an error, never an empty string.
fn lookup_env(reference: &Reference) -> Result<Lookup> {
    let [name] = reference.rest() else {
        return Err(StackError::UnresolvedReference {
            expression: reference.expression.clone(),
        }
        .into());
    };
    match std::env::var(name) {
        Ok(found) => Ok(Lookup::Value(Value::String(found))),
        Err(_) => Err(StackError::UnresolvedReference {
            expression: reference.expression.clone(),
        }
        .into()),
    }
}

/// Whether a template entry declares a component rather than a static value.
pub fn is_component_declaration(entry: &Value) -> bool {
    matches!(entry.get("component"), Some(Value::String(_)))
}

/// Template keys closest to `target`, best first.
pub fn similar_keys<'a>(target: &str, available: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut scored: Vec<_> =
        available.into_iter().map(|key| (key.clone(), levenshtein(target, key))).collect();

    scored.sort_by(|(a_key, a_dist), (b_key, b_dist)| a_dist.cmp(b_dist).then(a_key.cmp(b_key)));

    scored
        .into_iter()
        .filter(|(_, dist)| *dist <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
        .take(3)
        .map(|(key, _)| key)
        .collect()
}

/// Resolves against the template's own entries.
pub struct StaticScope<'a> {
    entries: &'a Map<String, Value>,
}

impl<'a> StaticScope<'a> {
    /// Scope over a snapshot of the template entries.
    pub fn new(entries: &'a Map<String, Value>) -> Self {
        Self {
            entries,
        }
    }
}

impl ReferenceScope for StaticScope<'_> {
    fn lookup(&self, reference: &Reference) -> Result<Lookup> {
        if reference.is_env() {
            return lookup_env(reference);
        }

        let Some(entry) = self.entries.get(reference.root()) else {
            return Err(StackError::UnknownReference {
                expression: reference.expression.clone(),
                root: reference.root().to_string(),
                suggestions: similar_keys(reference.root(), self.entries.keys()),
            }
            .into());
        };

        if is_component_declaration(entry) {
            return Ok(Lookup::Defer);
        }

        lookup_path(entry, reference.rest()).map(|found| Lookup::Value(found.clone())).ok_or_else(
            || {
                StackError::UnresolvedReference {
                    expression: reference.expression.clone(),
                }
                .into()
            },
        )
    }
}

/// Resolves against outputs of components that have already run.
pub struct OutputScope<'a> {
    outputs: &'a BTreeMap<String, Value>,
}

impl<'a> OutputScope<'a> {
    /// Scope over the outputs collected so far.
    pub fn new(outputs: &'a BTreeMap<String, Value>) -> Self {
        Self {
            outputs,
        }
    }
}

impl ReferenceScope for OutputScope<'_> {
    fn lookup(&self, reference: &Reference) -> Result<Lookup> {
        if reference.is_env() {
            return lookup_env(reference);
        }

        self.outputs
            .get(reference.root())
            .and_then(|outputs| lookup_path(outputs, reference.rest()))
            .map(|found| Lookup::Value(found.clone()))
            .ok_or_else(|| {
                StackError::UnresolvedReference {
                    expression: reference.expression.clone(),
                }
                .into()
            })
    }
}
