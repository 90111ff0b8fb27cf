//! Error handling for Stackweave
//!
//! This module provides the error type shared by every stage of a deployment and the
//! user-friendly reporting used by the CLI. The error system follows two principles:
//! 1. **Strongly-typed errors** so callers (and tests) can match on the exact failure
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`StackError`] - Enumerated error types for all failure cases
//! - [`ErrorContext`] - Wrapper that adds details and a suggestion for display
//!
//! # Error Categories
//!
//! - **Configuration** (fatal, raised before any component runs): malformed templates,
//!   unknown or unresolvable references, circular dependencies, missing components
//! - **Resolution** (fatal, mid-run): references that cannot be satisfied at execution
//!   time, a schedule that stops making progress
//! - **Invocation**: a component's deploy or teardown operation failed
//! - **Dispatch**: a custom operation was requested on a component that lacks it
//! - **Storage**: persisted state could not be read or written
//!
//! Errors travel through the crate inside [`anyhow::Error`]; use [`user_friendly_error`]
//! at the edge to recover the typed error and attach suggestions.
//!
//! # Examples
//!
//! ```rust,no_run
//! use stackweave_cli::core::{StackError, user_friendly_error};
//!
//! let error = StackError::UnknownAlias {
//!     alias: "bucket".to_string(),
//! };
//! let context = user_friendly_error(anyhow::Error::from(error));
//! context.display(); // Colored error with a suggestion
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for Stackweave operations
///
/// Each variant names the offending alias, expression, path or cycle so that no
/// failure surfaces without enough context to fix it.
///
/// # Error Categories
///
/// ## Template
/// - [`TemplateNotFound`] - Template path does not exist
/// - [`UnsupportedTemplateFormat`] - Template path has an unknown extension
/// - [`InvalidTemplate`] - Template content has the wrong shape
/// - [`TemplateParseError`] - Template file could not be parsed
///
/// ## References
/// - [`UnknownReference`] - Reference root is not a template key
/// - [`UnresolvedReference`] - Reference path does not exist in its scope
/// - [`NonStringInterpolation`] - Non-string value spliced into a larger string
/// - [`UnknownComponent`] - Component inputs reference an undeclared component
/// - [`StaticResolutionDiverged`] - Static values kept changing past the pass limit
/// - [`CircularStaticReference`] - Static values reference each other in a loop
///
/// ## Graph and Execution
/// - [`CircularDependency`] - Component dependency graph contains cycles
/// - [`ExecutionStalled`] - No component became ready while some remain
/// - [`ComponentFailed`] - A single component operation failed
/// - [`DeploymentFailed`] - One or more components failed within a round
/// - [`InvocationFailed`] - One or more components failed a custom operation
/// - [`TeardownFailed`] - One or more stale components failed to tear down
///
/// ## Components
/// - [`ComponentNotFound`] - Component reference could not be located
/// - [`MissingEntryPoint`] - Component directory lacks `component.toml`
/// - [`InvalidComponentManifest`] - `component.toml` is malformed
/// - [`UnknownAlias`] - Requested alias is not a component of the template
/// - [`OperationNotSupported`] - Component does not implement an operation
/// - [`UnsupportedOperation`] - Targeted components lacking a custom operation
///
/// ## State and Configuration
/// - [`InvalidInstanceId`] - Instance identifier is not a safe file name
/// - [`StateParseError`] - Persisted state file is corrupt
/// - [`ConfigError`] - Global configuration problem
///
/// [`TemplateNotFound`]: StackError::TemplateNotFound
/// [`UnsupportedTemplateFormat`]: StackError::UnsupportedTemplateFormat
/// [`InvalidTemplate`]: StackError::InvalidTemplate
/// [`TemplateParseError`]: StackError::TemplateParseError
/// [`UnknownReference`]: StackError::UnknownReference
/// [`UnresolvedReference`]: StackError::UnresolvedReference
/// [`NonStringInterpolation`]: StackError::NonStringInterpolation
/// [`UnknownComponent`]: StackError::UnknownComponent
/// [`StaticResolutionDiverged`]: StackError::StaticResolutionDiverged
/// [`CircularStaticReference`]: StackError::CircularStaticReference
/// [`CircularDependency`]: StackError::CircularDependency
/// [`ExecutionStalled`]: StackError::ExecutionStalled
/// [`ComponentFailed`]: StackError::ComponentFailed
/// [`DeploymentFailed`]: StackError::DeploymentFailed
/// [`InvocationFailed`]: StackError::InvocationFailed
/// [`TeardownFailed`]: StackError::TeardownFailed
/// [`ComponentNotFound`]: StackError::ComponentNotFound
/// [`MissingEntryPoint`]: StackError::MissingEntryPoint
/// [`InvalidComponentManifest`]: StackError::InvalidComponentManifest
/// [`UnknownAlias`]: StackError::UnknownAlias
/// [`OperationNotSupported`]: StackError::OperationNotSupported
/// [`UnsupportedOperation`]: StackError::UnsupportedOperation
/// [`InvalidInstanceId`]: StackError::InvalidInstanceId
/// [`StateParseError`]: StackError::StateParseError
/// [`ConfigError`]: StackError::ConfigError
#[derive(Error, Debug)]
pub enum StackError {
    /// Template path does not exist
    #[error("Template file not found: {path}")]
    TemplateNotFound {
        /// The path that was given as the template
        path: String,
    },

    /// Template path has an extension that is not JSON, YAML or TOML
    #[error("Unsupported template format: {path} (expected .json, .yml, .yaml or .toml)")]
    UnsupportedTemplateFormat {
        /// The path that was given as the template
        path: String,
    },

    /// Template content is structurally invalid
    #[error("Invalid template: {reason}")]
    InvalidTemplate {
        /// Why the template was rejected
        reason: String,
    },

    /// Template file could not be parsed
    #[error("Invalid template syntax in {file}")]
    TemplateParseError {
        /// Path to the template file that failed to parse
        file: String,
        /// Parser message
        reason: String,
    },

    /// A reference names a top-level key that the template does not declare
    ///
    /// # Fields
    /// - `expression`: The full reference, e.g. `${bukcet.arn}`
    /// - `suggestions`: Similarly spelled template keys
    #[error("Invalid reference {expression}: '{root}' is not defined in the template")]
    UnknownReference {
        /// The full reference expression
        expression: String,
        /// The top-level segment that was not found
        root: String,
        /// Similarly spelled keys, closest first
        suggestions: Vec<String>,
    },

    /// A reference path does not exist in the scope it was resolved against
    #[error("Invalid reference {expression}: value not found")]
    UnresolvedReference {
        /// The full reference expression
        expression: String,
    },

    /// A reference embedded in a larger string points at a non-string value
    #[error("Cannot interpolate {expression} into \"{text}\": referenced value is {value_type}, not a string")]
    NonStringInterpolation {
        /// The full reference expression
        expression: String,
        /// The string the reference was embedded in
        text: String,
        /// JSON type name of the referenced value
        value_type: String,
    },

    /// Component inputs reference an alias that is not a declared component
    #[error("The component referenced in expression {expression} does not exist (used by '{alias}')")]
    UnknownComponent {
        /// The full reference expression
        expression: String,
        /// The component whose inputs contain the expression
        alias: String,
    },

    /// Static values never stopped producing substitutions within the pass limit
    #[error("Static template values did not settle after {passes} passes; unresolved: {}", pending.join(", "))]
    StaticResolutionDiverged {
        /// Number of passes performed
        passes: usize,
        /// Expressions that were still being substituted
        pending: Vec<String>,
    },

    /// Static values reference themselves, directly or through other static values
    ///
    /// Each cycle is a closed path of value locations such as `a.name`, first
    /// location repeated at the end. Detected before any substitution happens.
    #[error("Static template values reference themselves: {}", render_static_cycles(cycles))]
    CircularStaticReference {
        /// Every cycle found, as closed location paths
        cycles: Vec<Vec<String>>,
    },

    /// Component dependency graph contains one or more cycles
    ///
    /// Each cycle is stored as a closed path, first alias repeated at the end.
    #[error("{}", render_cycle_report(cycles))]
    CircularDependency {
        /// Every cycle found, as closed alias paths
        cycles: Vec<Vec<String>>,
    },

    /// The schedule still has components but none of them is ready
    #[error("Execution stalled with pending components: {}", pending.join(", "))]
    ExecutionStalled {
        /// Components that never became ready
        pending: Vec<String>,
    },

    /// A single component operation failed
    #[error("Component '{alias}' failed during {operation}: {reason}")]
    ComponentFailed {
        /// The alias of the failing component
        alias: String,
        /// The operation that was invoked
        operation: String,
        /// The underlying failure
        reason: String,
    },

    /// One or more components failed within a round
    #[error("{} component(s) failed to deploy:\n{}", failures.len(), render_failures(failures))]
    DeploymentFailed {
        /// `(alias, error)` pairs for every failed invocation
        failures: Vec<(String, String)>,
    },

    /// One or more components failed a custom operation
    #[error("{} component(s) failed '{operation}':\n{}", failures.len(), render_failures(failures))]
    InvocationFailed {
        /// The operation that was invoked
        operation: String,
        /// `(alias, error)` pairs for every failed invocation
        failures: Vec<(String, String)>,
    },

    /// One or more stale components failed to tear down
    #[error("{} component(s) failed to tear down; state was not committed:\n{}", failures.len(), render_failures(failures))]
    TeardownFailed {
        /// `(alias, error)` pairs for every failed teardown
        failures: Vec<(String, String)>,
    },

    /// Component reference could not be located
    #[error("Component '{reference}' not found (searched: {})", searched.join(", "))]
    ComponentNotFound {
        /// The component reference as written in the template
        reference: String,
        /// Directories that were searched
        searched: Vec<String>,
    },

    /// Component directory lacks its entry point
    #[error("Component at {path} has no {entry_point}")]
    MissingEntryPoint {
        /// The component directory
        path: String,
        /// The expected entry point file name
        entry_point: String,
    },

    /// Component manifest is malformed
    #[error("Invalid component manifest {path}: {reason}")]
    InvalidComponentManifest {
        /// Path to the manifest
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Requested alias is not a component of the template
    #[error("'{alias}' is not a component in the template")]
    UnknownAlias {
        /// The alias that was requested
        alias: String,
    },

    /// Component does not implement the requested operation
    #[error("Component '{alias}' does not implement the operation '{operation}'")]
    OperationNotSupported {
        /// The alias of the component
        alias: String,
        /// The operation that was requested
        operation: String,
    },

    /// Components that do not implement a requested custom operation
    #[error("Operation '{operation}' is not implemented by: {}", aliases.join(", "))]
    UnsupportedOperation {
        /// The operation that was requested
        operation: String,
        /// Every targeted alias lacking the operation, sorted
        aliases: Vec<String>,
    },

    /// Deployment instance identifier is not usable
    #[error("Invalid instance id '{id}': use letters, digits, '.', '_' or '-'")]
    InvalidInstanceId {
        /// The rejected identifier
        id: String,
    },

    /// Persisted state could not be parsed
    #[error("Invalid state file syntax in {file}")]
    StateParseError {
        /// Path to the state file
        file: String,
        /// Parser message
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

/// Render a cycle report: every cycle as a numbered forward path and its reverse.
fn render_cycle_report(cycles: &[Vec<String>]) -> String {
    let mut lines = vec!["Your template has circular dependencies:".to_string()];
    for (index, cycle) in cycles.iter().enumerate() {
        let forward = format!("{}. {}", index + 1, cycle.join(" → "));
        let reverse: Vec<&str> = cycle.iter().rev().map(String::as_str).collect();
        let indent = " ".repeat(format!("{}. ", index + 1).len());
        lines.push(format!("   {forward}"));
        lines.push(format!("   {indent}{}", reverse.join(" ← ")));
    }
    lines.join("\n")
}

fn render_static_cycles(cycles: &[Vec<String>]) -> String {
    cycles.iter().map(|cycle| cycle.join(" → ")).collect::<Vec<_>>().join("; ")
}

fn render_failures(failures: &[(String, String)]) -> String {
    failures.iter().map(|(alias, error)| format!("  {alias}: {error}")).collect::<Vec<_>>().join("\n")
}

impl Clone for StackError {
    fn clone(&self) -> Self {
        match self {
            Self::TemplateNotFound {
                path,
            } => Self::TemplateNotFound {
                path: path.clone(),
            },
            Self::UnsupportedTemplateFormat {
                path,
            } => Self::UnsupportedTemplateFormat {
                path: path.clone(),
            },
            Self::InvalidTemplate {
                reason,
            } => Self::InvalidTemplate {
                reason: reason.clone(),
            },
            Self::TemplateParseError {
                file,
                reason,
            } => Self::TemplateParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::UnknownReference {
                expression,
                root,
                suggestions,
            } => Self::UnknownReference {
                expression: expression.clone(),
                root: root.clone(),
                suggestions: suggestions.clone(),
            },
            Self::UnresolvedReference {
                expression,
            } => Self::UnresolvedReference {
                expression: expression.clone(),
            },
            Self::NonStringInterpolation {
                expression,
                text,
                value_type,
            } => Self::NonStringInterpolation {
                expression: expression.clone(),
                text: text.clone(),
                value_type: value_type.clone(),
            },
            Self::UnknownComponent {
                expression,
                alias,
            } => Self::UnknownComponent {
                expression: expression.clone(),
                alias: alias.clone(),
            },
            Self::StaticResolutionDiverged {
                passes,
                pending,
            } => Self::StaticResolutionDiverged {
                passes: *passes,
                pending: pending.clone(),
            },
            Self::CircularStaticReference {
                cycles,
            } => Self::CircularStaticReference {
                cycles: cycles.clone(),
            },
            Self::CircularDependency {
                cycles,
            } => Self::CircularDependency {
                cycles: cycles.clone(),
            },
            Self::ExecutionStalled {
                pending,
            } => Self::ExecutionStalled {
                pending: pending.clone(),
            },
            Self::ComponentFailed {
                alias,
                operation,
                reason,
            } => Self::ComponentFailed {
                alias: alias.clone(),
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::DeploymentFailed {
                failures,
            } => Self::DeploymentFailed {
                failures: failures.clone(),
            },
            Self::InvocationFailed {
                operation,
                failures,
            } => Self::InvocationFailed {
                operation: operation.clone(),
                failures: failures.clone(),
            },
            Self::TeardownFailed {
                failures,
            } => Self::TeardownFailed {
                failures: failures.clone(),
            },
            Self::ComponentNotFound {
                reference,
                searched,
            } => Self::ComponentNotFound {
                reference: reference.clone(),
                searched: searched.clone(),
            },
            Self::MissingEntryPoint {
                path,
                entry_point,
            } => Self::MissingEntryPoint {
                path: path.clone(),
                entry_point: entry_point.clone(),
            },
            Self::InvalidComponentManifest {
                path,
                reason,
            } => Self::InvalidComponentManifest {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::UnknownAlias {
                alias,
            } => Self::UnknownAlias {
                alias: alias.clone(),
            },
            Self::OperationNotSupported {
                alias,
                operation,
            } => Self::OperationNotSupported {
                alias: alias.clone(),
                operation: operation.clone(),
            },
            Self::UnsupportedOperation {
                operation,
                aliases,
            } => Self::UnsupportedOperation {
                operation: operation.clone(),
                aliases: aliases.clone(),
            },
            Self::InvalidInstanceId {
                id,
            } => Self::InvalidInstanceId {
                id: id.clone(),
            },
            Self::StateParseError {
                file,
                reason,
            } => Self::StateParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// `ErrorContext` wraps a [`StackError`] and adds optional details and a suggestion.
///
/// # Display Format
///
/// 1. **Error**: The main error message in red
/// 2. **Details**: Additional context in yellow (optional)
/// 3. **Suggestion**: Actionable steps in green (optional)
///
/// # Examples
///
/// ```rust,no_run
/// use stackweave_cli::core::{StackError, ErrorContext};
///
/// let context = ErrorContext::new(StackError::UnknownAlias { alias: "db".to_string() })
///     .with_suggestion("Check the alias against the template keys")
///     .with_details("Only entries with a `component` key can be invoked");
///
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: StackError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: StackError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Recognizes [`StackError`] anywhere in the error chain (errors are often wrapped
/// with `.context()` on their way up), then [`std::io::Error`], and finally falls back
/// to a generic context that includes the full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(stack_error) = error.chain().find_map(|cause| cause.downcast_ref::<StackError>()) {
        return create_error_context(stack_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(StackError::Other {
                    message: format!("Permission denied: {io_error}"),
                })
                .with_suggestion("Check ownership of the state directory and component files");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(StackError::Other {
                    message: format!("File not found: {io_error}"),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    // Generic error - include the full error chain for better diagnostics
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(StackError::Other {
        message,
    })
}

/// Map each [`StackError`] variant to an [`ErrorContext`] with tailored suggestions.
fn create_error_context(error: StackError) -> ErrorContext {
    match &error {
        StackError::TemplateNotFound { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Pass --template or create stackweave.yml in the current directory"),

        StackError::UnsupportedTemplateFormat { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Rename the template to use a .json, .yml, .yaml or .toml extension"),

        StackError::TemplateParseError { reason, .. } => ErrorContext::new(error.clone())
            .with_details(reason.clone())
            .with_suggestion("Check the template syntax; quotes around ${...} expressions are required in YAML"),

        StackError::UnknownReference { suggestions, .. } => {
            let context = ErrorContext::new(error.clone()).with_details(
                "The first segment of a reference must be a template key, a component alias, or 'env'",
            );
            if suggestions.is_empty() {
                context
            } else {
                context.with_suggestion(format!("Did you mean: {}?", suggestions.join(", ")))
            }
        }

        StackError::UnresolvedReference { expression } if expression.starts_with("${env.") => {
            ErrorContext::new(error.clone())
                .with_suggestion("Export the environment variable before running stackweave")
                .with_details("Unset environment variables are treated as missing values, not empty strings")
        }

        StackError::NonStringInterpolation { expression, .. } => ErrorContext::new(error.clone())
            .with_suggestion(format!(
                "Use {expression} as the entire value to keep its type, or reference a string field"
            )),

        StackError::UnknownComponent { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Declare the referenced component in the template or fix the alias spelling"),

        StackError::StaticResolutionDiverged { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Raise max_resolution_passes in the configuration or shorten the reference chain")
            .with_details("Static values are substituted repeatedly until nothing changes; these never settled"),

        StackError::CircularStaticReference { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Remove the self-referential or mutually-referential static values"),

        StackError::UnsupportedOperation { .. } => ErrorContext::new(error.clone())
            .with_details("No component was invoked")
            .with_suggestion("Declare the operation in each component's component.toml or narrow the targets with --alias"),

        StackError::StateParseError { reason, .. } => ErrorContext::new(error.clone())
            .with_details(reason.clone())
            .with_suggestion("Fix or delete the state file; deleting it forgets what was deployed, so stale components are no longer removed"),

        StackError::CircularDependency { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Break the cycle so that no component depends on itself directly or indirectly"),

        StackError::MissingEntryPoint { entry_point, .. } => ErrorContext::new(error.clone())
            .with_suggestion(format!("Add a {entry_point} declaring at least a 'deploy' operation")),

        StackError::ComponentNotFound { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Prefix local components with './', or add the directory holding it to component_dirs")
            .with_details("Non-local references are looked up in STACKWEAVE_COMPONENTS_DIR and the configured component_dirs"),

        StackError::TeardownFailed { .. } => ErrorContext::new(error.clone())
            .with_details("The previous deployment state was kept so that the next run retries the removal"),

        StackError::ExecutionStalled { .. } => ErrorContext::new(error.clone())
            .with_details("This indicates a bug: the dependency graph was validated as acyclic"),

        _ => ErrorContext::new(error.clone()),
    }
}
