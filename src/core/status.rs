//! Status reporting for deployments
//!
//! The graph executor, reconciler and dispatcher report what they are doing
//! through a [`StatusSink`]. Sinks are fire-and-forget: reporting never fails
//! and never blocks a component invocation.

use crate::utils::progress::Spinner;
use colored::Colorize;
use std::fmt;

/// What a component is currently being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Running the default deploy operation
    Deploying,
    /// Running teardown for a component that left the template
    Removing,
    /// Running a custom operation
    Invoking,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Deploying => "Deploying",
            Self::Removing => "Removing",
            Self::Invoking => "Invoking",
        };
        f.write_str(label)
    }
}

/// Result of a single component invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operation returned normally
    Succeeded,
    /// The operation failed with the given message
    Failed {
        /// Rendered error
        error: String,
    },
}

impl Outcome {
    /// Whether the invocation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Receiver for deployment progress.
pub trait StatusSink: Send + Sync {
    /// A component entered `phase`. `None` refers to the whole template.
    fn status(&self, phase: Phase, alias: Option<&str>);

    /// Step narration that is only interesting when debugging.
    fn debug(&self, message: &str);

    /// An invocation of `operation` on `alias` settled.
    fn outcome(&self, alias: &str, operation: &str, outcome: &Outcome);
}

/// Sink that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn status(&self, phase: Phase, alias: Option<&str>) {
        match alias {
            Some(alias) => tracing::info!(alias = %alias, "{phase} component"),
            None => tracing::info!("{phase} template"),
        }
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn outcome(&self, alias: &str, operation: &str, outcome: &Outcome) {
        match outcome {
            Outcome::Succeeded => {
                tracing::debug!(alias = %alias, operation = %operation, "Component operation succeeded");
            }
            Outcome::Failed {
                error,
            } => {
                tracing::warn!(alias = %alias, operation = %operation, "Component operation failed: {error}");
            }
        }
    }
}

/// Sink that drives a terminal spinner and prints one line per settled component.
///
/// Debug narration still goes to `tracing` so `--verbose` keeps working.
#[derive(Clone)]
pub struct ProgressSink {
    spinner: Spinner,
}

impl ProgressSink {
    /// Create a sink around a visible spinner.
    pub fn new() -> Self {
        Self {
            spinner: Spinner::new(),
        }
    }

    /// Create a sink around an existing spinner.
    pub fn with_spinner(spinner: Spinner) -> Self {
        Self {
            spinner,
        }
    }

    /// Clear the spinner line once the run is over.
    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for ProgressSink {
    fn status(&self, phase: Phase, alias: Option<&str>) {
        match alias {
            Some(alias) => self.spinner.set_message(format!("{phase} {}", alias.cyan())),
            None => self.spinner.set_message(format!("{phase} template")),
        }
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn outcome(&self, alias: &str, operation: &str, outcome: &Outcome) {
        match outcome {
            Outcome::Succeeded => {
                self.spinner.println(format!("{} {alias} ({operation})", "✓".green()));
            }
            Outcome::Failed {
                error,
            } => {
                self.spinner.println(format!("{} {alias} ({operation}): {error}", "✗".red()));
            }
        }
    }
}
