//! Spinner used for interactive deployments
//!
//! Wraps `indicatif` with consistent styling. Spinners are hidden when the
//! `STACKWEAVE_NO_PROGRESS` environment variable is set or when the caller
//! asks for a hidden spinner (`--quiet`, `--no-progress`), so scripted runs
//! get clean output.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// Environment variable that disables every spinner when set to any value.
pub const NO_PROGRESS_ENV: &str = "STACKWEAVE_NO_PROGRESS";

/// Checks if progress output should be disabled by the environment.
pub fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// A spinner with Stackweave styling.
///
/// Cloning yields a handle to the same spinner, so concurrent component
/// invocations can all update one line.
#[derive(Clone)]
pub struct Spinner {
    inner: IndicatifBar,
}

impl Spinner {
    /// Create a visible spinner unless progress is disabled by the environment.
    pub fn new() -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }

        let inner = IndicatifBar::new_spinner();
        inner.set_style(
            IndicatifStyle::default_spinner()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| IndicatifStyle::default_spinner()),
        );
        inner.enable_steady_tick(Duration::from_millis(100));
        Self {
            inner,
        }
    }

    /// Create a spinner that never draws.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Replace the spinner message.
    pub fn set_message(&self, message: impl Into<String>) {
        self.inner.set_message(message.into());
    }

    /// Print a line above the spinner without disturbing it.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.inner.is_hidden() {
            return;
        }
        self.inner.println(line);
    }

    /// Stop the spinner and leave a final message on screen.
    pub fn finish_with_message(&self, message: impl Into<String>) {
        self.inner.finish_with_message(message.into());
    }

    /// Stop the spinner and clear its line.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    /// Whether the spinner draws anything.
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}
