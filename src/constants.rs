//! Global constants used throughout the Stackweave codebase.
//!
//! This module contains file names, format versions, retry parameters and
//! resolution bounds that are used across multiple modules. Defining them
//! centrally makes magic numbers more discoverable.

use std::time::Duration;

/// Default bound on static template resolution passes.
///
/// Static values are substituted repeatedly until a pass makes no changes.
/// Chains of static references settle in as many passes as the chain is long,
/// so this bound only trips on self- or mutually-referential values.
pub const DEFAULT_MAX_RESOLUTION_PASSES: usize = 32;

/// File every component directory must contain.
pub const COMPONENT_ENTRY_FILE: &str = "component.toml";

/// Operation invoked to deploy a component.
pub const DEPLOY_OPERATION: &str = "deploy";

/// Operation invoked to tear down a component.
pub const REMOVE_OPERATION: &str = "remove";

/// Current on-disk state file format version.
///
/// Loading a state file with a higher version is rejected so an older binary
/// never overwrites state it does not understand.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Instance id used when none is given on the command line.
pub const DEFAULT_INSTANCE: &str = "default";

/// Template file names searched in the current directory, in order.
pub const TEMPLATE_FILE_NAMES: &[&str] =
    &["stackweave.yml", "stackweave.yaml", "stackweave.json", "stackweave.toml"];

/// Directory (relative to the template) that holds state when nothing else is configured.
pub const DEFAULT_STATE_SUBDIR: &str = ".stackweave/state";

/// Default timeout for state lock acquisition (30 seconds).
pub fn default_lock_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Maximum backoff delay for exponential backoff (500ms).
///
/// Exponential backoff delays are capped at this value to prevent
/// excessive wait times during retry operations.
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;
