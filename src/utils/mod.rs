//! Utility modules shared across Stackweave
//!
//! - [`fs`] - Atomic writes, directory creation and path expansion
//! - [`progress`] - Terminal spinner for interactive runs

pub mod fs;
pub mod progress;

pub use fs::{atomic_write, ensure_dir, expand_path};
