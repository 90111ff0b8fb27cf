//! Core types shared by every stage of a deployment
//!
//! # Modules
//!
//! ## `error` - Error Handling
//!
//! - [`StackError`] - Enumerated error types covering every failure mode
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error to user-friendly format
//!
//! ## `status` - Status Reporting
//!
//! - [`StatusSink`] - Fire-and-forget receiver for per-component progress
//! - [`TracingSink`] and [`ProgressSink`] - The two sinks the CLI chooses between
//!
//! Errors are carried inside [`anyhow::Error`] between modules. Only the binary
//! converts them back through [`user_friendly_error`] for display.

pub mod error;
pub mod status;

pub use error::{ErrorContext, StackError, user_friendly_error};
pub use status::{Outcome, Phase, ProgressSink, StatusSink, TracingSink};
