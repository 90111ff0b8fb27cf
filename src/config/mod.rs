//! Configuration for Stackweave
//!
//! Deployment behaviour is driven by the template itself; this module only
//! covers user-wide settings such as where state is kept and where named
//! components are found. See [`GlobalConfig`].

pub mod global;

pub use global::GlobalConfig;
