//! Stackweave - deploy declarative component templates
//!
//! A template names a set of components whose inputs may reference static
//! template values, environment variables, or the outputs of other components:
//!
//! ```yaml
//! region: eu-west-1
//! bucket:
//!   component: ./components/bucket
//!   inputs:
//!     region: "${region}"
//! site:
//!   component: website
//!   inputs:
//!     bucket: "${bucket.name}"
//!     stage: "${env.STAGE}"
//! ```
//!
//! Stackweave turns that into an ordered, partially parallel plan: `bucket`
//! runs first, `site` runs once `bucket`'s outputs exist, and components that
//! were removed from the template since the last run are torn down.
//!
//! # Pipeline
//!
//! 1. [`template`] - load the template and substitute static references
//! 2. [`graph::dependencies`] - derive each component's dependencies from its inputs
//! 3. [`graph`] - build the dependency graph and reject cycles
//! 4. [`state::reconcile`] - tear down stale components and commit the new set
//! 5. [`graph::executor`] - run ready components concurrently, round by round
//!
//! [`deploy::Deployer`] drives the pipeline; [`cli`] wraps it in the
//! `stackweave` binary.
//!
//! # Supporting Modules
//!
//! - [`component`] - component traits plus the file-system locator and process loader
//! - [`config`] - global configuration (`~/.stackweave/config.toml`)
//! - [`core`] - error types and status reporting
//! - [`utils`] - atomic writes, path expansion, progress spinner

// Core functionality modules
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;

// Deployment pipeline
pub mod component;
pub mod deploy;
pub mod graph;
pub mod state;
pub mod template;

// Supporting modules
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
