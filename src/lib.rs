//! buildmatrix - build many source trees in many flavors at once
//!
//! This crate provides the core library functionality for buildmatrix:
//! label derivation, the per-component pipeline, and the worker pool that
//! drains the (source tree, flavor) matrix.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for buildmatrix unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides mock implementations for process execution
/// and log sinks, plus on-disk fixtures.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{BuildFlavor, Component, SourceTree, WorkItem};
pub use ops::{MatrixReport, Orchestrator};
pub use util::{ConfigError, MatrixOptions};
