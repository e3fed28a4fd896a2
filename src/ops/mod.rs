//! High-level operations.
//!
//! The worker pool and the matrix orchestrator built on it.

pub mod matrix_build;
pub mod pool;

pub use matrix_build::{
    EventObserver, ItemOutcome, ItemReport, MatrixReport, Orchestrator,
};
pub use pool::{QueueClosed, WorkQueue, WorkerFailure, WorkerPool};
