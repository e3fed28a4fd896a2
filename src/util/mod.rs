//! Shared utilities

pub mod abbrev;
pub mod config;
pub mod fs;
pub mod process;

pub use abbrev::{AbbrevError, Labels};
pub use config::{Config, ConfigError, MatrixOptions};
pub use process::{CommandSpec, ExecOutcome, LogSink, ProcessExecutor, SystemExecutor};
