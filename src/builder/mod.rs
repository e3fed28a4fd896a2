//! Per-component build pipeline.
//!
//! This module resolves per-(component, flavor) settings and drives each
//! component through configure, build, test and install.

pub mod context;
pub mod events;
pub mod pipeline;
pub mod result;

pub use context::{BuildSettings, ItemContext, StageSettings};
pub use events::MatrixEvent;
pub use pipeline::{PipelinePolicy, PipelineRunner};
pub use result::{PipelineResult, Stage, StageStatus};
