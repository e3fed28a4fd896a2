//! Run event types for JSON output.
//!
//! These events are emitted when using `--message-format=json`, one
//! object per line on stdout.
//!
//! # Event Types
//!
//! - `matrix-started`: The matrix was validated and work was queued
//! - `item-finished`: One (source tree, flavor) item finished
//! - `matrix-finished`: Every item finished
//!
//! # Stability
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use std::path::PathBuf;

use serde::Serialize;

use crate::builder::result::PipelineResult;
use crate::ops::matrix_build::{ItemOutcome, ItemReport, MatrixReport};

/// An event emitted during a matrix run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum MatrixEvent {
    /// Work was queued.
    #[serde(rename = "matrix-started")]
    MatrixStarted {
        /// Number of distinct work items
        items: usize,
        /// Number of worker threads
        workers: usize,
    },

    /// One work item finished.
    #[serde(rename = "item-finished")]
    ItemFinished {
        /// Short label, e.g. "official/deb"
        label: String,
        /// Source tree path
        source: PathBuf,
        /// Flavor name
        flavor: String,
        /// Whether every component succeeded
        success: bool,
        /// Per-component stage statuses
        components: Vec<PipelineResult>,
        /// Internal error, if the worker failed
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Item duration in milliseconds
        duration_ms: u64,
    },

    /// The whole run finished.
    #[serde(rename = "matrix-finished")]
    MatrixFinished {
        /// Whether every item succeeded
        success: bool,
        /// Number of failed items
        failed: usize,
        /// Total run duration in milliseconds
        duration_ms: u64,
    },
}

impl MatrixEvent {
    /// Create a matrix started event.
    pub fn started(items: usize, workers: usize) -> Self {
        MatrixEvent::MatrixStarted { items, workers }
    }

    /// Create an item finished event from its report.
    pub fn item(report: &ItemReport) -> Self {
        let error = match &report.outcome {
            ItemOutcome::InternalError { message } => Some(message.clone()),
            ItemOutcome::Completed { .. } => None,
        };
        MatrixEvent::ItemFinished {
            label: report.label.clone(),
            source: report.item.source.path().to_path_buf(),
            flavor: report.item.flavor.name.clone(),
            success: report.is_success(),
            components: report.components().to_vec(),
            error,
            duration_ms: report.duration.as_millis() as u64,
        }
    }

    /// Create a matrix finished event from the run report.
    pub fn finished(report: &MatrixReport) -> Self {
        MatrixEvent::MatrixFinished {
            success: report.is_success(),
            failed: report.failures().count(),
            duration_ms: report.duration.as_millis() as u64,
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
