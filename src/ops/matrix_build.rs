//! Build every (source tree, flavor) cell of the matrix.
//!
//! The orchestrator validates options, derives labels, resolves flag tables,
//! queues the deduplicated cross product and lets a fixed pool of workers
//! drain it. Each worker runs the pipeline of every component for one item.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;

use crate::builder::context::{BuildSettings, ItemContext};
use crate::builder::events::MatrixEvent;
use crate::builder::pipeline::{PipelinePolicy, PipelineRunner};
use crate::builder::result::PipelineResult;
use crate::core::{Component, WorkItem};
use crate::ops::pool::{WorkQueue, WorkerPool};
use crate::util::abbrev::Labels;
use crate::util::config::{ConfigError, MatrixOptions};
use crate::util::process::ProcessExecutor;

/// How one work item ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ItemOutcome {
    /// Every component was attempted; per-stage results inside.
    Completed { components: Vec<PipelineResult> },
    /// The worker hit an unexpected error.
    InternalError { message: String },
}

/// Result of one matrix cell.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    #[serde(flatten)]
    pub item: WorkItem,
    pub label: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl ItemReport {
    /// True when every component's pipeline succeeded.
    pub fn is_success(&self) -> bool {
        match &self.outcome {
            ItemOutcome::Completed { components } => components.iter().all(|c| c.is_success()),
            ItemOutcome::InternalError { .. } => false,
        }
    }

    /// Component results (empty for internal errors).
    pub fn components(&self) -> &[PipelineResult] {
        match &self.outcome {
            ItemOutcome::Completed { components } => components,
            ItemOutcome::InternalError { .. } => &[],
        }
    }
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_success() { "ok" } else { "FAILED" };
        write!(f, "{:<24} {:<6}", self.label, status)?;
        match &self.outcome {
            ItemOutcome::Completed { components } => {
                for result in components.iter().filter(|r| !r.is_success()) {
                    if let Some((stage, status)) = result.first_failure() {
                        write!(f, " {} {}: {}", result.component, stage, status)?;
                    }
                }
            }
            ItemOutcome::InternalError { message } => write!(f, " internal error: {}", message)?,
        }
        Ok(())
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Results of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub items: Vec<ItemReport>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl MatrixReport {
    /// True when every item succeeded.
    pub fn is_success(&self) -> bool {
        self.items.iter().all(ItemReport::is_success)
    }

    /// Items with an unrecovered failure.
    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| !r.is_success())
    }

    /// Process exit status for this run.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Report for one item, by label.
    pub fn item(&self, label: &str) -> Option<&ItemReport> {
        self.items.iter().find(|r| r.label == label)
    }
}

/// Callback receiving run events as they happen, from any thread.
pub type EventObserver = Arc<dyn Fn(&MatrixEvent) + Send + Sync>;

/// Per-run state shared by every worker.
struct MatrixWorker {
    options: MatrixOptions,
    components: Vec<Component>,
    labels: Labels,
    settings: BuildSettings,
    policy: PipelinePolicy,
    executor: Arc<dyn ProcessExecutor>,
    observer: Option<EventObserver>,
    reports: Mutex<Vec<ItemReport>>,
}

impl MatrixWorker {
    /// Run every component for one item and record the outcome.
    fn process(&self, item: &WorkItem) -> Result<()> {
        let start = Instant::now();
        let label = self.labels.item(item);
        tracing::info!("{}: starting {}", label, item);

        let ctx = ItemContext::new(item.clone(), label.clone(), &self.options);
        let runner = PipelineRunner::new(self.executor.as_ref(), &self.settings, &self.policy);

        let mut results = Vec::with_capacity(self.components.len());
        let mut blocked = false;
        for component in &self.components {
            if blocked {
                results.push(PipelineResult::new(&component.name));
                continue;
            }

            let result = runner.run(component, &ctx)?;
            if !result.is_success() && !self.policy.keep_going {
                tracing::warn!(
                    "{}: {} failed, not building remaining components",
                    label,
                    component.name
                );
                blocked = true;
            }
            results.push(result);
        }

        let report = ItemReport {
            item: item.clone(),
            label: label.clone(),
            outcome: ItemOutcome::Completed {
                components: results,
            },
            duration: start.elapsed(),
        };

        if report.is_success() {
            tracing::info!("{}: finished in {:.2}s", label, report.duration.as_secs_f64());
        } else {
            tracing::error!("{}: failed", label);
        }

        self.emit(&MatrixEvent::item(&report));
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report);
        Ok(())
    }

    fn emit(&self, event: &MatrixEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}

/// Owns a run: validation, queueing, the worker pool, and the report.
pub struct Orchestrator {
    options: MatrixOptions,
    components: Vec<Component>,
    executor: Arc<dyn ProcessExecutor>,
    observer: Option<EventObserver>,
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        options: MatrixOptions,
        components: Vec<Component>,
        executor: Arc<dyn ProcessExecutor>,
    ) -> Self {
        Orchestrator {
            options,
            components,
            executor,
            observer: None,
        }
    }

    /// Receive run events while the matrix builds.
    pub fn with_observer(mut self, observer: EventObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the whole matrix and block until every item is finished.
    ///
    /// Configuration problems are returned as a [`ConfigError`] before any
    /// work is queued. Pipeline failures never abort the run; they are
    /// recorded in the returned report.
    pub fn run(self) -> Result<MatrixReport> {
        let start = Instant::now();
        let Orchestrator {
            mut options,
            components,
            executor,
            observer,
        } = self;

        options.validate(&components)?;
        let labels = Labels::derive(&options.sources, &options.flavors).map_err(ConfigError::from)?;

        let settings = BuildSettings::resolve(&components, &options);
        let policy = PipelinePolicy::from_options(&options);
        let items = WorkItem::matrix(&options.sources, &options.flavors);
        let workers = options.worker_count();
        let active: Vec<Component> = options
            .active_components(&components)
            .into_iter()
            .cloned()
            .collect();

        for component in components.iter().filter(|c| options.skip_components.contains(&c.name)) {
            tracing::info!("skipping component {}", component.name);
        }
        tracing::info!(
            "building {} item(s) with {} worker(s), make -j{}",
            items.len(),
            workers,
            policy.make_jobs
        );

        let worker = Arc::new(MatrixWorker {
            options,
            components: active,
            labels,
            settings,
            policy,
            executor,
            observer,
            reports: Mutex::new(Vec::with_capacity(items.len())),
        });
        worker.emit(&MatrixEvent::started(items.len(), workers));

        let queue = Arc::new(WorkQueue::new());
        let pool = {
            let worker = Arc::clone(&worker);
            WorkerPool::spawn(workers, Arc::clone(&queue), move |item: &WorkItem| {
                worker.process(item)
            })?
        };
        tracing::debug!("started {} worker(s)", pool.size());

        for item in items {
            queue.push(item)?;
        }
        tracing::debug!("{} item(s) pending", queue.pending());
        queue.close();
        queue.wait_drained();
        let failures = pool.join();

        let mut reports = std::mem::take(
            &mut *worker
                .reports
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        for failure in failures {
            let report = ItemReport {
                label: worker.labels.item(&failure.item),
                item: failure.item,
                outcome: ItemOutcome::InternalError {
                    message: failure.message,
                },
                duration: Duration::ZERO,
            };
            worker.emit(&MatrixEvent::item(&report));
            reports.push(report);
        }
        reports.sort_by(|a, b| a.item.cmp(&b.item));

        let report = MatrixReport {
            items: reports,
            duration: start.elapsed(),
        };
        worker.emit(&MatrixEvent::finished(&report));
        Ok(report)
    }
}
