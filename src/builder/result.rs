//! Per-stage outcomes of one component's pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Configure,
    Build,
    Test,
    Install,
}

impl Stage {
    /// Stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configure => "configure",
            Stage::Build => "build",
            Stage::Test => "test",
            Stage::Install => "install",
        }
    }

    /// Progress verb used in log lines.
    pub fn verb(&self) -> &'static str {
        match self {
            Stage::Configure => "Configuring",
            Stage::Build => "Building",
            Stage::Test => "Testing",
            Stage::Install => "Installing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum StageStatus {
    /// The stage ran (or had nothing to do) and succeeded.
    Success,
    /// The tool exited with a non-zero status.
    Failed { code: i32 },
    /// Deliberately skipped (up-to-date configure, `--no-install`, no test target).
    Skipped,
    /// The tool or script is missing or not executable.
    ToolNotFound { path: PathBuf },
    /// Not attempted because an earlier stage failed.
    NotRun,
}

impl StageStatus {
    /// Whether the stage counts as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, StageStatus::Failed { .. } | StageStatus::ToolNotFound { .. })
    }

    /// Whether later stages may rely on this one.
    pub fn is_ok(&self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Skipped)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Success => f.write_str("ok"),
            StageStatus::Failed { code } => write!(f, "failed (exit {})", code),
            StageStatus::Skipped => f.write_str("skipped"),
            StageStatus::ToolNotFound { path } => write!(f, "not found: {}", path.display()),
            StageStatus::NotRun => f.write_str("not run"),
        }
    }
}

/// Stage outcomes for one (component, work item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    pub component: String,
    pub configure: StageStatus,
    pub build: StageStatus,
    pub test: StageStatus,
    pub install: StageStatus,
}

impl PipelineResult {
    /// A result with every stage not yet run.
    pub fn new(component: impl Into<String>) -> Self {
        PipelineResult {
            component: component.into(),
            configure: StageStatus::NotRun,
            build: StageStatus::NotRun,
            test: StageStatus::NotRun,
            install: StageStatus::NotRun,
        }
    }

    /// Status of one stage.
    pub fn stage(&self, stage: Stage) -> &StageStatus {
        match stage {
            Stage::Configure => &self.configure,
            Stage::Build => &self.build,
            Stage::Test => &self.test,
            Stage::Install => &self.install,
        }
    }

    /// Record the status of one stage.
    pub fn set(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::Configure => self.configure = status,
            Stage::Build => self.build = status,
            Stage::Test => self.test = status,
            Stage::Install => self.install = status,
        }
    }

    /// Stages with their statuses, in pipeline order.
    pub fn stages(&self) -> [(Stage, &StageStatus); 4] {
        [Stage::Configure, Stage::Build, Stage::Test, Stage::Install]
            .map(|stage| (stage, self.stage(stage)))
    }

    /// True when no stage failed.
    pub fn is_success(&self) -> bool {
        self.stages().iter().all(|(_, s)| !s.is_failure())
    }

    /// The earliest failed stage, if any.
    pub fn first_failure(&self) -> Option<(Stage, &StageStatus)> {
        self.stages().into_iter().find(|(_, s)| s.is_failure())
    }
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.component)?;
        for (stage, status) in self.stages() {
            write!(f, " {}={}", stage, status)?;
        }
        Ok(())
    }
}
