//! The configure → build → test → install pipeline for one component.
//!
//! Stage order is fixed. Without keep-going, a failed stage stops the
//! pipeline; with keep-going, later stages are still attempted. A failed
//! configure always stops the pipeline, since there is nothing to build.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::context::{BuildSettings, ItemContext, StageSettings};
use crate::builder::result::{PipelineResult, Stage, StageStatus};
use crate::core::Component;
use crate::util::config::MatrixOptions;
use crate::util::fs::{ensure_dir, is_up_to_date};
use crate::util::process::{find_executable, is_executable, CommandSpec, ExecOutcome, ProcessExecutor};

/// Run-wide switches that shape every pipeline.
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    /// Attempt later stages after a failure
    pub keep_going: bool,

    /// Skip the install stage
    pub no_install: bool,

    /// Re-run configure even when the build directory is up to date
    pub force_configure: bool,

    /// `-j` value for every make invocation
    pub make_jobs: usize,

    /// Build tool
    pub make: PathBuf,
}

impl PipelinePolicy {
    /// Derive the policy from run options.
    ///
    /// The build tool is looked up once; if it cannot be found the bare
    /// name is kept and each stage reports it as missing.
    pub fn from_options(opts: &MatrixOptions) -> Self {
        let make = match find_executable(&opts.make, None) {
            Some(path) => path,
            None => {
                tracing::warn!("build tool `{}` not found in PATH", opts.make.display());
                opts.make.clone()
            }
        };

        PipelinePolicy {
            keep_going: opts.keep_going,
            no_install: opts.no_install,
            force_configure: opts.force_configure,
            make_jobs: opts.make_jobs(),
            make,
        }
    }
}

/// Drives one component through its stages.
pub struct PipelineRunner<'a> {
    executor: &'a dyn ProcessExecutor,
    settings: &'a BuildSettings,
    policy: &'a PipelinePolicy,
}

impl<'a> PipelineRunner<'a> {
    /// Create a runner.
    pub fn new(
        executor: &'a dyn ProcessExecutor,
        settings: &'a BuildSettings,
        policy: &'a PipelinePolicy,
    ) -> Self {
        PipelineRunner {
            executor,
            settings,
            policy,
        }
    }

    /// Run every stage of `component` for one work item.
    ///
    /// Stage failures are reported in the result. `Err` means the pipeline
    /// itself could not run (e.g. the build directory cannot be created).
    pub fn run(&self, component: &Component, ctx: &ItemContext) -> Result<PipelineResult> {
        let mut result = PipelineResult::new(&component.name);

        let settings = self
            .settings
            .get(&component.name, &ctx.item.flavor.name)
            .with_context(|| {
                format!(
                    "no settings for component `{}` in flavor `{}`",
                    component.name, ctx.item.flavor.name
                )
            })?;

        let build_dir = ctx.build_dir(component);
        ensure_dir(&build_dir)?;

        let configure = self.configure(component, ctx, settings, &build_dir)?;
        let configured = configure.is_ok();
        self.record(&mut result, Stage::Configure, configure, component, ctx);
        if !configured {
            return Ok(result);
        }

        let build = self.make(Stage::Build, &component.build_targets, component, ctx, settings, &build_dir)?;
        let proceed = build.is_ok() || self.policy.keep_going;
        self.record(&mut result, Stage::Build, build, component, ctx);
        if !proceed {
            return Ok(result);
        }

        let test = match &component.test_target {
            Some(target) => self.make(
                Stage::Test,
                std::slice::from_ref(target),
                component,
                ctx,
                settings,
                &build_dir,
            )?,
            None => StageStatus::Skipped,
        };
        let proceed = test.is_ok() || self.policy.keep_going;
        self.record(&mut result, Stage::Test, test, component, ctx);
        if !proceed {
            return Ok(result);
        }

        let install = if self.policy.no_install {
            StageStatus::Skipped
        } else {
            self.make(
                Stage::Install,
                std::slice::from_ref(&component.install_target),
                component,
                ctx,
                settings,
                &build_dir,
            )?
        };
        self.record(&mut result, Stage::Install, install, component, ctx);

        Ok(result)
    }

    fn configure(
        &self,
        component: &Component,
        ctx: &ItemContext,
        settings: &StageSettings,
        build_dir: &Path,
    ) -> Result<StageStatus> {
        let Some(step) = &component.configure else {
            return Ok(StageStatus::Success);
        };

        let script = ctx.source_dir(component).join(&step.script);
        let stamp = build_dir.join(&step.stamp);

        if !is_executable(&script) {
            return Ok(StageStatus::ToolNotFound { path: script });
        }

        if !self.policy.force_configure && is_up_to_date(&stamp, &script) {
            tracing::info!("{}: {} already configured", ctx.label, component.name);
            return Ok(StageStatus::Skipped);
        }

        tracing::info!("{}: {} {}", ctx.label, Stage::Configure.verb(), component.name);

        let cmd = CommandSpec::new(&script)
            .args(&settings.configure_flags)
            .arg(format!("--prefix={}", ctx.install_dir(&component.name).display()))
            .args(&settings.extra_configure_flags)
            .cwd(build_dir)
            .envs(&ctx.env);

        self.invoke(&cmd, ctx)
    }

    fn make(
        &self,
        stage: Stage,
        targets: &[String],
        component: &Component,
        ctx: &ItemContext,
        settings: &StageSettings,
        build_dir: &Path,
    ) -> Result<StageStatus> {
        tracing::info!("{}: {} {}", ctx.label, stage.verb(), component.name);

        let mut cmd = CommandSpec::new(&self.policy.make)
            .arg(format!("-j{}", self.policy.make_jobs))
            .cwd(build_dir)
            .envs(&ctx.stage_env(component));

        // Without a configure step there is no generated Makefile in the
        // build directory; drive the checkout's own Makefile instead.
        if component.has_noop_configure() {
            let source_dir = ctx.source_dir(component);
            cmd = cmd
                .arg("-f")
                .arg(source_dir.join("Makefile"))
                .arg(format!("SRC_DIR={}", source_dir.display()))
                .arg(format!("PREFIX={}", ctx.install_dir(&component.name).display()));
        }

        let cmd = cmd.args(&settings.make_flags).args(targets);
        self.invoke(&cmd, ctx)
    }

    fn invoke(&self, cmd: &CommandSpec, ctx: &ItemContext) -> Result<StageStatus> {
        let outcome = self.executor.execute(cmd, &ctx.label)?;
        if outcome.success() {
            return Ok(StageStatus::Success);
        }
        Ok(match outcome {
            ExecOutcome::Exited(code) => StageStatus::Failed { code },
            ExecOutcome::NotFound(path) => StageStatus::ToolNotFound { path },
        })
    }

    fn record(
        &self,
        result: &mut PipelineResult,
        stage: Stage,
        status: StageStatus,
        component: &Component,
        ctx: &ItemContext,
    ) {
        if status.is_failure() {
            tracing::error!("{}: {} {} {}", ctx.label, component.name, stage, status);
        }
        result.set(stage, status);
    }
}
