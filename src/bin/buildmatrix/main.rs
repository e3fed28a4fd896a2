//! buildmatrix CLI - build source trees in several flavors concurrently

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use buildmatrix::builder::MatrixEvent;
use buildmatrix::core::SourceTree;
use buildmatrix::ops::{EventObserver, MatrixReport, Orchestrator};
use buildmatrix::util::config::{
    global_config_path, load_config, project_config_path, Config, MatrixOptions,
};
use buildmatrix::util::process::{ProcessExecutor, SystemExecutor};

mod cli;

use cli::{parse_extra_flags, Cli, MessageFormat};

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("buildmatrix=debug")
    } else if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("buildmatrix=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .without_time()
        .init();

    // Load configuration (explicit file, or global + project)
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let cwd = std::env::current_dir().context("failed to determine current directory")?;
            load_config(global_config_path().as_deref(), &project_config_path(&cwd))?
        }
    };

    let format = cli.message_format;
    let options = options_from(cli, &config)?;
    let components = config.components();

    let executor: Arc<dyn ProcessExecutor> = Arc::new(SystemExecutor::new());
    let mut orchestrator = Orchestrator::new(options, components, executor);
    if format == MessageFormat::Json {
        let observer: EventObserver = Arc::new(|event: &MatrixEvent| println!("{}", event.to_json()));
        orchestrator = orchestrator.with_observer(observer);
    }

    let report = orchestrator.run()?;
    if format == MessageFormat::Human {
        print_summary(&report);
    }

    Ok(report.exit_code())
}

/// Merge command-line values over config file values over defaults.
fn options_from(cli: Cli, config: &Config) -> Result<MatrixOptions> {
    let defaults = MatrixOptions::default();

    let source_paths: Vec<PathBuf> = if cli.sources.is_empty() {
        config.build.sources.clone()
    } else {
        cli.sources
    };
    let sources = source_paths
        .iter()
        .map(SourceTree::new)
        .collect::<Result<Vec<_>>>()?;

    let flavor_names = if cli.flavors.is_empty() {
        config.build.flavors.clone()
    } else {
        cli.flavors
    };
    let flavors = config.resolve_flavors(&flavor_names)?;

    let mut extra_configure_flags = std::collections::BTreeMap::new();
    for spec in &cli.extra_configure_flags {
        let (component, flags) = parse_extra_flags(spec)?;
        extra_configure_flags
            .entry(component)
            .or_insert_with(Vec::new)
            .extend(flags);
    }

    Ok(MatrixOptions {
        sources,
        flavors,
        threads: cli.threads.or(config.build.threads).unwrap_or(defaults.threads),
        jobs: cli.jobs.or(config.build.jobs).unwrap_or(defaults.jobs),
        keep_going: cli.keep_going,
        no_install: cli.no_install,
        force_configure: cli.force_configure,
        skip_components: cli.skip.into_iter().collect(),
        extra_configure_flags,
        install_root: absolute(
            cli.install_root
                .or_else(|| config.build.install_root.clone())
                .unwrap_or(defaults.install_root),
        )?,
        build_root: absolute(
            cli.build_root
                .or_else(|| config.build.build_root.clone())
                .unwrap_or(defaults.build_root),
        )?,
        cc: cli.cc.or_else(|| config.build.cc.clone()),
        cxx: cli.cxx.or_else(|| config.build.cxx.clone()),
        make: cli
            .make
            .or_else(|| config.build.make.clone())
            .unwrap_or(defaults.make),
        no_flavor_in_install_path: cli.no_flavor_in_install_path,
        enable_werror: cli.enable_werror,
    })
}

// Stages run in other directories, so roots must be absolute.
fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&path).with_context(|| format!("invalid path: {}", path.display()))
}

fn print_summary(report: &MatrixReport) {
    eprintln!();
    for item in &report.items {
        eprintln!("{}", item);
    }
    let failed = report.failures().count();
    eprintln!(
        "{} of {} item(s) succeeded in {:.2}s",
        report.items.len() - failed,
        report.items.len(),
        report.duration.as_secs_f64()
    );
}
