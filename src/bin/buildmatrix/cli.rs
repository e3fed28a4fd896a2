//! CLI definitions using clap.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

/// buildmatrix - build many source trees in many flavors at once
#[derive(Parser)]
#[command(name = "buildmatrix")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source tree to build (repeatable)
    #[arg(long = "src", value_name = "PATH")]
    pub sources: Vec<PathBuf>,

    /// Build flavor (repeatable), e.g. debug, release, paranoid
    #[arg(long = "flavor", value_name = "NAME")]
    pub flavors: Vec<String>,

    /// C compiler
    #[arg(long)]
    pub cc: Option<PathBuf>,

    /// C++ compiler
    #[arg(long)]
    pub cxx: Option<PathBuf>,

    /// Build tool used for build, test and install
    #[arg(long)]
    pub make: Option<PathBuf>,

    /// Number of source trees/flavors to build concurrently
    #[arg(short, long, env = "BUILDMATRIX_THREADS")]
    pub threads: Option<usize>,

    /// Total build-tool parallelism, split across threads
    #[arg(short, long, env = "BUILDMATRIX_JOBS")]
    pub jobs: Option<usize>,

    /// Root directory for build directories
    #[arg(long)]
    pub build_root: Option<PathBuf>,

    /// Root directory for install directories
    #[arg(long)]
    pub install_root: Option<PathBuf>,

    /// Extra configure flags for a component, as COMPONENT=FLAGS (repeatable)
    #[arg(long = "extra-configure-flags", value_name = "COMPONENT=FLAGS")]
    pub extra_configure_flags: Vec<String>,

    /// Configure even when the build directory is already configured
    #[arg(long)]
    pub force_configure: bool,

    /// Keep building after a stage fails
    #[arg(short, long)]
    pub keep_going: bool,

    /// Don't install
    #[arg(long)]
    pub no_install: bool,

    /// Don't build this component (repeatable)
    #[arg(long = "skip", value_name = "COMPONENT")]
    pub skip: Vec<String>,

    /// Install into <install-root>/<source> instead of <install-root>/<source>/<flavor>
    #[arg(long)]
    pub no_flavor_in_install_path: bool,

    /// Configure with --enable-werror
    #[arg(long)]
    pub enable_werror: bool,

    /// Config file (default: .buildmatrix/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format for run results
    #[arg(long, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

/// Split `COMPONENT=FLAGS` into the component and its flags.
pub fn parse_extra_flags(spec: &str) -> Result<(String, Vec<String>)> {
    let Some((component, flags)) = spec.split_once('=') else {
        bail!("invalid --extra-configure-flags `{}`: expected COMPONENT=FLAGS", spec);
    };
    let component = component.trim();
    if component.is_empty() {
        bail!("invalid --extra-configure-flags `{}`: missing component", spec);
    }
    Ok((
        component.to_string(),
        flags.split_whitespace().map(str::to_string).collect(),
    ))
}
