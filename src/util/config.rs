//! Configuration for a matrix run.
//!
//! buildmatrix reads two optional configuration files:
//! - Global: `~/.buildmatrix/config.toml` - User-wide defaults
//! - Project: `.buildmatrix/config.toml` - Overrides for the current directory
//!
//! Project config takes precedence over global config, and command-line
//! values take precedence over both. The merged result is turned into a
//! [`MatrixOptions`], which is validated once before any work is queued.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{BuildFlavor, Component, SourceTree};
use crate::util::abbrev::AbbrevError;
use crate::util::process::find_executable;

/// Errors that abort a run before anything is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no source trees given")]
    NoSources,

    #[error("no build flavors given")]
    NoFlavors,

    #[error("unknown build flavor `{name}` (known flavors: {})", .known.join(", "))]
    UnknownFlavor { name: String, known: Vec<String> },

    #[error("invalid flavor name `{name}`: must be a non-empty directory name without `/`")]
    InvalidFlavorName { name: String },

    #[error("thread count must be at least 1")]
    ZeroThreads,

    #[error("source tree does not exist: {}", .path.display())]
    MissingSource { path: PathBuf },

    #[error("source tree `{source_tree}` has no `{component}` checkout at {}", .path.display())]
    MissingComponentDir {
        source_tree: String,
        component: String,
        path: PathBuf,
    },

    #[error("duplicate component `{name}`")]
    DuplicateComponent { name: String },

    #[error("unknown component `{name}` given to {option}")]
    UnknownComponent { name: String, option: &'static str },

    #[error("component `{component}` uses tools from `{from}`, which is not declared before it")]
    ToolEnvOrder { component: String, from: String },

    #[error("{count} flavors cannot share one install directory per source tree; drop --no-flavor-in-install-path or build one flavor")]
    SharedInstallPath { count: usize },

    #[error("compiler not found: {}", .name.display())]
    CompilerNotFound { name: PathBuf },

    #[error("cannot label source trees: {0}")]
    Labels(#[from] AbbrevError),
}

/// Everything the orchestrator needs to run one matrix.
#[derive(Debug, Clone)]
pub struct MatrixOptions {
    /// Source trees to build
    pub sources: Vec<SourceTree>,

    /// Flavors to build each source tree in
    pub flavors: Vec<BuildFlavor>,

    /// Number of concurrent workers
    pub threads: usize,

    /// Total build-tool parallelism, shared across workers
    pub jobs: usize,

    /// Continue with later stages after a failure
    pub keep_going: bool,

    /// Skip the install stage
    pub no_install: bool,

    /// Configure even if the build directory looks configured
    pub force_configure: bool,

    /// Components not to build
    pub skip_components: BTreeSet<String>,

    /// Extra configure flags per component
    pub extra_configure_flags: BTreeMap<String, Vec<String>>,

    /// Root for per-item install directories
    pub install_root: PathBuf,

    /// Root for per-item build directories
    pub build_root: PathBuf,

    /// C compiler
    pub cc: Option<PathBuf>,

    /// C++ compiler
    pub cxx: Option<PathBuf>,

    /// Build tool invoked for build, test and install
    pub make: PathBuf,

    /// Leave the flavor out of install paths
    pub no_flavor_in_install_path: bool,

    /// Configure with warnings as errors
    pub enable_werror: bool,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        MatrixOptions {
            sources: Vec::new(),
            flavors: Vec::new(),
            threads: 1,
            jobs: default_jobs(),
            keep_going: false,
            no_install: false,
            force_configure: false,
            skip_components: BTreeSet::new(),
            extra_configure_flags: BTreeMap::new(),
            install_root: PathBuf::from("install"),
            build_root: PathBuf::from("build"),
            cc: None,
            cxx: None,
            make: PathBuf::from("make"),
            no_flavor_in_install_path: false,
            enable_werror: false,
        }
    }
}

/// Host parallelism, or 1 if it cannot be determined.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl MatrixOptions {
    /// Parallelism handed to each build-tool invocation.
    ///
    /// `jobs` is split evenly across workers so total host load stays near
    /// the requested bound.
    pub fn make_jobs(&self) -> usize {
        (self.jobs / self.threads.max(1)).max(1)
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.threads
    }

    /// Components that will actually be built, in declaration order.
    pub fn active_components<'a>(&self, components: &'a [Component]) -> Vec<&'a Component> {
        components
            .iter()
            .filter(|c| !self.skip_components.contains(&c.name))
            .collect()
    }

    /// Check the options against the component list and the filesystem.
    ///
    /// Compiler names are resolved to absolute paths as a side effect.
    pub fn validate(&mut self, components: &[Component]) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if self.flavors.is_empty() {
            return Err(ConfigError::NoFlavors);
        }
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if let Some(flavor) = self
            .flavors
            .iter()
            .find(|f| !BuildFlavor::is_valid_name(&f.name))
        {
            return Err(ConfigError::InvalidFlavorName {
                name: flavor.name.clone(),
            });
        }

        let distinct_flavors: HashSet<&str> =
            self.flavors.iter().map(|f| f.name.as_str()).collect();
        if self.no_flavor_in_install_path && distinct_flavors.len() > 1 {
            return Err(ConfigError::SharedInstallPath {
                count: distinct_flavors.len(),
            });
        }

        validate_components(components)?;

        let known: HashSet<&str> = components.iter().map(|c| c.name.as_str()).collect();
        for name in &self.skip_components {
            if !known.contains(name.as_str()) {
                return Err(ConfigError::UnknownComponent {
                    name: name.clone(),
                    option: "--skip",
                });
            }
        }
        for name in self.extra_configure_flags.keys() {
            if !known.contains(name.as_str()) {
                return Err(ConfigError::UnknownComponent {
                    name: name.clone(),
                    option: "--extra-configure-flags",
                });
            }
        }

        let active = self.active_components(components);
        for source in &self.sources {
            if !source.path().is_dir() {
                return Err(ConfigError::MissingSource {
                    path: source.path().to_path_buf(),
                });
            }
            for component in &active {
                let dir = source.component_dir(component.subdir.as_deref());
                if !dir.is_dir() {
                    return Err(ConfigError::MissingComponentDir {
                        source_tree: source.to_string(),
                        component: component.name.clone(),
                        path: dir,
                    });
                }
            }
        }

        self.cc = self.cc.take().map(resolve_compiler).transpose()?;
        self.cxx = self.cxx.take().map(resolve_compiler).transpose()?;

        Ok(())
    }
}

fn resolve_compiler(name: PathBuf) -> Result<PathBuf, ConfigError> {
    find_executable(&name, None).ok_or(ConfigError::CompilerNotFound { name })
}

/// Check that component names are unique and tool dependencies point backwards.
pub fn validate_components(components: &[Component]) -> Result<(), ConfigError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for component in components {
        for tool in &component.tool_env {
            if !seen.contains(tool.from_component.as_str()) {
                return Err(ConfigError::ToolEnvOrder {
                    component: component.name.clone(),
                    from: tool.from_component.clone(),
                });
            }
        }
        if !seen.insert(component.name.as_str()) {
            return Err(ConfigError::DuplicateComponent {
                name: component.name.clone(),
            });
        }
    }
    Ok(())
}

/// Contents of a `config.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Flavor definitions, keyed by name (new flavors or overrides)
    pub flavor: BTreeMap<String, FlavorConfig>,

    /// Component list; replaces the built-in components when non-empty
    pub component: Vec<Component>,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default source trees
    pub sources: Vec<PathBuf>,

    /// Default flavors
    pub flavors: Vec<String>,

    /// Number of concurrent workers
    pub threads: Option<usize>,

    /// Total build-tool parallelism
    pub jobs: Option<usize>,

    /// Root for build directories
    pub build_root: Option<PathBuf>,

    /// Root for install directories
    pub install_root: Option<PathBuf>,

    /// C compiler
    pub cc: Option<PathBuf>,

    /// C++ compiler
    pub cxx: Option<PathBuf>,

    /// Build tool (default: make)
    pub make: Option<PathBuf>,
}

/// Flags for one flavor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlavorConfig {
    pub configure_flags: Vec<String>,
    pub make_flags: Vec<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if !other.build.sources.is_empty() {
            self.build.sources = other.build.sources;
        }
        if !other.build.flavors.is_empty() {
            self.build.flavors = other.build.flavors;
        }
        if other.build.threads.is_some() {
            self.build.threads = other.build.threads;
        }
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.build_root.is_some() {
            self.build.build_root = other.build.build_root;
        }
        if other.build.install_root.is_some() {
            self.build.install_root = other.build.install_root;
        }
        if other.build.cc.is_some() {
            self.build.cc = other.build.cc;
        }
        if other.build.cxx.is_some() {
            self.build.cxx = other.build.cxx;
        }
        if other.build.make.is_some() {
            self.build.make = other.build.make;
        }

        self.flavor.extend(other.flavor);

        if !other.component.is_empty() {
            self.component = other.component;
        }
    }

    /// Look up a flavor by name: config definitions first, then built-ins.
    pub fn flavor(&self, name: &str) -> Option<BuildFlavor> {
        match self.flavor.get(name) {
            Some(flags) => Some(BuildFlavor {
                name: name.to_string(),
                configure_flags: flags.configure_flags.clone(),
                make_flags: flags.make_flags.clone(),
            }),
            None => BuildFlavor::builtin(name),
        }
    }

    /// Resolve flavor names, rejecting unknown ones.
    pub fn resolve_flavors<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<BuildFlavor>, ConfigError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                if !BuildFlavor::is_valid_name(name) {
                    return Err(ConfigError::InvalidFlavorName {
                        name: name.to_string(),
                    });
                }
                self.flavor(name).ok_or_else(|| ConfigError::UnknownFlavor {
                    name: name.to_string(),
                    known: self.known_flavors(),
                })
            })
            .collect()
    }

    /// Names of every flavor this config can resolve.
    pub fn known_flavors(&self) -> Vec<String> {
        let mut names: Vec<String> = BuildFlavor::builtins().into_iter().map(|f| f.name).collect();
        for name in self.flavor.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// The component list: configured components, or the built-ins.
    pub fn components(&self) -> Vec<Component> {
        if self.component.is_empty() {
            crate::core::builtin_components()
        } else {
            self.component.clone()
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.buildmatrix/config.toml)
/// 2. Global config (~/.buildmatrix/config.toml)
/// 3. Defaults
///
/// A file that exists but cannot be parsed is an error.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path.filter(|p| p.exists()) {
        config.merge(Config::load(global_path)?);
    }

    if project_path.exists() {
        config.merge(Config::load(project_path)?);
    }

    Ok(config)
}

/// Get the global buildmatrix config directory (~/.buildmatrix).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".buildmatrix"))
}

/// Get the global config path (~/.buildmatrix/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.buildmatrix/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".buildmatrix").join("config.toml")
}
