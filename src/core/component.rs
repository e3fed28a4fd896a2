//! Components - the buildable units inside a source tree.
//!
//! Every component runs the same four stages (configure, build, test,
//! install). A component without a [`ConfigureStep`] skips configuration
//! entirely; that is not an error.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One buildable unit of a source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Component name (e.g., "llvm")
    pub name: String,

    /// Checkout location relative to the source tree root (None = the root itself)
    #[serde(default)]
    pub subdir: Option<PathBuf>,

    /// Configure step; absent for components that build straight from make
    #[serde(default)]
    pub configure: Option<ConfigureStep>,

    /// Make targets for the build stage (empty = the default target)
    #[serde(default)]
    pub build_targets: Vec<String>,

    /// Make target for the test stage (None = no test stage)
    #[serde(default = "default_test_target")]
    pub test_target: Option<String>,

    /// Make target for the install stage
    #[serde(default = "default_install_target")]
    pub install_target: String,

    /// Extra make variables for every make invocation of this component
    #[serde(default)]
    pub make_flags: Vec<String>,

    /// Make variable that receives the C compiler path (e.g., "GCC")
    #[serde(default)]
    pub cc_make_var: Option<String>,

    /// Environment exposed from another component's install location
    #[serde(default)]
    pub tool_env: Vec<ToolEnv>,
}

/// How a component is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureStep {
    /// Configure script, relative to the component's source directory
    #[serde(default = "default_configure_script")]
    pub script: PathBuf,

    /// Build-directory artifact whose age gates reconfiguration
    #[serde(default = "default_configure_stamp")]
    pub stamp: PathBuf,

    /// Flags passed to every configure invocation of this component
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Default for ConfigureStep {
    fn default() -> Self {
        ConfigureStep {
            script: default_configure_script(),
            stamp: default_configure_stamp(),
            flags: Vec::new(),
        }
    }
}

/// An environment variable pointing into another component's install tree.
///
/// `PATH` is prepended to the inherited search path instead of replacing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEnv {
    /// Variable name (e.g., "LLVM_CONFIG")
    pub var: String,

    /// Component whose install location is referenced
    pub from_component: String,

    /// Path relative to that install location (e.g., "bin/llvm-config")
    #[serde(default)]
    pub relative: PathBuf,
}

fn default_test_target() -> Option<String> {
    Some("check".to_string())
}

fn default_install_target() -> String {
    "install".to_string()
}

fn default_configure_script() -> PathBuf {
    PathBuf::from("configure")
}

fn default_configure_stamp() -> PathBuf {
    PathBuf::from("config.status")
}

impl Component {
    /// Create a component with a no-op configure and the default targets.
    pub fn new(name: impl Into<String>) -> Self {
        Component {
            name: name.into(),
            subdir: None,
            configure: None,
            build_targets: Vec::new(),
            test_target: default_test_target(),
            install_target: default_install_target(),
            make_flags: Vec::new(),
            cc_make_var: None,
            tool_env: Vec::new(),
        }
    }

    /// Set the checkout subdirectory.
    pub fn subdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.subdir = Some(dir.into());
        self
    }

    /// Give the component a configure step.
    pub fn configure(mut self, step: ConfigureStep) -> Self {
        self.configure = Some(step);
        self
    }

    /// Expose a path from another component's install tree.
    pub fn tool_env(
        mut self,
        var: impl Into<String>,
        from_component: impl Into<String>,
        relative: impl Into<PathBuf>,
    ) -> Self {
        self.tool_env.push(ToolEnv {
            var: var.into(),
            from_component: from_component.into(),
            relative: relative.into(),
        });
        self
    }

    /// Whether the configure stage is a no-op for this component.
    pub fn has_noop_configure(&self) -> bool {
        self.configure.is_none()
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The default component list: the compiler core and its GCC plugin.
pub fn builtin_components() -> Vec<Component> {
    let llvm = Component::new("llvm").subdir("llvm").configure(ConfigureStep {
        flags: vec!["--enable-targets=host".to_string()],
        ..ConfigureStep::default()
    });

    let mut dragonegg = Component::new("dragonegg")
        .subdir("dragonegg")
        .tool_env("LLVM_CONFIG", "llvm", "bin/llvm-config")
        .tool_env("PATH", "llvm", "bin");
    dragonegg.cc_make_var = Some("GCC".to_string());

    vec![llvm, dragonegg]
}
