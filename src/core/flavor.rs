//! Build flavors (debug, release, paranoid, ...).

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Names of the flavors every build knows about.
pub const BUILTIN_FLAVORS: &[&str] = &["debug", "release", "paranoid"];

/// A named configuration variant mapping to configure and make flags.
///
/// Identity is the name alone; two flavors with the same name compare
/// equal even if their flag sets differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildFlavor {
    /// Flavor name (e.g., "debug")
    pub name: String,

    /// Flags appended to every component's configure invocation
    #[serde(default)]
    pub configure_flags: Vec<String>,

    /// Variables passed to every make invocation (e.g., `ENABLE_OPTIMIZED=1`)
    #[serde(default)]
    pub make_flags: Vec<String>,
}

impl BuildFlavor {
    /// Create a flavor with no flags.
    pub fn new(name: impl Into<String>) -> Self {
        BuildFlavor {
            name: name.into(),
            configure_flags: Vec::new(),
            make_flags: Vec::new(),
        }
    }

    /// Add configure flags.
    pub fn with_configure_flags(mut self, flags: &[&str]) -> Self {
        self.configure_flags
            .extend(flags.iter().map(|f| f.to_string()));
        self
    }

    /// Add make flags.
    pub fn with_make_flags(mut self, flags: &[&str]) -> Self {
        self.make_flags.extend(flags.iter().map(|f| f.to_string()));
        self
    }

    /// Whether `name` can be used as a single path component.
    ///
    /// Flavor names become install and build directory names.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.chars().any(char::is_control)
    }

    /// Look up one of the built-in flavors by name.
    pub fn builtin(name: &str) -> Option<Self> {
        let flavor = match name {
            "debug" => BuildFlavor::new("debug")
                .with_configure_flags(&["--disable-optimized", "--enable-assertions"])
                .with_make_flags(&["ENABLE_OPTIMIZED=0"]),
            "release" => BuildFlavor::new("release")
                .with_configure_flags(&["--enable-optimized", "--disable-assertions"])
                .with_make_flags(&["ENABLE_OPTIMIZED=1", "DISABLE_ASSERTIONS=1"]),
            "paranoid" => BuildFlavor::new("paranoid")
                .with_configure_flags(&[
                    "--disable-optimized",
                    "--enable-assertions",
                    "--enable-expensive-checks",
                ])
                .with_make_flags(&["ENABLE_OPTIMIZED=0", "ENABLE_EXPENSIVE_CHECKS=1"]),
            _ => return None,
        };
        Some(flavor)
    }

    /// All built-in flavors, in their canonical order.
    pub fn builtins() -> Vec<Self> {
        BUILTIN_FLAVORS
            .iter()
            .filter_map(|name| Self::builtin(name))
            .collect()
    }
}

impl PartialEq for BuildFlavor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for BuildFlavor {}

impl Hash for BuildFlavor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for BuildFlavor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BuildFlavor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for BuildFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
