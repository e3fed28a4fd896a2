//! Build context - resolved flags and directories for each work item.
//!
//! Flag tables are resolved once per (component, flavor) before any worker
//! starts and are shared read-only afterwards. Directory paths are computed
//! by pure functions of (root, source, flavor), so two workers never build
//! or install into the same place.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::core::{BuildFlavor, Component, SourceTree, WorkItem};
use crate::util::config::MatrixOptions;

/// Flags for one (component, flavor) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSettings {
    /// Configure flags placed before `--prefix`: component, flavor, werror
    pub configure_flags: Vec<String>,

    /// User-supplied configure flags, placed last so they win
    pub extra_configure_flags: Vec<String>,

    /// Make variables for build, test and install
    pub make_flags: Vec<String>,
}

/// All resolved [`StageSettings`] of a run.
#[derive(Debug, Clone, Default)]
pub struct BuildSettings {
    settings: HashMap<(String, String), StageSettings>,
}

impl BuildSettings {
    /// Resolve settings for every component and flavor.
    pub fn resolve(components: &[Component], opts: &MatrixOptions) -> Self {
        let mut settings = HashMap::new();

        for component in components {
            let extra = opts
                .extra_configure_flags
                .get(&component.name)
                .cloned()
                .unwrap_or_default();

            for flavor in &opts.flavors {
                let mut configure_flags = Vec::new();
                if let Some(step) = &component.configure {
                    configure_flags.extend(step.flags.iter().cloned());
                    configure_flags.extend(flavor.configure_flags.iter().cloned());
                    if opts.enable_werror {
                        configure_flags.push("--enable-werror".to_string());
                    }
                }

                let mut make_flags = flavor.make_flags.clone();
                make_flags.extend(component.make_flags.iter().cloned());
                if let (Some(var), Some(cc)) = (&component.cc_make_var, &opts.cc) {
                    make_flags.push(format!("{}={}", var, cc.display()));
                }

                settings.insert(
                    (component.name.clone(), flavor.name.clone()),
                    StageSettings {
                        configure_flags,
                        extra_configure_flags: extra.clone(),
                        make_flags,
                    },
                );
            }
        }

        BuildSettings { settings }
    }

    /// Settings for a component in a flavor.
    pub fn get(&self, component: &str, flavor: &str) -> Option<&StageSettings> {
        self.settings
            .get(&(component.to_string(), flavor.to_string()))
    }
}

/// Install location for a (source, flavor) pair.
///
/// `base/<source path>/<flavor>`, or `base/<source path>` when the flavor
/// suffix is turned off.
pub fn compute_install_path(
    base: &Path,
    source: &SourceTree,
    flavor: &BuildFlavor,
    flavor_suffix: bool,
) -> PathBuf {
    let path = base.join(source.relative_root());
    if flavor_suffix {
        path.join(&flavor.name)
    } else {
        path
    }
}

/// Build directory for one component of a (source, flavor) pair.
pub fn compute_build_path(
    base: &Path,
    source: &SourceTree,
    flavor: &BuildFlavor,
    component: &Component,
) -> PathBuf {
    base.join(source.relative_root())
        .join(&flavor.name)
        .join(&component.name)
}

/// Everything a pipeline needs to know about one work item.
#[derive(Debug, Clone)]
pub struct ItemContext {
    /// Display label for log lines
    pub label: String,

    /// The matrix cell
    pub item: WorkItem,

    /// Install location shared by the item's components
    pub install_root: PathBuf,

    /// Root of the item's build directories
    build_base: PathBuf,

    /// Environment applied to every stage (compilers)
    pub env: BTreeMap<String, String>,
}

impl ItemContext {
    /// Create the context for a work item.
    pub fn new(item: WorkItem, label: impl Into<String>, opts: &MatrixOptions) -> Self {
        let install_root = compute_install_path(
            &opts.install_root,
            &item.source,
            &item.flavor,
            !opts.no_flavor_in_install_path,
        );

        let mut env = BTreeMap::new();
        if let Some(cc) = &opts.cc {
            env.insert("CC".to_string(), cc.display().to_string());
        }
        if let Some(cxx) = &opts.cxx {
            env.insert("CXX".to_string(), cxx.display().to_string());
        }

        ItemContext {
            label: label.into(),
            install_root,
            build_base: opts.build_root.clone(),
            env,
            item,
        }
    }

    /// Where a component's checkout lives.
    pub fn source_dir(&self, component: &Component) -> PathBuf {
        self.item.source.component_dir(component.subdir.as_deref())
    }

    /// Where a component is built.
    pub fn build_dir(&self, component: &Component) -> PathBuf {
        compute_build_path(
            &self.build_base,
            &self.item.source,
            &self.item.flavor,
            component,
        )
    }

    /// Where a component is installed.
    pub fn install_dir(&self, component_name: &str) -> PathBuf {
        self.install_root.join(component_name)
    }

    /// Stage environment for a component: compilers plus tool paths taken
    /// from the install locations of the components it depends on.
    pub fn stage_env(&self, component: &Component) -> BTreeMap<String, String> {
        let mut env = self.env.clone();

        let mut path_prefix: Vec<PathBuf> = Vec::new();
        for tool in &component.tool_env {
            let location = self.install_dir(&tool.from_component).join(&tool.relative);
            if tool.var == "PATH" {
                path_prefix.push(location);
            } else {
                env.insert(tool.var.clone(), location.display().to_string());
            }
        }

        if !path_prefix.is_empty() {
            if let Some(inherited) = std::env::var_os("PATH") {
                path_prefix.extend(std::env::split_paths(&inherited));
            }
            match std::env::join_paths(&path_prefix) {
                Ok(joined) => {
                    env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
                }
                Err(e) => {
                    tracing::warn!("cannot extend PATH for {}: {}", component.name, e);
                }
            }
        }

        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builtin_components;

    fn options() -> MatrixOptions {
        MatrixOptions {
            flavors: vec![
                BuildFlavor::builtin("debug").unwrap(),
                BuildFlavor::builtin("release").unwrap(),
            ],
            install_root: PathBuf::from("/install"),
            build_root: PathBuf::from("/build"),
            ..MatrixOptions::default()
        }
    }

    fn item(source: &str, flavor: &str) -> WorkItem {
        WorkItem::new(
            SourceTree::new(source).unwrap(),
            BuildFlavor::builtin(flavor).unwrap(),
        )
    }

    #[test]
    fn test_install_path_unique_per_item() {
        let base = Path::new("/install");
        let official = SourceTree::new("/t/official/llvm").unwrap();
        let staging = SourceTree::new("/t/staging/llvm").unwrap();
        let debug = BuildFlavor::new("debug");
        let release = BuildFlavor::new("release");

        let paths = [
            compute_install_path(base, &official, &debug, true),
            compute_install_path(base, &official, &release, true),
            compute_install_path(base, &staging, &debug, true),
            compute_install_path(base, &staging, &release, true),
        ];
        let unique: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(paths[0], PathBuf::from("/install/t/official/llvm/debug"));
    }

    #[test]
    fn test_install_path_without_flavor() {
        let path = compute_install_path(
            Path::new("/install"),
            &SourceTree::new("/t/official/llvm").unwrap(),
            &BuildFlavor::new("debug"),
            false,
        );
        assert_eq!(path, PathBuf::from("/install/t/official/llvm"));
    }

    #[test]
    fn test_build_path() {
        let path = compute_build_path(
            Path::new("/build"),
            &SourceTree::new("/t/official/llvm").unwrap(),
            &BuildFlavor::new("release"),
            &Component::new("core"),
        );
        assert_eq!(path, PathBuf::from("/build/t/official/llvm/release/core"));
    }

    #[test]
    fn test_settings_merge_order() {
        let mut opts = options();
        opts.enable_werror = true;
        opts.extra_configure_flags
            .insert("llvm".to_string(), vec!["--enable-shared".to_string()]);
        opts.cc = Some(PathBuf::from("/usr/bin/gcc"));

        let settings = BuildSettings::resolve(&builtin_components(), &opts);

        let llvm = settings.get("llvm", "release").unwrap();
        assert_eq!(
            llvm.configure_flags,
            vec![
                "--enable-targets=host",
                "--enable-optimized",
                "--disable-assertions",
                "--enable-werror",
            ]
        );
        assert_eq!(llvm.extra_configure_flags, vec!["--enable-shared"]);

        let dragonegg = settings.get("dragonegg", "debug").unwrap();
        assert!(dragonegg.configure_flags.is_empty());
        assert_eq!(
            dragonegg.make_flags,
            vec!["ENABLE_OPTIMIZED=0", "GCC=/usr/bin/gcc"]
        );

        assert!(settings.get("llvm", "paranoid").is_none());
    }

    #[test]
    fn test_stage_env_exposes_dependency_tools() {
        let mut opts = options();
        opts.cc = Some(PathBuf::from("/usr/bin/gcc"));
        let ctx = ItemContext::new(item("/t/official/llvm", "debug"), "official/deb", &opts);

        let components = builtin_components();
        let env = ctx.stage_env(&components[1]);

        assert_eq!(env["CC"], "/usr/bin/gcc");
        assert_eq!(
            env["LLVM_CONFIG"],
            "/install/t/official/llvm/debug/llvm/bin/llvm-config"
        );
        assert!(env["PATH"].starts_with("/install/t/official/llvm/debug/llvm/bin"));

        let llvm_env = ctx.stage_env(&components[0]);
        assert!(!llvm_env.contains_key("LLVM_CONFIG"));
        assert!(!llvm_env.contains_key("PATH"));
    }

    #[test]
    fn test_item_dirs() {
        let opts = options();
        let ctx = ItemContext::new(item("/t/staging/llvm", "release"), "staging/rel", &opts);
        let llvm = &builtin_components()[0];

        assert_eq!(ctx.source_dir(llvm), PathBuf::from("/t/staging/llvm/llvm"));
        assert_eq!(
            ctx.build_dir(llvm),
            PathBuf::from("/build/t/staging/llvm/release/llvm")
        );
        assert_eq!(
            ctx.install_dir("llvm"),
            PathBuf::from("/install/t/staging/llvm/release/llvm")
        );
    }
}
