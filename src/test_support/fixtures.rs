//! Test fixtures for common test scenarios.
//!
//! Builds on-disk source trees under a temporary directory so validation
//! (which checks that checkouts exist) passes in tests.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::{BuildFlavor, Component, SourceTree};
use crate::util::config::MatrixOptions;

/// A temporary workspace with source trees, build and install roots.
pub struct MatrixFixture {
    /// Keeps the directory alive.
    pub tmp: TempDir,
    /// Created source trees, in the order given.
    pub sources: Vec<SourceTree>,
}

impl MatrixFixture {
    /// Create source trees at `relative_paths` (relative to a fresh temp
    /// dir), each holding a checkout directory for every component.
    pub fn new(relative_paths: &[&str], components: &[Component]) -> Self {
        let tmp = TempDir::new().unwrap();
        let sources = relative_paths
            .iter()
            .map(|rel| {
                let root = tmp.path().join(rel);
                std::fs::create_dir_all(&root).unwrap();
                for component in components {
                    if let Some(subdir) = &component.subdir {
                        std::fs::create_dir_all(root.join(subdir)).unwrap();
                    }
                }
                SourceTree::new(root).unwrap()
            })
            .collect();

        MatrixFixture { tmp, sources }
    }

    /// Root of the temporary directory.
    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    /// Build root inside the temp dir.
    pub fn build_root(&self) -> PathBuf {
        self.tmp.path().join("build")
    }

    /// Install root inside the temp dir.
    pub fn install_root(&self) -> PathBuf {
        self.tmp.path().join("install")
    }

    /// Options for building every source in the given flavors.
    pub fn options(&self, flavors: &[&str]) -> MatrixOptions {
        MatrixOptions {
            sources: self.sources.clone(),
            flavors: flavors
                .iter()
                .map(|f| BuildFlavor::builtin(f).unwrap_or_else(|| BuildFlavor::new(*f)))
                .collect(),
            threads: 2,
            jobs: 4,
            build_root: self.build_root(),
            install_root: self.install_root(),
            ..MatrixOptions::default()
        }
    }
}

/// A component with a no-op configure, checked out at `name/`.
pub fn noop_component(name: &str) -> Component {
    Component::new(name).subdir(name)
}
