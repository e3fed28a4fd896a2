//! Source trees - WHERE a checkout of every component lives.

use std::fmt;
use std::path::{Component as PathComponent, Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One checkout of all components, identified by its absolute root path.
///
/// Equality, hashing and ordering use the full path. Labels derived for
/// display never take part in identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTree {
    path: PathBuf,
}

impl SourceTree {
    /// Create a source tree, making relative paths absolute against the
    /// current directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .context("failed to determine current directory")?
                .join(path)
        };

        Ok(SourceTree {
            path: lexical_normalize(&absolute),
        })
    }

    /// Get the root path of this tree.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The tree's path with the filesystem root stripped, suitable for
    /// nesting under another directory.
    pub fn relative_root(&self) -> PathBuf {
        self.path
            .components()
            .filter(|c| matches!(c, PathComponent::Normal(_)))
            .collect()
    }

    /// Path of a component's checkout inside this tree.
    pub fn component_dir(&self, subdir: Option<&Path>) -> PathBuf {
        match subdir {
            Some(dir) => self.path.join(dir),
            None => self.path.clone(),
        }
    }

    /// The path rendered as a string, for label derivation.
    pub fn display_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

impl fmt::Display for SourceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Collapse `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            PathComponent::CurDir => {}
            PathComponent::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_path_kept() {
        let tree = SourceTree::new("/t/official/llvm").unwrap();
        assert_eq!(tree.path(), Path::new("/t/official/llvm"));
    }

    #[test]
    fn test_relative_path_made_absolute() {
        let tree = SourceTree::new("checkouts/llvm").unwrap();
        assert!(tree.path().is_absolute());
        assert!(tree.path().ends_with("checkouts/llvm"));
    }

    #[test]
    fn test_dots_collapsed() {
        let tree = SourceTree::new("/t/official/./x/../llvm/").unwrap();
        assert_eq!(tree.path(), Path::new("/t/official/llvm"));
    }

    #[test]
    fn test_relative_root() {
        let tree = SourceTree::new("/t/staging/llvm").unwrap();
        assert_eq!(tree.relative_root(), PathBuf::from("t/staging/llvm"));
    }

    #[test]
    fn test_component_dir() {
        let tree = SourceTree::new("/src/head").unwrap();
        assert_eq!(tree.component_dir(None), PathBuf::from("/src/head"));
        assert_eq!(
            tree.component_dir(Some(Path::new("dragonegg"))),
            PathBuf::from("/src/head/dragonegg")
        );
    }
}
