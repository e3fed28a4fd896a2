//! Filesystem utilities.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Modification time of a path, if it exists.
pub fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether `artifact` exists and is at least as new as `input`.
///
/// Both must exist; a missing `input` never makes an artifact current.
pub fn is_up_to_date(artifact: &Path, input: &Path) -> bool {
    match (modified(artifact), modified(input)) {
        (Some(artifact), Some(input)) => artifact >= input,
        _ => false,
    }
}
