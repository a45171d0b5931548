//! Shared filesystem helpers for locating the catalog's data files.

use std::path::{Path, PathBuf};

use crate::error::{CatalogError, Result};

/// Gets the cross-platform default data directory.
///
/// Returns `{data_dir}/tunebook` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
///
/// # Errors
///
/// Returns an error if the platform data directory cannot be determined.
pub fn default_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        CatalogError::validation("data_dir", "failed to determine the platform data directory")
    })?;

    Ok(data_dir.join("tunebook"))
}

/// Ensures the parent directory of a data file exists.
///
/// Creates the directory structure if it doesn't exist using `create_dir_all`.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn ensure_parent_directory(file: &Path) -> Result<()> {
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
