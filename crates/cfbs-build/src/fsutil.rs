//! Filesystem helpers shared by downloads and build steps.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Copies a file or the contents of a directory.
///
/// A file copied onto an existing directory (or a path ending in `/`) lands
/// inside it under its own name. Directory contents are merged into `dst`.
pub fn cp(src: &Path, dst: &Path) -> Result<()> {
    if src.is_file() {
        let into_dir = dst.is_dir() || dst.to_string_lossy().ends_with('/');
        let target = match (into_dir, src.file_name()) {
            (true, Some(name)) => dst.join(name),
            _ => dst.to_path_buf(),
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        fs::copy(src, &target).with_context(|| {
            format!("failed to copy '{}' to '{}'", src.display(), target.display())
        })?;
        return Ok(());
    }

    if !src.is_dir() {
        anyhow::bail!("cannot copy '{}': no such file or directory", src.display());
    }
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("failed to walk '{}'", src.display()))?;
        let relative = entry.path().strip_prefix(src)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create '{}'", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "failed to copy '{}' to '{}'",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }
    Ok(())
}

/// Removes a file or directory tree. Returns false if nothing was there.
pub fn rm(path: &Path) -> Result<bool> {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(false);
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.with_context(|| format!("failed to remove '{}'", path.display()))?;
    Ok(true)
}

pub fn pad_right(s: &str, width: usize) -> String {
    format!("{s:<width$}")
}

/// All files below `dir` with the given extension, sorted.
pub fn find_files(dir: &Path, extension: &str) -> Result<Vec<std::path::PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk '{}'", dir.display()))?;
        if entry.file_type().is_file() && entry.path().to_string_lossy().ends_with(extension) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}
