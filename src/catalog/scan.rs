//! Recursive discovery of catalog images.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions treated as catalog images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Every image under `dir`, recursively. Siblings are visited in file-name
/// order, which yields the paths sorted.
///
/// The index build and the catalog import both walk the tree through this
/// function so the identifiers they record are byte-identical. Symlinks are
/// not followed, so every image is reached through exactly one path.
pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to walk image directory {}", dir.display()))?;
        if entry.file_type().is_file() && is_image_path(entry.path()) {
            found.push(entry.into_path());
        }
    }

    Ok(found)
}
