use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Scan a flat content-addressed blob directory.
///
/// Every entry's filename is taken as a digest and its byte length as the
/// blob size. A missing or unreadable directory is an error: statistics
/// over an incomplete snapshot would be misleading, so the caller aborts
/// instead of reporting partial totals.
pub fn scan_blob_dir(dir: &Path) -> Result<Vec<(String, u64)>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read blob directory {}", dir.display()))?;

    let mut blobs = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read blob directory {}", dir.display()))?;
        let size = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?
            .len();
        blobs.push((entry.file_name().to_string_lossy().into_owned(), size));
    }
    Ok(blobs)
}
