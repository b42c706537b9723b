use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::layout::{Layout, MANIFEST_TAG, Workspace};

use super::{index, manifest, store};

#[derive(Debug)]
struct BlobSeen {
    size: u64,
    count: u64,
}

/// Cross-snapshot blob occurrence table for one layout.
///
/// Counts deliberately cross snapshot boundaries: the table models a single
/// content-addressed store shared by every analyzed snapshot, which is the
/// dedup benefit being measured. Per-snapshot self-dedup is not tracked.
#[derive(Debug, Default)]
pub struct OccurrenceTable {
    blobs: HashMap<String, BlobSeen>,
    raw: u64,
}

impl OccurrenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one snapshot's scan output.
    ///
    /// A digest re-observed with a different size means the store is not
    /// content-addressed after all; abort rather than overwrite.
    pub fn add_snapshot(&mut self, blobs: &[(String, u64)]) -> Result<()> {
        for (digest, size) in blobs {
            self.raw += size;
            match self.blobs.entry(digest.clone()) {
                Entry::Occupied(mut e) => {
                    let seen = e.get_mut();
                    if seen.size != *size {
                        anyhow::bail!(
                            "Blob {digest} observed with conflicting sizes {} and {size}",
                            seen.size
                        );
                    }
                    seen.count += 1;
                }
                Entry::Vacant(e) => {
                    e.insert(BlobSeen {
                        size: *size,
                        count: 1,
                    });
                }
            }
        }
        Ok(())
    }

    /// Collapse the table into per-layout totals.
    pub fn stats(&self) -> DedupStats {
        let saved = self
            .blobs
            .values()
            .filter(|b| b.count > 1)
            .map(|b| (b.count - 1) * b.size)
            .sum();
        DedupStats {
            raw: self.raw,
            saved,
        }
    }
}

/// Per-layout dedup totals, in whole bytes. Unit conversion for display is
/// the caller's concern.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DedupStats {
    /// Every snapshot's blob directory summed, duplicates included.
    pub raw: u64,
    /// Bytes eliminated by storing each duplicated blob once.
    pub saved: u64,
}

impl DedupStats {
    /// Size of the unified store: raw minus saved.
    pub fn mashed(&self) -> u64 {
        self.raw - self.saved
    }
}

/// Scan every tag's blob directory under one layout into an occurrence
/// table. Any unreadable directory aborts the whole scan.
pub fn build_occurrence_table(
    ws: &Workspace,
    layout: Layout,
    tags: &[String],
) -> Result<OccurrenceTable> {
    let mut table = OccurrenceTable::new();
    for tag in tags {
        let blobs = store::scan_blob_dir(&ws.blob_dir(layout, tag))
            .with_context(|| format!("Scanning {layout} blobs of {tag}"))?;
        table.add_snapshot(&blobs)?;
    }
    Ok(table)
}

/// Metadata weight of one snapshot: the total size of the metadata blobs
/// referenced by its chunked filesystem-image manifest.
///
/// Resolves the fixed logical name in the snapshot's chunked index, decodes
/// the manifest blob's reference records and sums the referenced blobs'
/// sizes from the same blob directory.
pub fn metadata_size(ws: &Workspace, tag: &str) -> Result<u64> {
    let index_path = ws.index_path(tag);
    let index_json = fs::read_to_string(&index_path)
        .with_context(|| format!("Failed to read {}", index_path.display()))?;
    let digest = index::resolve_manifest_digest(&index_json, MANIFEST_TAG)
        .with_context(|| format!("Resolving the {MANIFEST_TAG} manifest of {tag}"))?;

    let blob_dir = ws.blob_dir(Layout::Chunked, tag);
    let manifest_path = blob_dir.join(&digest);
    let raw = fs::read(&manifest_path)
        .with_context(|| format!("Failed to read manifest blob {}", manifest_path.display()))?;

    let mut total = 0u64;
    for referenced in manifest::metadata_references(&raw)? {
        let blob_path = blob_dir.join(&referenced);
        let size = fs::metadata(&blob_path)
            .with_context(|| format!("Failed to stat metadata blob {}", blob_path.display()))?
            .len();
        total += size;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::NAME_ANNOTATION;
    use serde_bytes::ByteBuf;
    use std::path::Path;

    fn snapshot(blobs: &[(&str, u64)]) -> Vec<(String, u64)> {
        blobs
            .iter()
            .map(|(digest, size)| (digest.to_string(), *size))
            .collect()
    }

    #[test]
    fn counts_cross_snapshot_occurrences() {
        let mut table = OccurrenceTable::new();
        table
            .add_snapshot(&snapshot(&[("a", 100), ("b", 200)]))
            .unwrap();
        table
            .add_snapshot(&snapshot(&[("a", 100), ("c", 300)]))
            .unwrap();

        let count = |digest: &str| table.blobs[digest].count;
        assert_eq!(count("a"), 2);
        assert_eq!(count("b"), 1);
        assert_eq!(count("c"), 1);

        let stats = table.stats();
        assert_eq!(stats.raw, 700);
        assert_eq!(stats.saved, 100);
        assert_eq!(stats.mashed(), 600);
    }

    #[test]
    fn saved_never_exceeds_raw() {
        let mut table = OccurrenceTable::new();
        for _ in 0..4 {
            table.add_snapshot(&snapshot(&[("a", 100)])).unwrap();
        }
        let stats = table.stats();
        assert_eq!(stats.raw, 400);
        assert_eq!(stats.saved, 300);
        assert!(stats.saved <= stats.raw);
        assert_eq!(stats.mashed(), stats.raw - stats.saved);
    }

    #[test]
    fn conflicting_sizes_are_an_error() {
        let mut table = OccurrenceTable::new();
        table.add_snapshot(&snapshot(&[("a", 100)])).unwrap();
        let err = table.add_snapshot(&snapshot(&[("a", 101)])).unwrap_err();
        assert!(err.to_string().contains("conflicting sizes"));
    }

    fn write_blobs(dir: &Path, blobs: &[(&str, u64)]) {
        fs::create_dir_all(dir).unwrap();
        for (digest, size) in blobs {
            fs::write(dir.join(digest), vec![0u8; *size as usize]).unwrap();
        }
    }

    #[test]
    fn builds_table_from_workspace_directories() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());
        let tags = vec!["t1".to_string(), "t2".to_string()];

        write_blobs(
            &ws.blob_dir(Layout::Chunked, "t1"),
            &[("a", 100), ("b", 200)],
        );
        write_blobs(
            &ws.blob_dir(Layout::Chunked, "t2"),
            &[("a", 100), ("c", 300)],
        );

        let table = build_occurrence_table(&ws, Layout::Chunked, &tags).unwrap();
        let stats = table.stats();
        assert_eq!(stats.raw, 700);
        assert_eq!(stats.saved, 100);
        assert_eq!(stats.mashed(), 600);
    }

    #[test]
    fn missing_snapshot_directory_aborts_the_scan() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());
        let tags = vec!["t1".to_string(), "t2".to_string()];

        write_blobs(&ws.blob_dir(Layout::Plain, "t1"), &[("a", 100)]);
        // t2 never populated

        let err = build_occurrence_table(&ws, Layout::Plain, &tags).unwrap_err();
        assert!(format!("{err:#}").contains("t2"));
    }

    #[derive(serde::Serialize)]
    struct TestManifest {
        metadatas: Vec<ByteBuf>,
    }

    fn reference_record(digest: &[u8]) -> ByteBuf {
        let mut raw = vec![0u8; 9];
        raw.extend_from_slice(digest);
        ByteBuf::from(raw)
    }

    #[test]
    fn sums_referenced_metadata_blob_sizes() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());

        // Two metadata blobs referenced by the manifest, one payload blob
        // that must not be counted.
        let blob_dir = ws.blob_dir(Layout::Chunked, "t1");
        write_blobs(&blob_dir, &[("abab", 7), ("cdcd", 5), ("9999", 1000)]);

        let mut manifest_blob = Vec::new();
        ciborium::into_writer(
            &TestManifest {
                metadatas: vec![
                    reference_record(&[0xab, 0xab]),
                    reference_record(&[0xcd, 0xcd]),
                ],
            },
            &mut manifest_blob,
        )
        .unwrap();
        fs::write(blob_dir.join("c0ffee"), &manifest_blob).unwrap();

        let index = format!(
            r#"{{"schemaVersion":2,"manifests":[{{"digest":"sha256:c0ffee","size":{},"annotations":{{"{NAME_ANNOTATION}":"{MANIFEST_TAG}"}}}}]}}"#,
            manifest_blob.len()
        );
        fs::write(ws.index_path("t1"), index).unwrap();

        assert_eq!(metadata_size(&ws, "t1").unwrap(), 12);
    }

    #[test]
    fn missing_referenced_blob_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(root.path());

        let blob_dir = ws.blob_dir(Layout::Chunked, "t1");
        fs::create_dir_all(&blob_dir).unwrap();

        let mut manifest_blob = Vec::new();
        ciborium::into_writer(
            &TestManifest {
                metadatas: vec![reference_record(&[0xab, 0xab])],
            },
            &mut manifest_blob,
        )
        .unwrap();
        fs::write(blob_dir.join("c0ffee"), &manifest_blob).unwrap();

        let index = format!(
            r#"{{"schemaVersion":2,"manifests":[{{"digest":"sha256:c0ffee","size":1,"annotations":{{"{NAME_ANNOTATION}":"{MANIFEST_TAG}"}}}}]}}"#
        );
        fs::write(ws.index_path("t1"), index).unwrap();

        let err = metadata_size(&ws, "t1").unwrap_err();
        assert!(err.to_string().contains("abab"));
    }
}
