use anyhow::{Context, Result};
use serde::Deserialize;
use serde_bytes::ByteBuf;

/// Embedding metadata in front of the digest in a reference record: an
/// 8-byte offset plus a 1-byte kind tag, both irrelevant to the analysis.
const REF_PREFIX_LEN: usize = 9;

// Parse-only view of the filesystem-image manifest. The metadata reference
// list is the only field the analysis needs; the rest of the document is
// ignored.
#[derive(Deserialize)]
struct FsManifest {
    metadatas: Vec<ByteBuf>,
}

/// Decode a filesystem-image manifest blob and return the digests of the
/// metadata blobs it references, in manifest order, as lowercase hex.
pub fn metadata_references(manifest: &[u8]) -> Result<Vec<String>> {
    let doc: FsManifest = ciborium::from_reader(manifest)
        .context("Failed to decode filesystem-image manifest")?;
    doc.metadatas.iter().map(|r| reference_digest(r)).collect()
}

/// Strip the embedding prefix from one reference record and hex-encode the
/// trailing digest bytes. The record layout (offset + kind + digest) is an
/// external format contract; keep all knowledge of it in this function.
fn reference_digest(record: &[u8]) -> Result<String> {
    if record.len() < REF_PREFIX_LEN {
        anyhow::bail!(
            "Reference record too short: {} bytes, need at least {REF_PREFIX_LEN}",
            record.len()
        );
    }
    Ok(hex::encode(&record[REF_PREFIX_LEN..]))
}
