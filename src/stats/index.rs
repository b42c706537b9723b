use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::layout::NAME_ANNOTATION;

const DIGEST_PREFIX: &str = "sha256:";

// ---- Parse-only view of an image index: just enough to resolve names ----

#[derive(Deserialize)]
struct ImageIndex {
    manifests: Vec<IndexDescriptor>,
}

#[derive(Deserialize)]
struct IndexDescriptor {
    digest: String,
    #[serde(default)]
    annotations: HashMap<String, String>,
}

/// Resolve a logical name to the hex digest of its manifest blob.
///
/// Returns the digest of the first listed manifest whose
/// `org.opencontainers.image.ref.name` annotation equals `name`, with the
/// `sha256:` prefix stripped. A digest under any other algorithm is
/// rejected rather than misread as a blob name.
pub fn resolve_manifest_digest(index_json: &str, name: &str) -> Result<String> {
    let index: ImageIndex =
        serde_json::from_str(index_json).context("Failed to parse image index")?;

    let desc = index
        .manifests
        .iter()
        .find(|m| m.annotations.get(NAME_ANNOTATION).is_some_and(|n| n == name))
        .with_context(|| format!("No manifest named {name} in index"))?;

    desc.digest
        .strip_prefix(DIGEST_PREFIX)
        .map(str::to_string)
        .with_context(|| format!("Unsupported digest algorithm in {}", desc.digest))
}
