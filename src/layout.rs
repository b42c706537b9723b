use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Annotation key carrying the logical name of a manifest in an image index.
pub const NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// Logical name the rebuild stage tags its output with. The metadata-size
/// computation resolves this name in each snapshot's chunked index.
pub const MANIFEST_TAG: &str = "squashfs";

/// The two blob layouts being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Original per-layer OCI blob directory, as fetched.
    Plain,
    /// Rebuilt content-defined-chunked blob directory.
    Chunked,
}

impl Layout {
    pub const ALL: [Layout; 2] = [Layout::Plain, Layout::Chunked];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Plain => "plain",
            Layout::Chunked => "chunked",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path conventions inside the working directory.
///
/// Each tag gets one OCI-layout directory per layout, plus a transient
/// unpacked rootfs used between the unpack and rebuild stages.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Image directory for one tag under one layout.
    pub fn image_dir(&self, layout: Layout, tag: &str) -> PathBuf {
        self.root.join(layout.as_str()).join(tag)
    }

    /// Flat content-addressed blob directory for one tag under one layout.
    pub fn blob_dir(&self, layout: Layout, tag: &str) -> PathBuf {
        self.image_dir(layout, tag).join("blobs/sha256")
    }

    /// Image index of one tag's chunked image.
    pub fn index_path(&self, tag: &str) -> PathBuf {
        self.image_dir(Layout::Chunked, tag).join("index.json")
    }

    /// Transient unpacked rootfs, removed by the cleanup stage.
    pub fn unpacked_dir(&self, tag: &str) -> PathBuf {
        self.root.join("unpacked").join(tag)
    }
}
