use std::fs;
use std::process::Command;

use anyhow::{Context, Result};

use crate::layout::{Layout, MANIFEST_TAG, Workspace};

use super::{ChunkBounds, Stages};

/// Drives the real external tools: `skopeo` to fetch, `umoci` to unpack,
/// and a CDC image builder to rebuild. Every stage is a synchronous
/// subprocess that runs to completion before the next begins.
pub struct ToolStages {
    image: String,
    workspace: Workspace,
    builder: String,
}

impl ToolStages {
    pub fn new(image: String, workspace: Workspace, builder: String) -> Self {
        Self {
            image,
            workspace,
            builder,
        }
    }

    fn run_tool(mut cmd: Command, what: &str) -> Result<()> {
        let output = cmd
            .output()
            .with_context(|| format!("Failed to run {what}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{what} failed: {}", stderr.trim());
        }
        Ok(())
    }
}

impl Stages for ToolStages {
    fn fetch(&self, tag: &str) -> Result<()> {
        let dest = self.workspace.image_dir(Layout::Plain, tag);
        let mut cmd = Command::new("skopeo");
        cmd.arg("copy")
            .arg(format!("docker://{}:{tag}", self.image))
            .arg(format!("oci:{}:{tag}", dest.display()));
        Self::run_tool(cmd, &format!("'skopeo copy' for {tag}"))
    }

    fn unpack(&self, tag: &str) -> Result<()> {
        let image = self.workspace.image_dir(Layout::Plain, tag);
        let mut cmd = Command::new("umoci");
        cmd.arg("unpack")
            .arg("--rootless")
            .arg("--image")
            .arg(format!("{}:{tag}", image.display()))
            .arg(self.workspace.unpacked_dir(tag));
        Self::run_tool(cmd, &format!("'umoci unpack' for {tag}"))
    }

    fn rebuild(&self, tag: &str, bounds: Option<&ChunkBounds>) -> Result<()> {
        // umoci puts the tree under <bundle>/rootfs
        let rootfs = self.workspace.unpacked_dir(tag).join("rootfs");
        let mut cmd = Command::new(&self.builder);
        cmd.arg("build")
            .arg(rootfs)
            .arg(self.workspace.image_dir(Layout::Chunked, tag))
            .arg(MANIFEST_TAG);
        if let Some(b) = bounds {
            cmd.args(["--min", &b.min.to_string()])
                .args(["--avg", &b.avg.to_string()])
                .args(["--max", &b.max.to_string()]);
        }
        Self::run_tool(cmd, &format!("'{} build' for {tag}", self.builder))
    }

    fn cleanup(&self, tag: &str) -> Result<()> {
        let dir = self.workspace.unpacked_dir(tag);
        fs::remove_dir_all(&dir).with_context(|| format!("Failed to remove {}", dir.display()))
    }
}
