pub mod tools;

use anyhow::Result;

/// FastCDC chunk-size bounds passed through to the rebuild tool.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBounds {
    pub min: u32,
    pub avg: u32,
    pub max: u32,
}

impl ChunkBounds {
    /// The chunker rejects bounds unless `min < avg < max` and the spread
    /// `max - min` exceeds `avg`; check before any stage runs.
    pub fn new(min: u32, avg: u32, max: u32) -> Result<Self> {
        if !(min < avg && avg < max && max - min > avg) {
            anyhow::bail!(
                "Invalid chunking bounds {min}/{avg}/{max}: need min < avg < max and max - min > avg"
            );
        }
        Ok(Self { min, avg, max })
    }
}

/// External collaborators the orchestrator drives, one capability per
/// rebuild stage. The statistics core never calls these; tests swap in a
/// recording implementation.
pub trait Stages {
    /// Download one tag of the image into the plain layout.
    fn fetch(&self, tag: &str) -> Result<()>;

    /// Unpack the fetched image into a scratch rootfs.
    fn unpack(&self, tag: &str) -> Result<()>;

    /// Rebuild the scratch rootfs into the chunked layout.
    fn rebuild(&self, tag: &str, bounds: Option<&ChunkBounds>) -> Result<()>;

    /// Remove the scratch rootfs.
    fn cleanup(&self, tag: &str) -> Result<()>;
}
