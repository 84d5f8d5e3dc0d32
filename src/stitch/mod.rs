//! Vertical stitching: public API.
//!
//! Turns an ordered `FrameCollection` into one tall composite image.
//! The layout is pure; the engine adds async decode and publishing.

mod editor;
mod engine;
mod layout;

pub use editor::FrameEditor;
pub use engine::{compose, stitch, FrameDecoder, PngDecoder, RenderOutcome, StitchEngine};
pub use layout::{plan, Layout, Placement};

use crate::frame::FrameId;
use sha2::{Digest, Sha256};

/// The stitched result for one collection state.
///
/// Never patched: every collection change produces a new one.
#[derive(Clone)]
pub struct CompositeImage {
    png: Vec<u8>,
    width: u32,
    height: u32,
    frame_count: usize,
    generation: u64,
    digest: String,
}

impl CompositeImage {
    pub(crate) fn new(
        png: Vec<u8>,
        width: u32,
        height: u32,
        frame_count: usize,
        generation: u64,
    ) -> Self {
        let digest = format!("{:x}", Sha256::digest(&png));
        Self {
            png,
            width,
            height,
            frame_count,
            generation,
            digest,
        }
    }

    /// PNG-encoded composite, ready to write to disk as-is.
    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Render generation this composite came from (0 for one-off stitches).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// SHA-256 of the PNG bytes, lowercase hex.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl std::fmt::Debug for CompositeImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_count", &self.frame_count)
            .field("generation", &self.generation)
            .field("size", &self.png.len())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("Frame {id} could not be decoded: {reason}")]
    Decode { id: FrameId, reason: String },

    #[error(
        "Frame {id} decoded to {}x{} but was recorded as {}x{}",
        actual.0, actual.1, expected.0, expected.1
    )]
    DimensionMismatch {
        id: FrameId,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Composite encoding failed: {0}")]
    Encode(String),

    #[error("Decode task failed: {0}")]
    DecodeTaskFailed(String),
}
