//! Sampled frames and their artifact names.
//!
//! A `Frame` is created once by the extractor and never changes afterwards.
//! Its `index` is the dense ordinal among sampled frames; ordering is carried
//! here as data rather than recovered from artifact names.

use serde::{Deserialize, Serialize};

pub const DEFAULT_FRAME_PREFIX: &str = "frame_";
pub const DEFAULT_ANNOTATED_PREFIX: &str = "annotated_";
pub const DEFAULT_FRAME_EXTENSION: &str = "jpg";
pub const DEFAULT_INDEX_WIDTH: usize = 4;

/// One sampled still from the source video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// 0-based ordinal among sampled frames (dense, gap-free).
    pub index: usize,
    /// Position of this frame in the decoded source stream.
    pub source_frame_number: u64,
    pub width: u32,
    pub height: u32,
    name: String,
}

impl Frame {
    pub(crate) fn new(
        index: usize,
        source_frame_number: u64,
        width: u32,
        height: u32,
        name: String,
    ) -> Self {
        Self {
            index,
            source_frame_number,
            width,
            height,
            name,
        }
    }

    /// Artifact name, e.g. `frame_0007.jpg`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle used to read the raster back from artifact storage.
    pub fn storage_handle(&self) -> &str {
        &self.name
    }
}

/// Naming rules for frame and annotated artifacts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameNaming {
    pub frame_prefix: String,
    pub annotated_prefix: String,
    pub extension: String,
    pub index_width: usize,
}

impl Default for FrameNaming {
    fn default() -> Self {
        Self {
            frame_prefix: DEFAULT_FRAME_PREFIX.to_string(),
            annotated_prefix: DEFAULT_ANNOTATED_PREFIX.to_string(),
            extension: DEFAULT_FRAME_EXTENSION.to_string(),
            index_width: DEFAULT_INDEX_WIDTH,
        }
    }
}

impl FrameNaming {
    pub fn frame_name(&self, index: usize) -> String {
        format!(
            "{}{:0width$}.{}",
            self.frame_prefix,
            index,
            self.extension,
            width = self.index_width
        )
    }

    /// Annotated copies keep the original name behind a fixed prefix so the two
    /// artifacts can always be correlated.
    pub fn annotated_name(&self, frame: &Frame) -> String {
        format!("{}{}", self.annotated_prefix, frame.name())
    }
}
