//! Decoded video streams.
//!
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` streams (testing, dry runs)
//! - In-memory frame lists
//!
//! Streams are consumed once. Reading a stream a second time requires
//! reconnecting it, which restarts decoding from the first frame.

use std::collections::VecDeque;

use anyhow::Result;
use image::RgbImage;

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::{FileConfig, FileSource};

/// A decodable video stream.
pub trait VideoStream {
    /// Open (or reopen) the stream. Called once before the first frame is read.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Decode the next frame. `Ok(None)` marks the end of the stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Human-readable identity for logs.
    fn describe(&self) -> String;
}

/// Stream over frames already held in memory.
pub struct VecStream {
    frames: VecDeque<RgbImage>,
}

impl VecStream {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl VideoStream for VecStream {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }

    fn describe(&self) -> String {
        format!("memory ({} frames)", self.frames.len())
    }
}
