//! Local file video source.
//!
//! `FileSource` reads frames from a local video file (no network access) or,
//! for `stub://` paths, from a deterministic synthetic clip. Opening is deferred
//! to `connect` so that open failures surface while extracting.
//!
//! Synthetic paths accept query parameters:
//! `stub://clip?frames=90&size=320x240`.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::VideoStream;

const STUB_SCHEME: &str = "stub://";
const DEFAULT_SYNTHETIC_FRAMES: u64 = 90;
const DEFAULT_SYNTHETIC_WIDTH: u32 = 320;
const DEFAULT_SYNTHETIC_HEIGHT: u32 = 240;

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path (e.g., "recordings/procedure.mp4") or a `stub://` clip.
    pub path: String,
}

/// Local file frame source.
pub struct FileSource {
    config: FileConfig,
    backend: Option<FileBackend>,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Self {
        Self {
            config,
            backend: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    /// Number of frames decoded since the last connect.
    pub fn frames_decoded(&self) -> u64 {
        match &self.backend {
            None => 0,
            Some(FileBackend::Synthetic(source)) => source.emitted,
            #[cfg(feature = "ingest-file-ffmpeg")]
            Some(FileBackend::Ffmpeg(source)) => source.frames_decoded(),
        }
    }
}

impl VideoStream for FileSource {
    fn connect(&mut self) -> Result<()> {
        if !is_local_file_path(&self.config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): '{}'",
                self.config.path
            ));
        }
        let backend = if self.config.path.starts_with(STUB_SCHEME) {
            FileBackend::Synthetic(SyntheticFileSource::parse(&self.config.path)?)
        } else {
            open_file_backend(&self.config)?
        };
        log::info!("FileSource: connected to {}", self.config.path);
        self.backend = Some(backend);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match &mut self.backend {
            None => Err(anyhow!("file source '{}' is not connected", self.config.path)),
            Some(FileBackend::Synthetic(source)) => Ok(source.next_frame()),
            #[cfg(feature = "ingest-file-ffmpeg")]
            Some(FileBackend::Ffmpeg(source)) => source.next_frame(),
        }
    }

    fn describe(&self) -> String {
        self.config.path.clone()
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_file_backend(config: &FileConfig) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSource::open(&config.path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_file_backend(config: &FileConfig) -> Result<FileBackend> {
    Err(anyhow!(
        "decoding '{}' requires the ingest-file-ffmpeg feature",
        config.path
    ))
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    total: u64,
    width: u32,
    height: u32,
    emitted: u64,
}

impl SyntheticFileSource {
    fn parse(path: &str) -> Result<Self> {
        let mut source = Self {
            total: DEFAULT_SYNTHETIC_FRAMES,
            width: DEFAULT_SYNTHETIC_WIDTH,
            height: DEFAULT_SYNTHETIC_HEIGHT,
            emitted: 0,
        };
        let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed synthetic parameter '{}'", pair))?;
            match key {
                "frames" => {
                    source.total = value
                        .parse()
                        .with_context(|| format!("invalid synthetic frame count '{}'", value))?;
                }
                "size" => {
                    let (w, h) = value
                        .split_once('x')
                        .ok_or_else(|| anyhow!("synthetic size must be WxH, got '{}'", value))?;
                    source.width = w.parse().context("invalid synthetic width")?;
                    source.height = h.parse().context("invalid synthetic height")?;
                    if source.width == 0 || source.height == 0 {
                        return Err(anyhow!("synthetic size must be non-zero"));
                    }
                }
                other => return Err(anyhow!("unknown synthetic parameter '{}'", other)),
            }
        }
        Ok(source)
    }

    fn next_frame(&mut self) -> Option<RgbImage> {
        if self.emitted >= self.total {
            return None;
        }
        let n = self.emitted;
        self.emitted += 1;
        Some(RgbImage::from_fn(self.width, self.height, |x, y| {
            let base = x as u64 + y as u64 + n * 3;
            Rgb([(base % 256) as u8, ((base / 2) % 256) as u8, ((n * 7) % 256) as u8])
        }))
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}
