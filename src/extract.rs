//! Fixed-interval frame sampling.

use crate::error::{chain, PipelineFault};
use crate::frame::{Frame, FrameNaming};
use crate::ingest::VideoStream;
use crate::storage::ArtifactStore;

pub const DEFAULT_SAMPLING_INTERVAL: u32 = 30;

/// Walks a decoded stream and keeps every `interval`-th frame.
pub struct FrameExtractor {
    naming: FrameNaming,
}

impl FrameExtractor {
    pub fn new(naming: FrameNaming) -> Self {
        Self { naming }
    }

    pub fn naming(&self) -> &FrameNaming {
        &self.naming
    }

    /// Sample `stream` and persist each kept frame to `store`.
    ///
    /// Source frame `n` is kept iff `n % interval == 0`, so a stream of `F`
    /// frames yields `ceil(F / interval)` frames with dense indices. The stream
    /// is connected first and consumed to its end.
    pub fn extract(
        &self,
        stream: &mut dyn VideoStream,
        interval: u32,
        store: &mut dyn ArtifactStore,
    ) -> Result<Vec<Frame>, PipelineFault> {
        if interval == 0 {
            return Err(PipelineFault::configuration(
                "sampling interval must be a positive integer",
            ));
        }
        let interval = u64::from(interval);

        stream.connect().map_err(|err| {
            PipelineFault::extraction(format!("cannot open {}: {}", stream.describe(), chain(&err)))
        })?;
        store
            .ensure_namespace()
            .map_err(|err| PipelineFault::storage(None, chain(&err)))?;

        let mut frames = Vec::new();
        let mut source_frame_number: u64 = 0;
        loop {
            let decoded = stream.next_frame().map_err(|err| PipelineFault::Extraction {
                frame_index: Some(frames.len()),
                detail: format!(
                    "decode failed at source frame {}: {}",
                    source_frame_number,
                    chain(&err)
                ),
            })?;
            let Some(image) = decoded else {
                break;
            };

            if source_frame_number % interval == 0 {
                let index = frames.len();
                let name = self.naming.frame_name(index);
                store
                    .write_image(&name, &image)
                    .map_err(|err| PipelineFault::storage(Some(index), chain(&err)))?;
                log::debug!("sampled source frame {} as {}", source_frame_number, name);
                frames.push(Frame::new(
                    index,
                    source_frame_number,
                    image.width(),
                    image.height(),
                    name,
                ));
            }
            source_frame_number += 1;
        }

        log::info!(
            "extracted {} frames from {} decoded (1 every {} frames)",
            frames.len(),
            source_frame_number,
            interval
        );
        Ok(frames)
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(FrameNaming::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use crate::ingest::VecStream;
    use crate::storage::InMemoryArtifactStore;
    use anyhow::{anyhow, Result};
    use image::{Rgb, RgbImage};

    fn clip(frames: usize) -> VecStream {
        VecStream::new(
            (0..frames)
                .map(|n| RgbImage::from_pixel(4, 3, Rgb([n as u8, 0, 0])))
                .collect(),
        )
    }

    #[test]
    fn samples_ceil_of_frames_over_interval() {
        let extractor = FrameExtractor::default();
        let cases = [(90, 30, 3), (91, 30, 4), (1, 30, 1), (10, 1, 10), (29, 30, 1)];
        for (total, interval, expected) in cases {
            let mut store = InMemoryArtifactStore::new();
            let frames = extractor
                .extract(&mut clip(total), interval, &mut store)
                .unwrap();
            assert_eq!(frames.len(), expected, "{total} frames / {interval}");
            let indices: Vec<_> = frames.iter().map(|f| f.index).collect();
            assert_eq!(indices, (0..expected).collect::<Vec<_>>());
            assert_eq!(store.len(), expected);
        }
    }

    #[test]
    fn source_frame_numbers_follow_interval() {
        let mut store = InMemoryArtifactStore::new();
        let frames = FrameExtractor::default()
            .extract(&mut clip(95), 30, &mut store)
            .unwrap();
        let sources: Vec<_> = frames.iter().map(|f| f.source_frame_number).collect();
        assert_eq!(sources, vec![0, 30, 60, 90]);
        assert_eq!(frames[3].name(), "frame_0003.jpg");
        let stored = store.read_image("frame_0001.jpg").unwrap();
        assert_eq!(stored.get_pixel(0, 0), &Rgb([30, 0, 0]));
        assert_eq!((frames[0].width, frames[0].height), (4, 3));
    }

    #[test]
    fn empty_stream_is_not_an_error() {
        let mut store = InMemoryArtifactStore::new();
        let frames = FrameExtractor::default()
            .extract(&mut clip(0), 30, &mut store)
            .unwrap();
        assert!(frames.is_empty());
        assert!(store.namespace_ready());
    }

    #[test]
    fn zero_interval_is_rejected_before_reading() {
        let mut stream = clip(5);
        let mut store = InMemoryArtifactStore::new();
        let err = FrameExtractor::default()
            .extract(&mut stream, 0, &mut store)
            .unwrap_err();
        assert_eq!(err.kind(), FaultKind::ConfigurationFault);
        assert_eq!(stream.remaining(), 5);
        assert!(store.is_empty());
    }

    #[test]
    fn frame_write_failure_is_a_storage_fault() {
        let mut store = InMemoryArtifactStore::new().reject_writes_with_prefix("frame_");
        let err = FrameExtractor::default()
            .extract(&mut clip(3), 1, &mut store)
            .unwrap_err();
        assert_eq!(err.kind(), FaultKind::StorageFault);
        assert_eq!(err.frame_index(), Some(0));
    }

    struct BrokenStream {
        good: usize,
    }

    impl VideoStream for BrokenStream {
        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            if self.good == 0 {
                return Err(anyhow!("corrupt packet"));
            }
            self.good -= 1;
            Ok(Some(RgbImage::new(2, 2)))
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    #[test]
    fn decode_error_is_an_extraction_fault() {
        let mut store = InMemoryArtifactStore::new();
        let err = FrameExtractor::default()
            .extract(&mut BrokenStream { good: 2 }, 1, &mut store)
            .unwrap_err();
        assert_eq!(err.kind(), FaultKind::ExtractionFault);
        assert_eq!(err.frame_index(), Some(2));
    }
}
