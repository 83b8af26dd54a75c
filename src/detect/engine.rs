use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::backend::{ColorOrder, DetectorBackend};
use super::preprocess::{self, PreprocessParams};
use super::result::Detection;
use crate::error::{chain, PipelineFault};
use crate::frame::Frame;

/// Detections for one frame plus the wall-clock time spent in the backend.
#[derive(Clone, Debug)]
pub struct EngineOutput {
    pub detections: Vec<Detection>,
    pub inference_time: Duration,
}

/// A failed inference call. `elapsed` is the time measured before the fault.
#[derive(Debug)]
pub struct EngineFailure {
    pub fault: PipelineFault,
    pub elapsed: Duration,
}

/// Owns a loaded backend and wraps every call in preprocessing and timing.
///
/// A backend fault (error or panic) is reported for the frame and leaves the
/// engine usable for the next one.
pub struct DetectionEngine {
    backend: Box<dyn DetectorBackend>,
    params: PreprocessParams,
}

impl DetectionEngine {
    pub fn new<B: DetectorBackend + 'static>(backend: B, params: PreprocessParams) -> Result<Self> {
        Self::from_boxed(Box::new(backend), params)
    }

    pub fn from_boxed(
        mut backend: Box<dyn DetectorBackend>,
        params: PreprocessParams,
    ) -> Result<Self> {
        backend
            .warm_up()
            .with_context(|| format!("warm up detection backend '{}'", backend.name()))?;
        log::info!(
            "detection backend '{}' ready (gain={}, offset={}, input={:?})",
            backend.name(),
            params.gain,
            params.offset,
            backend.input_color()
        );
        Ok(Self { backend, params })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Channel order of rasters returned by `preprocess`.
    pub fn working_color(&self) -> ColorOrder {
        self.backend.input_color()
    }

    pub fn params(&self) -> PreprocessParams {
        self.params
    }

    /// The exact raster the backend sees for `image`.
    pub fn preprocess(&self, image: &RgbImage) -> RgbImage {
        preprocess::preprocess(image, self.params, self.backend.input_color())
    }

    /// Preprocess `image` and run inference on it.
    pub fn detect(
        &mut self,
        frame: &Frame,
        image: &RgbImage,
    ) -> Result<EngineOutput, EngineFailure> {
        let working = self.preprocess(image);
        self.infer(frame, &working)
    }

    /// Run inference on an already preprocessed raster.
    pub fn infer(
        &mut self,
        frame: &Frame,
        working: &RgbImage,
    ) -> Result<EngineOutput, EngineFailure> {
        let backend = &mut self.backend;
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| backend.detect(working)))
            .unwrap_or_else(|_| Err(anyhow!("backend '{}' panicked", backend.name())));
        let inference_time = start.elapsed();

        let raw = outcome.map_err(|err| EngineFailure {
            fault: PipelineFault::detection(frame.index, chain(&err)),
            elapsed: inference_time,
        })?;

        let (width, height) = working.dimensions();
        let candidates = raw.len();
        let detections: Vec<Detection> = raw
            .into_iter()
            .filter_map(|det| {
                let bbox = det.bbox.clamp_to(width, height)?;
                let confidence = if det.confidence.is_nan() {
                    0.0
                } else {
                    det.confidence.clamp(0.0, 1.0)
                };
                Some(Detection::new(bbox, confidence, det.label))
            })
            .collect();
        if detections.len() != candidates {
            log::debug!(
                "{}: dropped {} degenerate boxes",
                frame.name(),
                candidates - detections.len()
            );
        }

        Ok(EngineOutput {
            detections,
            inference_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, RawDetection, ScriptStep, ScriptedBackend};
    use crate::error::FaultKind;
    use image::Rgb;

    fn frame(index: usize) -> Frame {
        Frame::new(index, index as u64 * 30, 100, 50, format!("frame_{index:04}.jpg"))
    }

    fn raster() -> RgbImage {
        RgbImage::from_pixel(100, 50, Rgb([40, 40, 40]))
    }

    #[test]
    fn engine_clamps_and_drops_boxes() {
        let backend = ScriptedBackend::new().with_step(ScriptStep::Detections(vec![
            RawDetection::new(BoundingBox::new(-5.0, 10.0, 120.0, 60.0), 0.9, "scissors"),
            RawDetection::new(BoundingBox::new(200.0, 10.0, 220.0, 20.0), 0.8, "knife"),
            RawDetection::new(BoundingBox::new(10.0, 10.0, 20.0, 20.0), 1.7, "spoon"),
        ]));
        let mut engine = DetectionEngine::new(backend, PreprocessParams::default()).unwrap();

        let out = engine.detect(&frame(0), &raster()).unwrap();
        assert_eq!(out.detections.len(), 2);
        assert_eq!(
            out.detections[0].bbox(),
            BoundingBox::new(0.0, 10.0, 100.0, 50.0)
        );
        assert_eq!(out.detections[0].display_label(), "scissors");
        assert_eq!(out.detections[1].confidence(), 1.0);
    }

    #[test]
    fn engine_survives_backend_failure() {
        let backend = ScriptedBackend::new()
            .with_step(ScriptStep::Fail("cuda out of memory".to_string()))
            .with_step(ScriptStep::Detections(vec![RawDetection::new(
                BoundingBox::new(1.0, 1.0, 10.0, 10.0),
                0.5,
                "scissors",
            )]));
        let mut engine = DetectionEngine::new(backend, PreprocessParams::default()).unwrap();

        let failure = engine.detect(&frame(0), &raster()).unwrap_err();
        assert_eq!(failure.fault.kind(), FaultKind::DetectionFailure);
        assert_eq!(failure.fault.frame_index(), Some(0));

        let out = engine.detect(&frame(1), &raster()).unwrap();
        assert_eq!(out.detections.len(), 1);
    }

    #[test]
    fn engine_converts_backend_panic_to_failure() {
        let backend = ScriptedBackend::new().with_step(ScriptStep::Panic);
        let mut engine = DetectionEngine::new(backend, PreprocessParams::default()).unwrap();
        let failure = engine.detect(&frame(2), &raster()).unwrap_err();
        assert_eq!(failure.fault.frame_index(), Some(2));
        assert!(engine.detect(&frame(3), &raster()).is_ok());
    }

    #[test]
    fn engine_reports_working_color() {
        let backend = ScriptedBackend::new().with_input_color(ColorOrder::Bgr);
        let engine = DetectionEngine::new(backend, PreprocessParams::default()).unwrap();
        assert_eq!(engine.working_color(), ColorOrder::Bgr);
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 0, 100]));
        assert_eq!(engine.preprocess(&image).get_pixel(0, 0), &Rgb([150, 20, 20]));
    }
}
