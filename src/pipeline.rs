//! Run orchestration: extract, detect, filter, annotate, report.
//!
//! ```text
//! Idle -> Extracting -> ProcessingFrames -> Reporting -> Done
//!   \          \               \
//!    +----------+---------------+--> Failed
//! ```
//!
//! Frames are processed one at a time in index order. Detection failures and
//! annotated-artifact write failures are recorded on the frame and the run
//! continues; everything else ends the run in `Failed`.

use std::fmt;

use image::RgbImage;
use thiserror::Error;

use crate::annotate::Annotator;
use crate::config::SurveyConfig;
use crate::detect::{DetectionEngine, EngineFailure};
use crate::error::{chain, PipelineFault};
use crate::extract::FrameExtractor;
use crate::frame::Frame;
use crate::ingest::VideoStream;
use crate::policy::LabelPolicy;
use crate::report::{FrameResult, Report, ReportAggregator};
use crate::storage::ArtifactStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Extracting,
    ProcessingFrames,
    Reporting,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Extracting => "extracting",
            PipelineState::ProcessingFrames => "processing frames",
            PipelineState::Reporting => "reporting",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A fatal fault together with the state the run was in when it occurred.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("run failed while {state}: {fault}")]
pub struct RunError {
    pub state: PipelineState,
    #[source]
    pub fault: PipelineFault,
}

/// A recoverable fault attached to one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunWarning {
    pub frame_index: usize,
    pub fault: PipelineFault,
}

#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub report: Report,
    /// One result per sampled frame, in index order.
    pub frame_results: Vec<FrameResult>,
    pub warnings: Vec<RunWarning>,
}

/// Drives one video through the full survey.
///
/// The engine is loaded by the caller and reused for every frame and every run.
pub struct Pipeline<S: ArtifactStore> {
    config: SurveyConfig,
    engine: DetectionEngine,
    store: S,
    extractor: FrameExtractor,
    annotator: Annotator,
    state: PipelineState,
}

impl<S: ArtifactStore> Pipeline<S> {
    pub fn new(config: SurveyConfig, engine: DetectionEngine, store: S) -> Self {
        let extractor = FrameExtractor::new(config.naming.clone());
        let annotator = Annotator::new(config.naming.clone());
        Self {
            config,
            engine,
            store,
            extractor,
            annotator,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn run(&mut self, stream: &mut dyn VideoStream) -> Result<RunOutcome, RunError> {
        self.run_with(stream, |_, _| {})
    }

    /// Like `run`, calling `on_frame(result, total)` after each frame completes.
    pub fn run_with<F>(
        &mut self,
        stream: &mut dyn VideoStream,
        mut on_frame: F,
    ) -> Result<RunOutcome, RunError>
    where
        F: FnMut(&FrameResult, usize),
    {
        self.transition(PipelineState::Idle);
        let validated = self.config.validate().and_then(|_| self.config.label_policy());
        let policy = self.guard(validated)?;

        self.transition(PipelineState::Extracting);
        let extracted = self
            .extractor
            .extract(stream, self.config.sampling_interval, &mut self.store);
        let frames = self.guard(extracted)?;

        self.transition(PipelineState::ProcessingFrames);
        let total = frames.len();
        let mut aggregator = ReportAggregator::new(self.config.example_limit);
        let mut frame_results = Vec::with_capacity(total);
        let mut warnings = Vec::new();
        for frame in frames {
            let processed = self.process_frame(frame, &policy);
            let result = self.guard(processed)?;
            warnings.extend(result.warnings.iter().map(|fault| RunWarning {
                frame_index: result.frame.index,
                fault: fault.clone(),
            }));
            aggregator.push(&result);
            on_frame(&result, total);
            frame_results.push(result);
        }

        self.transition(PipelineState::Reporting);
        let report = aggregator.finish();
        log::info!(
            "{} of {} frames with detections ({} warnings)",
            report.frames_with_detection,
            report.total_frames,
            warnings.len()
        );

        self.transition(PipelineState::Done);
        Ok(RunOutcome {
            report,
            frame_results,
            warnings,
        })
    }

    fn process_frame(
        &mut self,
        frame: Frame,
        policy: &LabelPolicy,
    ) -> Result<FrameResult, PipelineFault> {
        log::info!("processing {}", frame.name());
        let image = self.load_frame(&frame)?;
        let working = self.engine.preprocess(&image);
        let mut warnings = Vec::new();

        let (raw, inference_time) = match self.engine.infer(&frame, &working) {
            Ok(output) => (output.detections, output.inference_time),
            Err(EngineFailure { fault, elapsed }) => {
                log::warn!("{}: {}", frame.name(), fault);
                warnings.push(fault);
                (Vec::new(), elapsed)
            }
        };

        let detections = policy.apply(&raw);
        log::info!(
            "{}: {} of {} detections kept ({:.3}s)",
            frame.name(),
            detections.len(),
            raw.len(),
            inference_time.as_secs_f64()
        );

        let order = self.engine.working_color();
        if let Err(err) = self
            .annotator
            .annotate(&mut self.store, &frame, &working, order, &detections)
        {
            let fault = PipelineFault::storage(
                Some(frame.index),
                format!("annotated artifact not written: {}", chain(&err)),
            );
            log::warn!("{}: {}", frame.name(), fault);
            warnings.push(fault);
        }

        Ok(FrameResult {
            frame,
            detections,
            inference_time_seconds: inference_time.as_secs_f64(),
            warnings,
        })
    }

    fn load_frame(&self, frame: &Frame) -> Result<RgbImage, PipelineFault> {
        self.store
            .read_image(frame.storage_handle())
            .map_err(|err| PipelineFault::storage(Some(frame.index), chain(&err)))
    }

    fn guard<T>(&mut self, outcome: Result<T, PipelineFault>) -> Result<T, RunError> {
        outcome.map_err(|fault| {
            let state = self.state;
            log::error!("{} while {}", fault, state);
            self.transition(PipelineState::Failed);
            RunError { state, fault }
        })
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("pipeline: {} -> {}", self.state, next);
        self.state = next;
    }
}
