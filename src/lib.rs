//! Frame Survey
//!
//! Batch survey of recorded video for one domain object class.
//!
//! # Flow
//!
//! 1. **Sample**: every `sampling_interval`-th decoded frame is persisted as
//!    `frame_XXXX.jpg` with a dense, gap-free index.
//! 2. **Detect**: each sampled frame is contrast-enhanced and scored by a
//!    detector backend loaded once for the whole run.
//! 3. **Filter and relabel**: detections outside the allow-list or under the
//!    confidence floor are dropped; survivors get their display label.
//! 4. **Annotate**: a boxed, captioned copy is stored as `annotated_<name>`.
//! 5. **Report**: counts, rates, timings and example detections.
//!
//! Per-frame detection failures and annotated-artifact write failures are
//! recorded as warnings. Everything else ends the run.
//!
//! # Module Structure
//!
//! - `ingest`: Video streams (local files, synthetic `stub://` clips, memory)
//! - `extract`: Fixed-interval sampling into artifact storage
//! - `detect`: Preprocessing, backends (scripted, tract ONNX) and the engine
//! - `policy`: Allow-list, confidence floor and remap table
//! - `annotate`: Box and caption rendering
//! - `report`: Per-frame results and the run summary
//! - `pipeline`: The run state machine

pub mod annotate;
pub mod config;
pub mod detect;
pub mod error;
pub mod extract;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod storage;

pub use annotate::{AnnotationStyle, Annotator};
pub use config::{DetectorSettings, SurveyConfig};
pub use detect::{
    BoundingBox, ColorOrder, Detection, DetectionEngine, DetectorBackend, PreprocessParams,
    RawDetection, ScriptStep, ScriptedBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use error::{FaultKind, PipelineFault};
pub use extract::FrameExtractor;
pub use frame::{Frame, FrameNaming};
pub use ingest::{FileConfig, FileSource, VecStream, VideoStream};
pub use pipeline::{Pipeline, PipelineState, RunError, RunOutcome, RunWarning};
pub use policy::LabelPolicy;
pub use report::{ExampleDetection, FrameResult, Report, ReportAggregator};
pub use storage::{ArtifactStore, FilesystemArtifactStore, InMemoryArtifactStore};
