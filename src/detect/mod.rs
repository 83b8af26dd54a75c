mod backend;
mod backends;
mod engine;
pub mod preprocess;
mod result;
pub mod yolo;

pub use backend::{ColorOrder, DetectorBackend};
pub use backends::{ScriptStep, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use engine::{DetectionEngine, EngineFailure, EngineOutput};
pub use preprocess::PreprocessParams;
pub use result::{BoundingBox, Detection, RawDetection};
