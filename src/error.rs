//! Fault kinds raised while surveying a video.
//!
//! Extraction and configuration faults always end a run. Detection failures are
//! recorded against the frame and the run continues. Storage faults are fatal for
//! sampled frame artifacts and recoverable for annotated copies; the pipeline
//! decides which applies.

use std::fmt;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultKind {
    ExtractionFault,
    ConfigurationFault,
    DetectionFailure,
    StorageFault,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::ExtractionFault => "ExtractionFault",
            FaultKind::ConfigurationFault => "ConfigurationFault",
            FaultKind::DetectionFailure => "DetectionFailure",
            FaultKind::StorageFault => "StorageFault",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineFault {
    #[error("extraction fault{}: {detail}", frame_suffix(.frame_index))]
    Extraction {
        frame_index: Option<usize>,
        detail: String,
    },
    #[error("configuration fault: {detail}")]
    Configuration { detail: String },
    #[error("detection failure on frame {frame_index}: {detail}")]
    Detection { frame_index: usize, detail: String },
    #[error("storage fault{}: {detail}", frame_suffix(.frame_index))]
    Storage {
        frame_index: Option<usize>,
        detail: String,
    },
}

impl PipelineFault {
    pub fn extraction(detail: impl fmt::Display) -> Self {
        PipelineFault::Extraction {
            frame_index: None,
            detail: detail.to_string(),
        }
    }

    pub fn configuration(detail: impl fmt::Display) -> Self {
        PipelineFault::Configuration {
            detail: detail.to_string(),
        }
    }

    pub fn detection(frame_index: usize, detail: impl fmt::Display) -> Self {
        PipelineFault::Detection {
            frame_index,
            detail: detail.to_string(),
        }
    }

    pub fn storage(frame_index: Option<usize>, detail: impl fmt::Display) -> Self {
        PipelineFault::Storage {
            frame_index,
            detail: detail.to_string(),
        }
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            PipelineFault::Extraction { .. } => FaultKind::ExtractionFault,
            PipelineFault::Configuration { .. } => FaultKind::ConfigurationFault,
            PipelineFault::Detection { .. } => FaultKind::DetectionFailure,
            PipelineFault::Storage { .. } => FaultKind::StorageFault,
        }
    }

    /// Index of the sampled frame the fault is attributed to, if any.
    pub fn frame_index(&self) -> Option<usize> {
        match self {
            PipelineFault::Extraction { frame_index, .. }
            | PipelineFault::Storage { frame_index, .. } => *frame_index,
            PipelineFault::Detection { frame_index, .. } => Some(*frame_index),
            PipelineFault::Configuration { .. } => None,
        }
    }
}

fn frame_suffix(frame_index: &Option<usize>) -> String {
    match frame_index {
        Some(index) => format!(" on frame {}", index),
        None => String::new(),
    }
}

/// Render an error chain on one line (`outer: inner: root`).
pub(crate) fn chain(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_report_kind_and_frame() {
        let fault = PipelineFault::detection(4, "model exploded");
        assert_eq!(fault.kind(), FaultKind::DetectionFailure);
        assert_eq!(fault.frame_index(), Some(4));
        assert_eq!(
            fault.to_string(),
            "detection failure on frame 4: model exploded"
        );

        let fault = PipelineFault::storage(None, "read-only filesystem");
        assert_eq!(fault.kind(), FaultKind::StorageFault);
        assert_eq!(fault.frame_index(), None);
        assert_eq!(fault.to_string(), "storage fault: read-only filesystem");

        let fault = PipelineFault::Storage {
            frame_index: Some(2),
            detail: "disk full".to_string(),
        };
        assert_eq!(fault.to_string(), "storage fault on frame 2: disk full");
    }

    #[test]
    fn kind_names_match_fault_vocabulary() {
        assert_eq!(FaultKind::ExtractionFault.to_string(), "ExtractionFault");
        assert_eq!(
            PipelineFault::configuration("interval must be > 0")
                .kind()
                .to_string(),
            "ConfigurationFault"
        );
    }
}
