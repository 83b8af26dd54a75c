//! Per-frame results and the run-wide summary report.

use std::fmt;

use serde::Serialize;

use crate::detect::Detection;
use crate::error::{FaultKind, PipelineFault};
use crate::frame::Frame;

pub const DEFAULT_EXAMPLE_LIMIT: usize = 3;

/// Outcome of processing one sampled frame.
#[derive(Clone, Debug)]
pub struct FrameResult {
    pub frame: Frame,
    /// Detections after the label policy, in detector order.
    pub detections: Vec<Detection>,
    pub inference_time_seconds: f64,
    /// Recoverable faults recorded while processing this frame.
    pub warnings: Vec<PipelineFault>,
}

impl FrameResult {
    pub fn has_detection(&self) -> bool {
        !self.detections.is_empty()
    }

    pub fn detection_failed(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| w.kind() == FaultKind::DetectionFailure)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExampleDetection {
    pub frame_index: usize,
    pub frame_name: String,
    pub detection: Detection,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub total_frames: usize,
    pub frames_with_detection: usize,
    pub total_detections: usize,
    pub total_time_seconds: f64,
    pub average_time_seconds: f64,
    pub detection_rate_percent: f64,
    /// Frames with at least one recoverable fault.
    pub warning_count: usize,
    pub detection_failures: usize,
    pub examples: Vec<ExampleDetection>,
}

/// Accumulates frame results into a `Report`.
///
/// Counts and sums do not depend on push order; `examples` follow push order,
/// which the pipeline keeps equal to frame order.
#[derive(Clone, Debug)]
pub struct ReportAggregator {
    example_limit: usize,
    total_frames: usize,
    frames_with_detection: usize,
    total_detections: usize,
    total_time_seconds: f64,
    warning_count: usize,
    detection_failures: usize,
    examples: Vec<ExampleDetection>,
}

impl ReportAggregator {
    pub fn new(example_limit: usize) -> Self {
        Self {
            example_limit,
            total_frames: 0,
            frames_with_detection: 0,
            total_detections: 0,
            total_time_seconds: 0.0,
            warning_count: 0,
            detection_failures: 0,
            examples: Vec::new(),
        }
    }

    pub fn push(&mut self, result: &FrameResult) {
        self.total_frames += 1;
        self.total_detections += result.detections.len();
        self.total_time_seconds += result.inference_time_seconds;
        if !result.warnings.is_empty() {
            self.warning_count += 1;
        }
        if result.detection_failed() {
            self.detection_failures += 1;
        }
        if let Some(first) = result.detections.first() {
            self.frames_with_detection += 1;
            if self.examples.len() < self.example_limit {
                self.examples.push(ExampleDetection {
                    frame_index: result.frame.index,
                    frame_name: result.frame.name().to_string(),
                    detection: first.clone(),
                });
            }
        }
    }

    pub fn finish(self) -> Report {
        let (average_time_seconds, detection_rate_percent) = if self.total_frames > 0 {
            let frames = self.total_frames as f64;
            (
                self.total_time_seconds / frames,
                100.0 * self.frames_with_detection as f64 / frames,
            )
        } else {
            (0.0, 0.0)
        };
        Report {
            total_frames: self.total_frames,
            frames_with_detection: self.frames_with_detection,
            total_detections: self.total_detections,
            total_time_seconds: self.total_time_seconds,
            average_time_seconds,
            detection_rate_percent,
            warning_count: self.warning_count,
            detection_failures: self.detection_failures,
            examples: self.examples,
        }
    }

    /// One-shot aggregation over an ordered result sequence.
    pub fn aggregate(results: &[FrameResult], example_limit: usize) -> Report {
        let mut aggregator = Self::new(example_limit);
        for result in results {
            aggregator.push(result);
        }
        aggregator.finish()
    }
}

impl Default for ReportAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_EXAMPLE_LIMIT)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{}", rule)?;
        writeln!(f, "{:^50}", "FINAL REPORT")?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Total Frames Processed: {}", self.total_frames)?;
        writeln!(
            f,
            "Frames with Detections: {} ({:.1}%)",
            self.frames_with_detection, self.detection_rate_percent
        )?;
        writeln!(f, "Total Detections: {}", self.total_detections)?;
        writeln!(
            f,
            "Average Inference Time: {:.3} sec/frame",
            self.average_time_seconds
        )?;
        writeln!(f, "Total Processing Time: {:.2} sec", self.total_time_seconds)?;
        write!(f, "{}", rule)?;

        if !self.examples.is_empty() {
            writeln!(f)?;
            writeln!(f)?;
            write!(f, "Example Detections:")?;
            for example in &self.examples {
                writeln!(f)?;
                write!(
                    f,
                    "Frame {}: {} (conf: {:.2})",
                    example.frame_name,
                    example.detection.display_label(),
                    example.detection.confidence()
                )?;
            }
        }
        if self.warning_count > 0 {
            writeln!(f)?;
            writeln!(f)?;
            write!(
                f,
                "Warnings: {} frame(s) affected ({} detection failures)",
                self.warning_count, self.detection_failures
            )?;
        }
        Ok(())
    }
}
