use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::{ColorOrder, DetectorBackend};
use crate::detect::result::{BoundingBox, RawDetection};

/// What the scripted backend does on one call.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Detections(Vec<RawDetection>),
    Fail(String),
    Panic,
}

/// Deterministic backend for tests and dry runs.
///
/// Call `n` plays step `n` of the script. Past the end the backend returns no
/// detections, or wraps around when built with `cycled`.
pub struct ScriptedBackend {
    steps: Vec<ScriptStep>,
    cycle: bool,
    calls: usize,
    input_color: ColorOrder,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            cycle: false,
            calls: 0,
            input_color: ColorOrder::Rgb,
        }
    }

    pub fn with_step(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_input_color(mut self, order: ColorOrder) -> Self {
        self.input_color = order;
        self
    }

    /// Replay the script from the start once it is exhausted.
    pub fn cycled(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Script used by the CLI `stub` backend: one confident hit, one empty
    /// frame, one hit under the default confidence floor.
    pub fn demo() -> Self {
        Self::new()
            .with_step(ScriptStep::Detections(vec![RawDetection::new(
                BoundingBox::new(40.0, 60.0, 160.0, 140.0),
                0.87,
                "scissors",
            )]))
            .with_step(ScriptStep::Detections(Vec::new()))
            .with_step(ScriptStep::Detections(vec![
                RawDetection::new(BoundingBox::new(10.0, 10.0, 60.0, 50.0), 0.15, "scissors"),
                RawDetection::new(BoundingBox::new(100.0, 30.0, 180.0, 90.0), 0.66, "knife"),
            ]))
            .cycled()
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    fn step_for_call(&self, call: usize) -> Option<&ScriptStep> {
        if self.steps.is_empty() {
            return None;
        }
        if self.cycle {
            self.steps.get(call % self.steps.len())
        } else {
            self.steps.get(call)
        }
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_color(&self) -> ColorOrder {
        self.input_color
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<RawDetection>> {
        let call = self.calls;
        self.calls += 1;
        match self.step_for_call(call) {
            None => Ok(Vec::new()),
            Some(ScriptStep::Detections(detections)) => Ok(detections.clone()),
            Some(ScriptStep::Fail(reason)) => Err(anyhow!("{}", reason)),
            Some(ScriptStep::Panic) => panic!("scripted backend panic on call {}", call),
        }
    }
}
