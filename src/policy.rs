//! Domain filtering and relabeling of raw detections.

use std::collections::{BTreeMap, BTreeSet};

use crate::detect::Detection;
use crate::error::PipelineFault;

pub const DEFAULT_ALLOWED_LABEL: &str = "scissors";
pub const DEFAULT_DISPLAY_LABEL: &str = "surgical forceps";
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.2;

/// Which source labels survive, above which confidence, and what they are
/// called once they do.
///
/// Remapping is a single lookup on the source label; chains such as `a -> b`,
/// `b -> c` are never followed.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelPolicy {
    allow_list: BTreeSet<String>,
    min_confidence: f32,
    remap: BTreeMap<String, String>,
}

impl LabelPolicy {
    pub fn new<A, S, R, K, V>(
        allow_list: A,
        min_confidence: f32,
        remap: R,
    ) -> Result<Self, PipelineFault>
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let policy = Self {
            allow_list: allow_list.into_iter().map(Into::into).collect(),
            min_confidence,
            remap: remap
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PipelineFault> {
        if !self.min_confidence.is_finite() || !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(PipelineFault::configuration(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.allow_list.iter().any(|label| label.trim().is_empty()) {
            return Err(PipelineFault::configuration(
                "allow_list contains a blank label",
            ));
        }
        for (source, display) in &self.remap {
            if source.trim().is_empty() || display.trim().is_empty() {
                return Err(PipelineFault::configuration(format!(
                    "remap entry '{}' -> '{}' has a blank side",
                    source, display
                )));
            }
        }
        Ok(())
    }

    pub fn allow_list(&self) -> &BTreeSet<String> {
        &self.allow_list
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn remap_table(&self) -> &BTreeMap<String, String> {
        &self.remap
    }

    pub fn keeps(&self, detection: &Detection) -> bool {
        self.allow_list.contains(detection.source_label())
            && detection.confidence() >= self.min_confidence
    }

    /// Display label for `source_label`; unmapped labels pass through.
    pub fn display_label<'a>(&'a self, source_label: &'a str) -> &'a str {
        self.remap
            .get(source_label)
            .map(String::as_str)
            .unwrap_or(source_label)
    }

    /// Filter and relabel, preserving input order. The input is not modified;
    /// every output detection is a fresh value.
    pub fn apply(&self, raw: &[Detection]) -> Vec<Detection> {
        raw.iter()
            .filter(|det| self.keeps(det))
            .map(|det| det.relabeled(self.display_label(det.source_label())))
            .collect()
    }
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            allow_list: BTreeSet::from([DEFAULT_ALLOWED_LABEL.to_string()]),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            remap: BTreeMap::from([(
                DEFAULT_ALLOWED_LABEL.to_string(),
                DEFAULT_DISPLAY_LABEL.to_string(),
            )]),
        }
    }
}
