use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::detect::PreprocessParams;
use crate::error::PipelineFault;
use crate::extract::DEFAULT_SAMPLING_INTERVAL;
use crate::frame::FrameNaming;
use crate::policy::{
    LabelPolicy, DEFAULT_ALLOWED_LABEL, DEFAULT_DISPLAY_LABEL, DEFAULT_MIN_CONFIDENCE,
};
use crate::report::DEFAULT_EXAMPLE_LIMIT;

const DEFAULT_OUTPUT_DIRECTORY: &str = "survey_frames";
const DEFAULT_BACKEND: &str = "tract";
const BACKENDS: [&str; 2] = ["stub", "tract"];
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const REPORT_FILE_NAME: &str = "report.json";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SurveyConfigFile {
    video_source: Option<String>,
    output_directory: Option<PathBuf>,
    sampling_interval: Option<u32>,
    labels: Option<LabelsConfigFile>,
    naming: Option<NamingConfigFile>,
    preprocess: Option<PreprocessConfigFile>,
    detector: Option<DetectorConfigFile>,
    report: Option<ReportConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LabelsConfigFile {
    allow_list: Option<Vec<String>>,
    min_confidence: Option<f32>,
    remap: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct NamingConfigFile {
    frame_prefix: Option<String>,
    annotated_prefix: Option<String>,
    extension: Option<String>,
    index_width: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PreprocessConfigFile {
    gain: Option<f32>,
    offset: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    score_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ReportConfigFile {
    path: Option<PathBuf>,
    example_limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveyConfig {
    pub video_source: Option<String>,
    pub output_directory: PathBuf,
    pub sampling_interval: u32,
    pub allow_list: Vec<String>,
    pub min_confidence: f32,
    pub remap: BTreeMap<String, String>,
    pub naming: FrameNaming,
    pub preprocess: PreprocessParams,
    pub detector: DetectorSettings,
    /// Where the JSON report goes; defaults to `<output_directory>/report.json`.
    pub report_path: Option<PathBuf>,
    pub example_limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub score_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            video_source: None,
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            allow_list: vec![DEFAULT_ALLOWED_LABEL.to_string()],
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            remap: BTreeMap::from([(
                DEFAULT_ALLOWED_LABEL.to_string(),
                DEFAULT_DISPLAY_LABEL.to_string(),
            )]),
            naming: FrameNaming::default(),
            preprocess: PreprocessParams::default(),
            detector: DetectorSettings::default(),
            report_path: None,
            example_limit: DEFAULT_EXAMPLE_LIMIT,
        }
    }
}

impl SurveyConfig {
    /// Defaults, then the file named by `SURVEY_CONFIG`, then `SURVEY_*`
    /// environment overrides. The result is validated.
    pub fn load() -> Result<Self, PipelineFault> {
        let config_path = std::env::var("SURVEY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific config file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self, PipelineFault> {
        let cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SurveyConfigFile) -> Self {
        let defaults = Self::default();
        let labels = file.labels.unwrap_or_default();
        let naming = file.naming.unwrap_or_default();
        let preprocess = file.preprocess.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let report = file.report.unwrap_or_default();

        Self {
            video_source: file.video_source,
            output_directory: file.output_directory.unwrap_or(defaults.output_directory),
            sampling_interval: file.sampling_interval.unwrap_or(defaults.sampling_interval),
            allow_list: labels.allow_list.unwrap_or(defaults.allow_list),
            min_confidence: labels.min_confidence.unwrap_or(defaults.min_confidence),
            remap: labels.remap.unwrap_or(defaults.remap),
            naming: FrameNaming {
                frame_prefix: naming.frame_prefix.unwrap_or(defaults.naming.frame_prefix),
                annotated_prefix: naming
                    .annotated_prefix
                    .unwrap_or(defaults.naming.annotated_prefix),
                extension: naming.extension.unwrap_or(defaults.naming.extension),
                index_width: naming.index_width.unwrap_or(defaults.naming.index_width),
            },
            preprocess: PreprocessParams {
                gain: preprocess.gain.unwrap_or(defaults.preprocess.gain),
                offset: preprocess.offset.unwrap_or(defaults.preprocess.offset),
            },
            detector: DetectorSettings {
                backend: detector.backend.unwrap_or(defaults.detector.backend),
                model_path: detector.model_path,
                input_width: detector.input_width.unwrap_or(defaults.detector.input_width),
                input_height: detector.input_height.unwrap_or(defaults.detector.input_height),
                score_threshold: detector
                    .score_threshold
                    .unwrap_or(defaults.detector.score_threshold),
                iou_threshold: detector
                    .iou_threshold
                    .unwrap_or(defaults.detector.iou_threshold),
            },
            report_path: report.path,
            example_limit: report.example_limit.unwrap_or(defaults.example_limit),
        }
    }

    fn apply_env(&mut self) -> Result<(), PipelineFault> {
        if let Some(source) = non_empty_env("SURVEY_VIDEO_SOURCE") {
            self.video_source = Some(source);
        }
        if let Some(dir) = non_empty_env("SURVEY_OUTPUT_DIR") {
            self.output_directory = PathBuf::from(dir);
        }
        if let Some(interval) = non_empty_env("SURVEY_INTERVAL") {
            self.sampling_interval = interval.trim().parse().map_err(|_| {
                PipelineFault::configuration("SURVEY_INTERVAL must be a positive integer")
            })?;
        }
        if let Some(confidence) = non_empty_env("SURVEY_MIN_CONFIDENCE") {
            self.min_confidence = confidence.trim().parse().map_err(|_| {
                PipelineFault::configuration("SURVEY_MIN_CONFIDENCE must be a number in [0, 1]")
            })?;
        }
        if let Ok(labels) = std::env::var("SURVEY_ALLOW_LIST") {
            self.allow_list = split_csv(&labels);
        }
        if let Some(remap) = non_empty_env("SURVEY_REMAP") {
            self.remap = parse_remap(split_csv(&remap))?;
        }
        if let Some(backend) = non_empty_env("SURVEY_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(model) = non_empty_env("SURVEY_MODEL") {
            self.detector.model_path = Some(PathBuf::from(model));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PipelineFault> {
        if self.sampling_interval == 0 {
            return Err(PipelineFault::configuration(
                "sampling_interval must be a positive integer",
            ));
        }
        self.label_policy()?;
        if self.naming.index_width == 0 {
            return Err(PipelineFault::configuration("naming.index_width must be > 0"));
        }
        if self.naming.extension.trim().is_empty() {
            return Err(PipelineFault::configuration("naming.extension must be set"));
        }
        if self.naming.frame_prefix == self.naming.annotated_prefix {
            return Err(PipelineFault::configuration(
                "frame and annotated prefixes must differ",
            ));
        }
        if !self.preprocess.gain.is_finite()
            || self.preprocess.gain < 0.0
            || !self.preprocess.offset.is_finite()
        {
            return Err(PipelineFault::configuration(
                "preprocess gain must be a finite non-negative number and offset finite",
            ));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(PipelineFault::configuration(
                "detector input dimensions must be > 0",
            ));
        }
        for (name, value) in [
            ("score_threshold", self.detector.score_threshold),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineFault::configuration(format!(
                    "detector.{} must be within [0, 1]",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Backend name is known and the tract backend has a model to load.
    pub fn check_detector(&self) -> Result<(), PipelineFault> {
        let backend = self.detector.backend.as_str();
        if !BACKENDS.contains(&backend) {
            return Err(PipelineFault::configuration(format!(
                "unknown detector backend '{}' (expected {})",
                backend,
                BACKENDS.join("|")
            )));
        }
        if backend == "tract" && self.detector.model_path.is_none() {
            return Err(PipelineFault::configuration(
                "the tract backend needs a model (--model or SURVEY_MODEL); \
                 pass --backend stub for a scripted dry run",
            ));
        }
        Ok(())
    }

    /// Score floor applied while decoding model output. Never above
    /// `min_confidence`, so the label policy sees every candidate it could keep.
    pub fn decode_score_floor(&self) -> f32 {
        self.detector.score_threshold.min(self.min_confidence)
    }

    pub fn label_policy(&self) -> Result<LabelPolicy, PipelineFault> {
        LabelPolicy::new(
            self.allow_list.iter().cloned(),
            self.min_confidence,
            self.remap.clone(),
        )
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| self.output_directory.join(REPORT_FILE_NAME))
    }
}

fn read_config_file(path: &Path) -> Result<SurveyConfigFile, PipelineFault> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PipelineFault::configuration(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let parsed = if is_toml {
        toml::from_str(&raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| {
        PipelineFault::configuration(format!("invalid config file {}: {}", path.display(), e))
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

/// Parse `source=display` pairs.
pub fn parse_remap<I, S>(entries: I) -> Result<BTreeMap<String, String>, PipelineFault>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut remap = BTreeMap::new();
    for entry in entries {
        let entry = entry.as_ref();
        let (source, display) = entry.split_once('=').ok_or_else(|| {
            PipelineFault::configuration(format!(
                "remap entry '{}' must look like source=display",
                entry
            ))
        })?;
        let (source, display) = (source.trim(), display.trim());
        if source.is_empty() || display.is_empty() {
            return Err(PipelineFault::configuration(format!(
                "remap entry '{}' has a blank side",
                entry
            )));
        }
        remap.insert(source.to_string(), display.to_string());
    }
    Ok(remap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let cfg = SurveyConfig::default();
        assert_eq!(cfg.sampling_interval, 30);
        assert_eq!(cfg.allow_list, vec!["scissors".to_string()]);
        assert_eq!(cfg.min_confidence, 0.2);
        assert_eq!(cfg.remap.get("scissors").map(String::as_str), Some("surgical forceps"));
        assert_eq!(cfg.report_path(), PathBuf::from("survey_frames/report.json"));
        assert_eq!(cfg.detector.backend, "tract");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.label_policy().unwrap(), LabelPolicy::default());
    }

    #[test]
    fn zero_interval_is_a_configuration_fault() {
        let cfg = SurveyConfig {
            sampling_interval: 0,
            ..SurveyConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::FaultKind::ConfigurationFault);
    }

    #[test]
    fn detector_needs_a_model_unless_stubbed() {
        let cfg = SurveyConfig::default();
        let err = cfg.check_detector().unwrap_err();
        assert_eq!(err.kind(), crate::error::FaultKind::ConfigurationFault);

        let mut stub = SurveyConfig::default();
        stub.detector.backend = "stub".to_string();
        assert!(stub.check_detector().is_ok());

        let mut tract = SurveyConfig::default();
        tract.detector.model_path = Some(PathBuf::from("models/yolov5x.onnx"));
        assert!(tract.check_detector().is_ok());

        tract.detector.backend = "opencv".to_string();
        assert!(tract.check_detector().is_err());
    }

    #[test]
    fn decode_floor_does_not_hide_policy_candidates() {
        use crate::detect::yolo::{decode_output, DecodeParams};
        use crate::detect::{BoundingBox, Detection};

        let cfg = SurveyConfig::default();
        assert!(cfg.detector.score_threshold > cfg.min_confidence);
        assert_eq!(cfg.decode_score_floor(), cfg.min_confidence);

        let scissors = crate::detect::yolo::COCO_CLASSES
            .iter()
            .position(|name| *name == "scissors")
            .unwrap();
        let mut data = vec![0.0f32; 85];
        data[..5].copy_from_slice(&[50.0, 40.0, 20.0, 10.0, 1.0]);
        data[5 + scissors] = 0.22;
        let decoded = decode_output(
            &[1, 1, 85],
            &data,
            DecodeParams {
                score_threshold: cfg.decode_score_floor(),
                iou_threshold: cfg.detector.iou_threshold,
                scale_x: 1.0,
                scale_y: 1.0,
            },
        )
        .unwrap();
        assert_eq!(decoded.len(), 1);

        let candidates: Vec<_> = decoded
            .iter()
            .map(|d| {
                let bbox = BoundingBox::new(40.0, 35.0, 60.0, 45.0);
                Detection::new(bbox, d.confidence, d.label.clone())
            })
            .collect();
        let kept = cfg.label_policy().unwrap().apply(&candidates);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].display_label(), "surgical forceps");
    }

    #[test]
    fn remap_pairs_are_parsed() {
        let remap = parse_remap(["scissors=surgical forceps", " knife = scalpel "]).unwrap();
        assert_eq!(remap.get("knife").map(String::as_str), Some("scalpel"));
        assert!(parse_remap(["scissors"]).is_err());
        assert!(parse_remap(["=forceps"]).is_err());
    }

    #[test]
    fn toml_files_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.toml");
        std::fs::write(
            &path,
            r#"
sampling_interval = 15

[labels]
allow_list = ["scissors", "knife"]
min_confidence = 0.4

[labels.remap]
knife = "scalpel"

[detector]
backend = "tract"
model_path = "models/yolov5s.onnx"
"#,
        )
        .unwrap();

        let cfg = SurveyConfig::from_path(&path).unwrap();
        assert_eq!(cfg.sampling_interval, 15);
        assert_eq!(cfg.allow_list.len(), 2);
        assert_eq!(cfg.min_confidence, 0.4);
        assert_eq!(cfg.remap.len(), 1);
        assert_eq!(cfg.detector.backend, "tract");
        assert_eq!(cfg.detector.input_width, 640);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.json");
        std::fs::write(&path, r#"{ "sampling_intervall": 10 }"#).unwrap();
        let err = SurveyConfig::from_path(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::FaultKind::ConfigurationFault);
    }
}
