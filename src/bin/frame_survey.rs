//! frame_survey - sample a recorded video, detect, relabel and report.
//!
//! Settings are layered: built-in defaults, then the file named by
//! `SURVEY_CONFIG`, then `SURVEY_*` environment variables, then flags.
//!
//! Exit status is 0 when the run completes and 1 when it fails.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use frame_survey::config::parse_remap;
use frame_survey::{
    DetectionEngine, DetectorBackend, FileConfig, FileSource, FilesystemArtifactStore, Pipeline,
    PipelineFault, RunError, ScriptedBackend, SurveyConfig,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "frame_survey",
    about = "Sample frames from a video, detect and relabel objects, and report"
)]
struct Args {
    /// Video file to survey (or a stub:// synthetic clip)
    #[arg(value_name = "VIDEO")]
    video: Option<String>,

    /// Directory for frame, annotated and report artifacts
    #[arg(long, short, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Keep one frame out of every N decoded frames
    #[arg(long, value_name = "N")]
    interval: Option<u32>,

    /// Source label to keep (repeatable; replaces the configured allow-list)
    #[arg(long = "allow", value_name = "LABEL")]
    allow: Vec<String>,

    /// Minimum detection confidence in [0, 1]
    #[arg(long, value_name = "F")]
    min_confidence: Option<f32>,

    /// Relabel SRC as DST (repeatable; replaces the configured remap table)
    #[arg(long, value_name = "SRC=DST")]
    remap: Vec<String>,

    /// Detector backend: tract (needs --model) or stub (scripted dry run)
    #[arg(long, value_name = "NAME")]
    backend: Option<String>,

    /// ONNX model for the tract backend
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// JSON report destination (default: <DIR>/report.json)
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let fault = err
                .downcast_ref::<RunError>()
                .map(|run_err| &run_err.fault)
                .or_else(|| err.downcast_ref::<PipelineFault>());
            match fault {
                Some(fault) => {
                    let at = fault
                        .frame_index()
                        .map(|i| format!(" at frame {}", i))
                        .unwrap_or_default();
                    eprintln!("frame_survey: {}{}: {:#}", fault.kind(), at, err);
                }
                None => eprintln!("frame_survey: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let config = {
        let _stage = ui.stage("Load configuration");
        let mut config = SurveyConfig::load()?;
        merge_args(&mut config, &args)?;
        config.validate()?;
        config.check_detector()?;
        config
    };
    let video = config
        .video_source
        .clone()
        .ok_or_else(|| {
            PipelineFault::configuration("no video given (pass VIDEO or set SURVEY_VIDEO_SOURCE)")
        })?;

    let engine = {
        let _stage = ui.stage("Load detector");
        DetectionEngine::from_boxed(build_backend(&config)?, config.preprocess)?
    };
    log::info!(
        "surveying {} into {} with backend '{}'",
        video,
        config.output_directory.display(),
        engine.backend_name()
    );

    let report_path = config.report_path();
    let store = FilesystemArtifactStore::new(config.output_directory.clone());
    let mut pipeline = Pipeline::new(config, engine, store);
    let mut source = FileSource::new(FileConfig { path: video });

    let outcome = {
        let _stage = ui.stage("Survey frames");
        let mut progress = ui.frames();
        pipeline.run_with(&mut source, |result, total| {
            progress.tick(result.frame.index, total, result.detections.len())
        })?
    };

    for warning in &outcome.warnings {
        log::warn!("frame {}: {}", warning.frame_index, warning.fault);
    }

    {
        let _stage = ui.stage("Write report");
        if let Some(parent) = report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create report directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&outcome.report)?;
        std::fs::write(&report_path, json)
            .with_context(|| format!("write report {}", report_path.display()))?;
    }

    println!("{}", outcome.report);
    log::info!("report written to {}", report_path.display());
    Ok(())
}

fn merge_args(config: &mut SurveyConfig, args: &Args) -> Result<()> {
    if let Some(video) = &args.video {
        config.video_source = Some(video.clone());
    }
    if let Some(output) = &args.output {
        config.output_directory = output.clone();
    }
    if let Some(interval) = args.interval {
        config.sampling_interval = interval;
    }
    if !args.allow.is_empty() {
        config.allow_list = args.allow.clone();
    }
    if let Some(min_confidence) = args.min_confidence {
        config.min_confidence = min_confidence;
    }
    if !args.remap.is_empty() {
        config.remap = parse_remap(&args.remap)?;
    }
    if let Some(backend) = &args.backend {
        config.detector.backend = backend.clone();
    }
    if let Some(model) = &args.model {
        config.detector.model_path = Some(model.clone());
    }
    if let Some(report) = &args.report {
        config.report_path = Some(report.clone());
    }
    Ok(())
}

fn build_backend(config: &SurveyConfig) -> Result<Box<dyn DetectorBackend>> {
    match config.detector.backend.as_str() {
        "stub" => {
            log::warn!("using the scripted stub detector; results are synthetic");
            Ok(Box::new(ScriptedBackend::demo()))
        }
        "tract" => build_tract_backend(config),
        other => Err(anyhow!("unknown detector backend '{}' (expected stub|tract)", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract_backend(config: &SurveyConfig) -> Result<Box<dyn DetectorBackend>> {
    let settings = &config.detector;
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("the tract backend needs --model or SURVEY_MODEL"))?;
    let backend =
        frame_survey::TractBackend::new(model_path, settings.input_width, settings.input_height)?
            .with_thresholds(config.decode_score_floor(), settings.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract_backend(_config: &SurveyConfig) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "the tract backend requires building with the backend-tract feature"
    ))
}
