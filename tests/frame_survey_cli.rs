use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn survey(args: &[&str], dir: &Path) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_frame_survey"));
    for key in [
        "SURVEY_CONFIG",
        "SURVEY_VIDEO_SOURCE",
        "SURVEY_OUTPUT_DIR",
        "SURVEY_INTERVAL",
        "SURVEY_MIN_CONFIDENCE",
        "SURVEY_ALLOW_LIST",
        "SURVEY_REMAP",
        "SURVEY_BACKEND",
        "SURVEY_MODEL",
    ] {
        cmd.env_remove(key);
    }
    cmd.env("RUST_LOG", "warn")
        .arg("--output")
        .arg(dir)
        .arg("--ui")
        .arg("plain")
        .args(args)
        .output()
        .expect("spawn frame_survey")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn stub_run_exits_zero_and_writes_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = survey(
        &["stub://clip?frames=60&size=320x240", "--backend", "stub"],
        dir.path(),
    );

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FINAL REPORT"));
    assert!(stdout.contains("Total Frames Processed: 2"));

    let raw = std::fs::read_to_string(dir.path().join("report.json")).expect("report.json");
    let report: Value = serde_json::from_str(&raw).expect("report is JSON");
    assert_eq!(report["total_frames"], 2);
    assert_eq!(report["frames_with_detection"], 1);
    assert!(dir.path().join("frame_0001.jpg").is_file());
    assert!(dir.path().join("annotated_frame_0000.jpg").is_file());
}

#[test]
fn zero_interval_exits_one_with_configuration_fault() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = survey(
        &["stub://clip?frames=60", "--backend", "stub", "--interval", "0"],
        dir.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ConfigurationFault"), "stderr: {}", stderr(&output));
    assert!(!dir.path().join("report.json").exists());
}

#[test]
fn default_backend_requires_a_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = survey(&["stub://clip?frames=30"], dir.path());

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("ConfigurationFault"), "stderr: {err}");
    assert!(err.contains("--model"), "stderr: {err}");
    assert!(!dir.path().join("frame_0000.jpg").exists());
}

#[test]
fn remote_source_exits_one_with_extraction_fault() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = survey(&["rtsp://camera-1/stream", "--backend", "stub"], dir.path());

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ExtractionFault"), "stderr: {}", stderr(&output));
}
