use std::path::PathBuf;

use clap::Parser;
use cli_support::ToolConfig;
use inference::{run_predict, ImageSource, InferenceError, PredictArgs, PredictRun};
use models::ModelRef;

fn default_run() -> PredictRun {
    PredictArgs::parse_from(["predict"]).into_run(&ToolConfig::default())
}

#[test]
fn no_flags_yield_literal_payload() {
    let run = default_run();
    assert_eq!(
        run.model,
        ModelRef::Checkpoint(PathBuf::from(
            "/work/NASASPaceResearch/seaqueue/yolo/util/runs/train3/weights/best.bin"
        ))
    );
    assert_eq!(
        run.source,
        ImageSource::Url("https://ultralytics.com/images/bus.jpg".into())
    );
    assert_eq!(
        run.project,
        PathBuf::from("/work/NASASPaceResearch/seaqueue/yolo/util/runs")
    );
    assert_eq!(run.imgsz, 320);
    assert_eq!(run.conf, 0.5);
    assert!(run.save);
    assert!(!run.save_txt);
}

#[test]
fn payload_assembly_is_idempotent() {
    assert_eq!(default_run(), default_run());
}

#[test]
fn missing_checkpoint_fails_before_any_output() {
    let tmp = tempfile::tempdir().unwrap();
    let mut run = default_run();
    run.model = ModelRef::Checkpoint(tmp.path().join("weights").join("best.bin"));
    run.project = tmp.path().join("runs");

    let err = run_predict(&run).unwrap_err();
    assert!(matches!(
        err,
        InferenceError::Model(models::ModelError::CheckpointNotFound(_))
    ));
    assert!(!run.project.exists());
}

#[test]
fn presets_are_rejected() {
    let mut run = default_run();
    run.model = ModelRef::parse("det-n");
    assert!(matches!(
        run_predict(&run),
        Err(InferenceError::InvalidConfig(_))
    ));
}

#[test]
fn out_of_range_conf_is_rejected() {
    let run = PredictArgs::parse_from(["predict", "--conf", "1.5"]).into_run(&ToolConfig::default());
    assert!(matches!(run.validate(), Err(InferenceError::InvalidConfig(_))));
}
