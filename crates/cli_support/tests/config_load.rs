use std::fs;
use std::path::PathBuf;

use cli_support::config::{DEFAULT_BASE_MODEL, DEFAULT_PREDICT_SOURCE};
use cli_support::{increment_run_dir, next_run_dir, ConfigError, ToolConfig};

#[test]
fn loads_partial_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seaqueue.toml");
    fs::write(
        &path,
        "runs_root = \"/tmp/seaqueue-runs\"\n[predict]\nmodel = \"/tmp/best.bin\"\n",
    )
    .unwrap();
    let cfg = ToolConfig::from_path(&path).expect("load config");
    assert_eq!(cfg.runs_root, PathBuf::from("/tmp/seaqueue-runs"));
    assert_eq!(cfg.predict_model, "/tmp/best.bin");
    assert_eq!(cfg.base_model, DEFAULT_BASE_MODEL);
    assert_eq!(cfg.predict_source, DEFAULT_PREDICT_SOURCE);
}

#[test]
fn explicit_config_must_exist_and_parse() {
    let dir = tempfile::tempdir().unwrap();
    let fallback = dir.path().join("seaqueue.toml");
    let absent = dir.path().join("absent.toml");
    let err = ToolConfig::resolve(Some(absent.clone()), &fallback).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(ref p) if *p == absent));

    let typo = dir.path().join("typo.toml");
    fs::write(&typo, "runs_rot = \"/tmp/runs\"\n").unwrap();
    let err = ToolConfig::resolve(Some(typo.clone()), &fallback).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { ref path, .. } if *path == typo));

    let as_dir = dir.path().join("config_dir");
    fs::create_dir(&as_dir).unwrap();
    assert!(matches!(
        ToolConfig::from_path(&as_dir),
        Err(ConfigError::Read { .. })
    ));
}

#[test]
fn missing_default_config_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ToolConfig::resolve(None, &dir.path().join("seaqueue.toml")).unwrap();
    assert_eq!(cfg, ToolConfig::default());
}

#[test]
fn malformed_default_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let fallback = dir.path().join("seaqueue.toml");
    fs::write(&fallback, "epochs = \"many\"\n").unwrap();
    assert!(matches!(
        ToolConfig::resolve(None, &fallback),
        Err(ConfigError::Parse { .. })
    ));

    fs::write(&fallback, "base_model = \"det-s\"\n").unwrap();
    let cfg = ToolConfig::resolve(None, &fallback).unwrap();
    assert_eq!(cfg.base_model, "det-s");
}

#[test]
fn run_dirs_increment() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("runs");
    assert_eq!(next_run_dir(&project, "train"), project.join("train"));
    let first = increment_run_dir(&project, "train").unwrap();
    let second = increment_run_dir(&project, "train").unwrap();
    let third = increment_run_dir(&project, "train").unwrap();
    assert_eq!(first, project.join("train"));
    assert_eq!(second, project.join("train2"));
    assert_eq!(third, project.join("train3"));
    assert!(third.is_dir());
    assert_eq!(next_run_dir(&project, "predict"), project.join("predict"));
}
