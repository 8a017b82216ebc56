use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use models::{load_checkpoint, DetectorScale, ModelRef};
use training::{run_train, MatchType, MatcherConfig, TrainBackend, TrainRun};

fn write_sample(root: &Path, split: &str, stem: &str, label: &str) {
    let img_dir = root.join("images").join(split);
    let lbl_dir = root.join("labels").join(split);
    fs::create_dir_all(&img_dir).unwrap();
    fs::create_dir_all(&lbl_dir).unwrap();
    let mut img = RgbImage::from_pixel(48, 32, Rgb([20, 30, 40]));
    for y in 8..24 {
        for x in 12..36 {
            img.put_pixel(x, y, Rgb([60, 80, 200]));
        }
    }
    img.save(img_dir.join(format!("{stem}.png"))).unwrap();
    fs::write(lbl_dir.join(format!("{stem}.txt")), label).unwrap();
}

fn tiny_dataset(root: &Path) -> std::path::PathBuf {
    write_sample(root, "train", "a", "0 0.5 0.5 0.5 0.5\n");
    write_sample(root, "train", "b", "1 0.25 0.25 0.1 0.2\n0 0.5 0.5 0.5 0.5\n");
    write_sample(root, "train", "c", "");
    write_sample(root, "val", "d", "0 0.5 0.5 0.5 0.5\n");
    let yaml = root.join("data.yaml");
    fs::write(
        &yaml,
        "train: images/train\nval: images/val\nnames:\n  0: berry\n  1: leaf\n",
    )
    .unwrap();
    yaml
}

fn tiny_run(data: std::path::PathBuf, project: std::path::PathBuf) -> TrainRun {
    TrainRun {
        model: ModelRef::Preset(DetectorScale::Nano),
        data,
        project,
        name: "train".into(),
        epochs: 1,
        imgsz: 64,
        batch: 2,
        lr: 1e-3,
        lr_schedule: Default::default(),
        patience: 0,
        seed: 7,
        match_type: MatchType::Hungarian,
        matcher: MatcherConfig::default(),
        loss_gains: Default::default(),
        fliplr: 0.5,
        workers: 1,
    }
}

#[test]
fn one_epoch_writes_run_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tiny_dataset(tmp.path());
    let run = tiny_run(data, tmp.path().join("runs"));

    let outcome = run_train(&run).unwrap();
    assert_eq!(outcome.run_dir, tmp.path().join("runs").join("train"));
    assert!(outcome.best.is_file());
    assert!(outcome.last.is_file());
    assert!(outcome.run_dir.join("args.json").is_file());

    let results = fs::read_to_string(outcome.run_dir.join("results.jsonl")).unwrap();
    assert_eq!(results.lines().count(), 1);
    let first: serde_json::Value = serde_json::from_str(results.lines().next().unwrap()).unwrap();
    assert_eq!(first["epoch"], 0);
    assert!(first["val_loss"].is_number());

    let args: TrainRun =
        serde_json::from_str(&fs::read_to_string(outcome.run_dir.join("args.json")).unwrap())
            .unwrap();
    assert_eq!(args, run);

    let (model, meta) = load_checkpoint::<TrainBackend>(&outcome.best, &Default::default()).unwrap();
    assert_eq!(meta.names, vec!["berry".to_string(), "leaf".to_string()]);
    assert_eq!(meta.imgsz, 64);
    assert_eq!(model.num_classes(), 2);
}

#[test]
fn second_run_gets_numbered_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tiny_dataset(tmp.path());
    let mut run = tiny_run(data, tmp.path().join("runs"));
    run.match_type = MatchType::Greedy;

    let first = run_train(&run).unwrap();
    let second = run_train(&run).unwrap();
    assert_eq!(first.run_dir.file_name().unwrap(), "train");
    assert_eq!(second.run_dir.file_name().unwrap(), "train2");
}

#[test]
fn corrupt_label_files_are_skipped_before_training() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tiny_dataset(tmp.path());
    write_sample(tmp.path(), "train", "e", "0 0.1 0.1 1.5 0.1 0.5 0.9\n");
    let run = tiny_run(data.clone(), tmp.path().join("runs"));

    let descriptor = data_contracts::DatasetDescriptor::load(&data).unwrap();
    let mut train =
        training::DetectionDataset::from_descriptor(&descriptor, data_contracts::Split::Train)
            .unwrap()
            .unwrap();
    assert_eq!(train.len(), 4);
    assert_eq!(train.drop_corrupt_labels(), 1);
    assert_eq!(train.len(), 3);
    assert!(train.samples().iter().all(|s| !s.label.ends_with("e.txt")));

    let outcome = run_train(&run).unwrap();
    assert!(outcome.best.is_file());
}

#[test]
fn all_corrupt_train_labels_fail_without_run_dir() {
    let tmp = tempfile::tempdir().unwrap();
    write_sample(tmp.path(), "train", "a", "0 0.5 0.5 0.5 0.5 0.2\n");
    write_sample(tmp.path(), "train", "b", "7 0.5 0.5 0.5 0.5\n");
    let yaml = tmp.path().join("data.yaml");
    fs::write(&yaml, "train: images/train\nnames: [berry, leaf]\n").unwrap();
    let run = tiny_run(yaml, tmp.path().join("runs"));

    let err = run_train(&run).unwrap_err();
    assert!(matches!(
        err,
        training::TrainingError::EmptySplit(data_contracts::Split::Train)
    ));
    assert!(!run.project.exists());
}
