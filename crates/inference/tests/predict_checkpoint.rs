use std::path::Path;

use image::{Rgb, RgbImage};
use inference::{run_predict, ImageSource, InferenceBackend, PredictRun, PredictorFactory};
use models::{save_checkpoint, CheckpointMeta, Detector, DetectorScale, ModelRef};
use vision_core::interfaces::{Detector as _, Frame};

fn write_checkpoint(dir: &Path) -> std::path::PathBuf {
    let cfg = DetectorScale::Nano.config(2);
    let model = Detector::<InferenceBackend>::new(cfg, &Default::default());
    let weights = dir.join("weights").join("best.bin");
    let meta = CheckpointMeta {
        config: cfg,
        names: vec!["berry".into(), "leaf".into()],
        imgsz: 64,
        epoch: 1,
    };
    save_checkpoint(&model, &meta, &weights).unwrap();
    weights
}

fn write_image(path: &Path) {
    let mut img = RgbImage::from_pixel(80, 40, Rgb([10, 120, 40]));
    for x in 20..50 {
        img.put_pixel(x, 20, Rgb([250, 250, 250]));
    }
    img.save(path).unwrap();
}

#[test]
fn factory_builds_detector_from_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let weights = write_checkpoint(tmp.path());
    let factory = PredictorFactory {
        imgsz: None,
        max_det: 4,
    };
    let burn = factory
        .build_burn(&ModelRef::Checkpoint(weights.clone()), cli_support::ThresholdOpts::new(0.0, 0.7))
        .unwrap();
    assert_eq!(burn.imgsz(), 64);

    let mut det = factory
        .build(&ModelRef::Checkpoint(weights), cli_support::ThresholdOpts::new(0.0, 0.7))
        .unwrap();
    let frame = Frame::from_image(3, RgbImage::new(50, 30), None);
    let result = det.detect(&frame);
    assert_eq!(result.frame_id, 3);
    assert!(!result.is_empty());
    assert!(result.detections.len() <= 4);
    for d in &result.detections {
        assert!(d.bbox_xyxy.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(d.class_id < 2);
    }
}

#[test]
fn predict_saves_annotated_image_and_labels() {
    let tmp = tempfile::tempdir().unwrap();
    let weights = write_checkpoint(tmp.path());
    let image_path = tmp.path().join("field.png");
    write_image(&image_path);

    let run = PredictRun {
        model: ModelRef::Checkpoint(weights),
        source: ImageSource::Path(image_path),
        project: tmp.path().join("runs"),
        name: "predict".into(),
        imgsz: 64,
        conf: 0.0,
        iou: 0.7,
        max_det: 5,
        save: true,
        save_txt: true,
    };
    let outcome = run_predict(&run).unwrap();
    let run_dir = outcome.run_dir.clone().unwrap();
    assert_eq!(run_dir, tmp.path().join("runs").join("predict"));

    let saved = outcome.image.unwrap();
    assert_eq!(saved, run_dir.join("field.png"));
    let annotated = image::open(&saved).unwrap();
    assert_eq!((annotated.width(), annotated.height()), (80, 40));

    let labels = std::fs::read_to_string(outcome.labels.unwrap()).unwrap();
    assert_eq!(labels.lines().count(), outcome.result.detections.len());
    assert!(labels.lines().count() <= 5);
    for line in labels.lines() {
        assert_eq!(line.split_whitespace().count(), 6);
    }

    let again = run_predict(&run).unwrap();
    assert_eq!(
        again.run_dir.unwrap(),
        tmp.path().join("runs").join("predict2")
    );
}

#[test]
fn nothing_is_written_without_save() {
    let tmp = tempfile::tempdir().unwrap();
    let weights = write_checkpoint(tmp.path());
    let image_path = tmp.path().join("field.png");
    write_image(&image_path);
    let run = PredictRun {
        model: ModelRef::Checkpoint(weights),
        source: ImageSource::Path(image_path),
        project: tmp.path().join("runs"),
        name: "predict".into(),
        imgsz: 64,
        conf: 0.5,
        iou: 0.7,
        max_det: 300,
        save: false,
        save_txt: false,
    };
    let outcome = run_predict(&run).unwrap();
    assert!(outcome.run_dir.is_none());
    assert!(!tmp.path().join("runs").exists());
}
