//! The `predict` run: resolve arguments, detect on one image, save results.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use cli_support::{increment_run_dir, ThresholdOpts, ToolConfig};
use data_contracts::xyxy_to_cxcywh;
use image::DynamicImage;
use models::{checkpoint_exists, load_meta, ModelError, ModelRef};
use serde::{Deserialize, Serialize};
use tracing::info;
use vision_core::interfaces::{DetectionResult, Frame};
use vision_core::overlay::draw_detections;

use crate::error::{InferenceError, Result};
use crate::factory::{PredictorFactory, DEFAULT_MAX_DET};
use crate::source::ImageSource;

pub const DEFAULT_IMGSZ: u32 = 320;
pub const DEFAULT_CONF: f32 = 0.5;
pub const DEFAULT_IOU: f32 = 0.7;
pub const DEFAULT_RUN_NAME: &str = "predict";

#[derive(Parser, Debug, Clone)]
#[command(name = "predict", about = "Run a trained detector on one image")]
pub struct PredictArgs {
    /// Checkpoint (.bin with a .meta.json sidecar). Defaults to the config file value.
    #[arg(long)]
    pub model: Option<String>,
    /// Image path or http(s) URL.
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub project: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_RUN_NAME)]
    pub name: String,
    #[arg(long, default_value_t = DEFAULT_IMGSZ)]
    pub imgsz: u32,
    /// Minimum class confidence.
    #[arg(long, default_value_t = DEFAULT_CONF)]
    pub conf: f32,
    /// NMS IoU threshold.
    #[arg(long, default_value_t = DEFAULT_IOU)]
    pub iou: f32,
    #[arg(long, default_value_t = DEFAULT_MAX_DET)]
    pub max_det: usize,
    /// Skip writing the annotated image.
    #[arg(long, default_value_t = false)]
    pub no_save: bool,
    /// Also write `labels/<stem>.txt` in YOLO format with confidences.
    #[arg(long, default_value_t = false)]
    pub save_txt: bool,
}

impl PredictArgs {
    pub fn into_run(&self, cfg: &ToolConfig) -> PredictRun {
        PredictRun {
            model: ModelRef::parse(self.model.as_deref().unwrap_or(&cfg.predict_model)),
            source: ImageSource::parse(self.source.as_deref().unwrap_or(&cfg.predict_source)),
            project: self.project.clone().unwrap_or_else(|| cfg.runs_root.clone()),
            name: self.name.clone(),
            imgsz: self.imgsz,
            conf: self.conf,
            iou: self.iou,
            max_det: self.max_det,
            save: !self.no_save,
            save_txt: self.save_txt,
        }
    }
}

/// Resolved predict invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRun {
    pub model: ModelRef,
    pub source: ImageSource,
    pub project: PathBuf,
    pub name: String,
    pub imgsz: u32,
    pub conf: f32,
    pub iou: f32,
    pub max_det: usize,
    pub save: bool,
    pub save_txt: bool,
}

impl PredictRun {
    pub fn validate(&self) -> Result<()> {
        if self.imgsz < 32 {
            return Err(InferenceError::invalid_config("imgsz must be >= 32"));
        }
        if !(0.0..=1.0).contains(&self.conf) {
            return Err(InferenceError::invalid_config("conf must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.iou) {
            return Err(InferenceError::invalid_config("iou must be in [0, 1]"));
        }
        if self.max_det == 0 {
            return Err(InferenceError::invalid_config("max_det must be > 0"));
        }
        if self.name.trim().is_empty() {
            return Err(InferenceError::invalid_config("run name is empty"));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> ThresholdOpts {
        ThresholdOpts::new(self.conf, self.iou)
    }
}

#[derive(Debug, Clone)]
pub struct PredictOutcome {
    pub result: DetectionResult,
    /// Created only when something was saved.
    pub run_dir: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub labels: Option<PathBuf>,
}

/// Inputs that must exist before any model work starts.
fn preflight(run: &PredictRun) -> Result<&Path> {
    run.validate()?;
    let path = match &run.model {
        ModelRef::Checkpoint(path) => path,
        ModelRef::Preset(scale) => {
            return Err(InferenceError::invalid_config(format!(
                "{scale} is an untrained preset; predict needs a checkpoint"
            )));
        }
    };
    if !checkpoint_exists(path) {
        return Err(ModelError::CheckpointNotFound(path.clone()).into());
    }
    if let Some(local) = run.source.local_path() {
        if !local.is_file() {
            return Err(InferenceError::SourceNotFound(local.to_path_buf()));
        }
    }
    Ok(path)
}

/// `2 berry, 1 leaf` style summary; `(no detections)` when empty.
pub fn describe_counts(result: &DetectionResult, names: &[String]) -> String {
    if result.is_empty() {
        return "(no detections)".to_string();
    }
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for d in &result.detections {
        *counts.entry(d.class_id).or_default() += 1;
    }
    let mut out = String::new();
    for (i, (cls, n)) in counts.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match names.get(cls) {
            Some(name) => {
                let _ = write!(out, "{n} {name}");
            }
            None => {
                let _ = write!(out, "{n} class{cls}");
            }
        }
    }
    out
}

/// One line per detection: `cls cx cy w h conf`, normalized to the source image.
pub fn format_label_lines(result: &DetectionResult) -> String {
    let mut out = String::new();
    for d in &result.detections {
        let [cx, cy, w, h] = xyxy_to_cxcywh(d.bbox_xyxy);
        let _ = writeln!(out, "{} {cx:.6} {cy:.6} {w:.6} {h:.6} {:.6}", d.class_id, d.score);
    }
    out
}

pub fn run_predict(run: &PredictRun) -> Result<PredictOutcome> {
    let weights = preflight(run)?;
    let names = load_meta(weights)?.names;

    let factory = PredictorFactory {
        imgsz: Some(run.imgsz),
        max_det: run.max_det,
    };
    let mut detector = factory.build(&run.model, run.thresholds())?;

    let img = run.source.load()?;
    let (w, h) = img.dimensions();
    let frame = Frame::from_image(0, img, run.source.local_path().map(Path::to_path_buf));
    let started = Instant::now();
    let result = detector.detect(&frame);
    info!(
        "{}: {w}x{h} {}, {:.1}ms",
        run.source,
        describe_counts(&result, &names),
        started.elapsed().as_secs_f32() * 1000.0
    );

    let mut outcome = PredictOutcome {
        result,
        run_dir: None,
        image: None,
        labels: None,
    };
    if !run.save && !run.save_txt {
        return Ok(outcome);
    }
    let run_dir = increment_run_dir(&run.project, &run.name)
        .map_err(|e| InferenceError::io(&run.project, e))?;
    let file_name = run.source.file_name();

    if run.save {
        let Some(rgb) = frame.to_image() else {
            return Err(InferenceError::invalid_config("decoded frame has inconsistent size"));
        };
        let mut canvas = DynamicImage::ImageRgb8(rgb).to_rgba8();
        draw_detections(&mut canvas, &outcome.result.detections);
        let path = run_dir.join(&file_name);
        DynamicImage::ImageRgba8(canvas)
            .to_rgb8()
            .save(&path)
            .map_err(|source| InferenceError::SaveImage {
                path: path.clone(),
                source,
            })?;
        outcome.image = Some(path);
    }
    if run.save_txt {
        let labels_dir = run_dir.join("labels");
        fs::create_dir_all(&labels_dir).map_err(|e| InferenceError::io(&labels_dir, e))?;
        let stem = Path::new(&file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let path = labels_dir.join(format!("{stem}.txt"));
        fs::write(&path, format_label_lines(&outcome.result))
            .map_err(|e| InferenceError::io(&path, e))?;
        outcome.labels = Some(path);
    }
    info!(run_dir = %run_dir.display(), "results saved");
    outcome.run_dir = Some(run_dir);
    Ok(outcome)
}
