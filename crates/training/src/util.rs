use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::Backend;
use clap::{Parser, ValueEnum};
use cli_support::{increment_run_dir, ToolConfig};
use data_contracts::{cxcywh_to_xyxy, DatasetDescriptor, DatasetError, Split};
use models::{
    checkpoint_exists, decode_queries, load_checkpoint, save_checkpoint, CheckpointMeta, Detector,
    DetectorConfig, ModelError, ModelRef,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::{
    LossGains, MatchType, MatcherConfig, ScheduleKind, TrainRun, DEFAULT_BATCH, DEFAULT_EPOCHS,
    DEFAULT_FLIPLR, DEFAULT_IMGSZ, DEFAULT_LR, DEFAULT_PATIENCE, DEFAULT_RUN_NAME,
};
use crate::dataset::{collate, DetectionDataset};
use crate::error::{Result, TrainingError};
use crate::loss::{build_targets, detection_loss, LossValues};
use crate::matching::Matcher;
use crate::metrics::{DetectionCounts, EpochMetrics, TrainingMetrics, TrainingState};
use crate::TrainBackend;

type ADBackend = Autodiff<TrainBackend>;

/// Confidence used when counting precision/recall during validation.
const VAL_CONF: f32 = 0.25;
const VAL_IOU: f32 = 0.5;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    #[value(name = "ndarray")]
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "train", about = "Train a set-prediction detector on a YOLO dataset")]
pub struct TrainArgs {
    /// Base model: preset (det-n, det-s, det-m) or checkpoint path. Defaults to the config file, then det-n.
    #[arg(long)]
    pub model: Option<String>,
    /// Dataset descriptor (data.yaml).
    #[arg(long)]
    pub data: Option<PathBuf>,
    /// Directory under which the run directory is created.
    #[arg(long)]
    pub project: Option<PathBuf>,
    /// Run directory name; a numeric suffix is added when it exists.
    #[arg(long, default_value = DEFAULT_RUN_NAME)]
    pub name: String,
    #[arg(long, default_value_t = DEFAULT_EPOCHS)]
    pub epochs: usize,
    /// Square training input size.
    #[arg(long, default_value_t = DEFAULT_IMGSZ)]
    pub imgsz: u32,
    #[arg(long, default_value_t = DEFAULT_BATCH)]
    pub batch: usize,
    /// Base learning rate (Adam).
    #[arg(long, default_value_t = DEFAULT_LR)]
    pub lr: f32,
    #[arg(long, value_enum, default_value_t = ScheduleKind::WarmupCosine)]
    pub lr_schedule: ScheduleKind,
    /// Epochs without improvement before stopping (0 disables).
    #[arg(long, default_value_t = DEFAULT_PATIENCE)]
    pub patience: usize,
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    #[arg(long, value_enum, default_value_t = MatchType::Hungarian)]
    pub match_type: MatchType,
    #[arg(long, default_value_t = 1.0)]
    pub cost_class: f32,
    #[arg(long, default_value_t = 5.0)]
    pub cost_bbox: f32,
    #[arg(long, default_value_t = 2.0)]
    pub cost_giou: f32,
    /// Use `-p` as the class cost and BCE as the class loss instead of focal.
    #[arg(long, default_value_t = false)]
    pub no_focal: bool,
    /// Horizontal flip probability.
    #[arg(long, default_value_t = DEFAULT_FLIPLR)]
    pub fliplr: f32,
    /// Image-loading threads (0 = one per core).
    #[arg(long, default_value_t = 0)]
    pub workers: usize,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
}

impl TrainArgs {
    /// Flags win, then the tool config, then built-in defaults.
    pub fn into_run(&self, cfg: &ToolConfig) -> TrainRun {
        let defaults = MatcherConfig::default();
        TrainRun {
            model: ModelRef::parse(self.model.as_deref().unwrap_or(&cfg.base_model)),
            data: self.data.clone().unwrap_or_else(|| cfg.dataset.clone()),
            project: self.project.clone().unwrap_or_else(|| cfg.runs_root.clone()),
            name: self.name.clone(),
            epochs: self.epochs,
            imgsz: self.imgsz,
            batch: self.batch,
            lr: self.lr,
            lr_schedule: self.lr_schedule.schedule(),
            patience: self.patience,
            seed: self.seed,
            match_type: self.match_type,
            matcher: MatcherConfig {
                cost_class: self.cost_class,
                cost_bbox: self.cost_bbox,
                cost_giou: self.cost_giou,
                use_focal: !self.no_focal,
                ..defaults
            },
            loss_gains: LossGains::default(),
            fliplr: self.fliplr,
            workers: self.workers,
        }
    }
}

pub fn validate_backend_choice(kind: BackendKind) -> Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            return Err(TrainingError::invalid_config(
                "backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend",
            ));
        }
        (BackendKind::NdArray, true) => {
            warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

/// Artifacts of a finished run.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub run_dir: PathBuf,
    pub best: PathBuf,
    pub last: PathBuf,
    pub metrics: TrainingMetrics,
}

/// Checks that need no model work: config sanity and input presence.
fn preflight(run: &TrainRun) -> Result<()> {
    run.validate()?;
    if !run.data.is_file() {
        return Err(DatasetError::DescriptorNotFound(run.data.clone()).into());
    }
    if let Some(path) = run.model.checkpoint_path() {
        if !checkpoint_exists(path) {
            return Err(ModelError::CheckpointNotFound(path.to_path_buf()).into());
        }
    }
    Ok(())
}

fn build_model(
    run: &TrainRun,
    num_classes: usize,
    device: &<ADBackend as Backend>::Device,
) -> Result<(Detector<ADBackend>, DetectorConfig, usize)> {
    match &run.model {
        ModelRef::Preset(scale) => {
            let cfg = scale.config(num_classes);
            cfg.validate()?;
            info!(model = %scale, queries = cfg.num_queries, "initialized preset");
            Ok((Detector::new(cfg, device), cfg, 0))
        }
        ModelRef::Checkpoint(path) => {
            let (model, meta) = load_checkpoint::<ADBackend>(path, device)?;
            if meta.config.num_classes != num_classes {
                return Err(TrainingError::invalid_config(format!(
                    "checkpoint {} has {} classes but the dataset has {num_classes}",
                    path.display(),
                    meta.config.num_classes
                )));
            }
            info!(
                checkpoint = %path.display(),
                epoch = meta.epoch,
                "resuming from checkpoint weights"
            );
            Ok((model, meta.config, meta.epoch))
        }
    }
}

fn write_json_line(path: &Path, value: &EpochMetrics) -> Result<()> {
    let line = serde_json::to_string(value).map_err(|source| TrainingError::Serialize {
        what: "epoch metrics",
        source,
    })?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| TrainingError::io(path, e))?;
    writeln!(file, "{line}").map_err(|e| TrainingError::io(path, e))
}

fn tensor_vec<B: Backend, const D: usize>(t: burn::tensor::Tensor<B, D>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap_or_default()
}

struct ValReport {
    loss: f32,
    counts: DetectionCounts,
}

fn validate(
    model: &Detector<TrainBackend>,
    val: &DetectionDataset,
    run: &TrainRun,
    matcher: &Matcher,
    pool: &rayon::ThreadPool,
    device: &<TrainBackend as Backend>::Device,
) -> Result<ValReport> {
    let q = model.num_queries();
    let c = model.num_classes();
    let mut loss_sum = 0.0f32;
    let mut batches = 0usize;
    let mut counts = DetectionCounts::default();
    for chunk in val.samples().chunks(run.batch) {
        let batch = pool.install(|| {
            collate::<TrainBackend>(chunk, val.num_classes, run.imgsz, &[], device)
        })?;
        let (boxes, logits) = model.forward(batch.images);
        let boxes_flat = tensor_vec(boxes.clone());
        let logits_flat = tensor_vec(logits.clone());
        let assignments = matcher.match_batch(&boxes_flat, &logits_flat, q, &batch.targets);
        let targets = build_targets::<TrainBackend>(&assignments, &batch.targets, q, c, device);
        let loss = detection_loss(boxes, logits, &targets, &run.matcher, &run.loss_gains);
        loss_sum += loss.values().total;
        batches += 1;

        for (b, t) in batch.targets.iter().enumerate() {
            let preds: Vec<([f32; 4], usize)> = decode_queries(
                &boxes_flat[b * q * 4..(b + 1) * q * 4],
                &logits_flat[b * q * c..(b + 1) * q * c],
                q,
                c,
                VAL_CONF,
            )
            .into_iter()
            .map(|d| (cxcywh_to_xyxy(d.bbox_cxcywh), d.class_id))
            .collect();
            let gts: Vec<([f32; 4], usize)> = t
                .boxes
                .iter()
                .zip(&t.classes)
                .map(|(bx, &cls)| (cxcywh_to_xyxy(*bx), cls))
                .collect();
            counts.merge(DetectionCounts::from_image(&preds, &gts, VAL_IOU));
        }
    }
    Ok(ValReport {
        loss: if batches == 0 {
            f32::NAN
        } else {
            loss_sum / batches as f32
        },
        counts,
    })
}

/// Train per `run`, writing `args.json`, `results.jsonl`, and `weights/{last,best}.bin`
/// into a fresh `<project>/<name>N` directory.
pub fn run_train(run: &TrainRun) -> Result<TrainOutcome> {
    preflight(run)?;

    let descriptor = DatasetDescriptor::load(&run.data)?;
    let names = descriptor.class_names();
    let num_classes = names.len();
    let mut train = DetectionDataset::from_descriptor(&descriptor, Split::Train)?
        .ok_or(TrainingError::EmptySplit(Split::Train))?;
    train.drop_corrupt_labels();
    if train.is_empty() {
        return Err(TrainingError::EmptySplit(Split::Train));
    }
    let val = match DetectionDataset::from_descriptor(&descriptor, Split::Val)? {
        Some(mut v) => {
            v.drop_corrupt_labels();
            if v.is_empty() {
                warn!("val split is empty; selecting checkpoints by training loss");
                None
            } else {
                Some(v)
            }
        }
        None => None,
    };

    let device = <ADBackend as Backend>::Device::default();
    let (mut model, model_config, start_epoch) = build_model(run, num_classes, &device)?;
    let num_queries = model.num_queries();

    let run_dir = increment_run_dir(&run.project, &run.name)
        .map_err(|e| TrainingError::io(&run.project, e))?;
    let weights_dir = run_dir.join("weights");
    fs::create_dir_all(&weights_dir).map_err(|e| TrainingError::io(&weights_dir, e))?;
    let args_path = run_dir.join("args.json");
    let args_json = serde_json::to_string_pretty(run).map_err(|source| TrainingError::Serialize {
        what: "run arguments",
        source,
    })?;
    fs::write(&args_path, args_json).map_err(|e| TrainingError::io(&args_path, e))?;
    let results_path = run_dir.join("results.jsonl");
    let last_path = weights_dir.join("last.bin");
    let best_path = weights_dir.join("best.bin");

    info!(
        run_dir = %run_dir.display(),
        train_images = train.len(),
        val_images = val.as_ref().map_or(0, DetectionDataset::len),
        classes = num_classes,
        match_type = %run.match_type,
        "starting training"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(run.workers)
        .build()
        .map_err(|e| TrainingError::invalid_config(format!("worker pool: {e}")))?;
    let matcher = Matcher::new(run.match_type, run.matcher);
    let mut optim = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(run.seed);
    let mut state = TrainingState::default();
    let mut metrics = TrainingMetrics::default();

    let mut order: Vec<usize> = (0..train.len()).collect();
    for epoch in 0..run.epochs {
        state.epoch = epoch;
        let lr = run.lr_schedule.compute_lr(run.lr, epoch, run.epochs);
        order.shuffle(&mut rng);
        let started = Instant::now();

        let mut sum = LossValues::default();
        let mut steps = 0usize;
        for chunk in order.chunks(run.batch) {
            let samples: Vec<_> = chunk.iter().map(|&i| train.samples()[i].clone()).collect();
            let flips: Vec<bool> = samples
                .iter()
                .map(|_| rng.random_bool(f64::from(run.fliplr)))
                .collect();
            let batch = pool.install(|| {
                collate::<ADBackend>(&samples, num_classes, run.imgsz, &flips, &device)
            })?;

            let (pred_boxes, pred_logits) = model.forward(batch.images);
            let assignments = matcher.match_batch(
                &tensor_vec(pred_boxes.clone().detach()),
                &tensor_vec(pred_logits.clone().detach()),
                num_queries,
                &batch.targets,
            );
            let targets = build_targets::<ADBackend>(
                &assignments,
                &batch.targets,
                num_queries,
                num_classes,
                &device,
            );
            let loss = detection_loss(
                pred_boxes,
                pred_logits,
                &targets,
                &run.matcher,
                &run.loss_gains,
            );
            let values = loss.values();
            let grads = GradientsParams::from_grads(loss.total.backward(), &model);
            model = optim.step(f64::from(lr), model, grads);

            sum.total += values.total;
            sum.class += values.class;
            sum.bbox += values.bbox;
            sum.giou += values.giou;
            steps += 1;
            debug!(epoch, step = steps, loss = values.total, "train step");
        }
        let n = steps.max(1) as f32;
        let mean = LossValues {
            total: sum.total / n,
            class: sum.class / n,
            bbox: sum.bbox / n,
            giou: sum.giou / n,
        };
        let mut epoch_metrics = EpochMetrics::new(epoch, mean, lr);
        epoch_metrics.train_time_secs = started.elapsed().as_secs_f32();

        if let Some(val) = &val {
            let started = Instant::now();
            let report = validate(&model.valid(), val, run, &matcher, &pool, &device)?;
            epoch_metrics.val_loss = Some(report.loss);
            epoch_metrics.precision = Some(report.counts.precision());
            epoch_metrics.recall = Some(report.counts.recall());
            epoch_metrics.val_time_secs = Some(started.elapsed().as_secs_f32());
        }

        info!(
            epoch = epoch + 1,
            epochs = run.epochs,
            loss = epoch_metrics.train_loss,
            val_loss = ?epoch_metrics.val_loss,
            precision = ?epoch_metrics.precision,
            recall = ?epoch_metrics.recall,
            lr = lr,
            "epoch done"
        );
        write_json_line(&results_path, &epoch_metrics)?;

        let meta = CheckpointMeta {
            config: model_config,
            names: names.clone(),
            imgsz: run.imgsz,
            epoch: start_epoch + epoch + 1,
        };
        save_checkpoint(&model, &meta, &last_path)?;
        if state.record_loss(epoch_metrics.fitness_loss()) {
            save_checkpoint(&model, &meta, &best_path)?;
        }
        metrics.add_epoch(epoch_metrics);

        if state.should_early_stop(run.patience) {
            let reason = format!("no improvement for {} epochs", run.patience);
            info!(%reason, "stopping early");
            metrics.set_early_stopped(reason);
            break;
        }
    }

    if !checkpoint_exists(&best_path) {
        warn!("no finite loss observed; best.bin is the final model");
        let meta = CheckpointMeta {
            config: model_config,
            names,
            imgsz: run.imgsz,
            epoch: start_epoch + metrics.epochs_completed(),
        };
        save_checkpoint(&model, &meta, &best_path)?;
    }

    info!("training finished\n{}", metrics.summary());
    Ok(TrainOutcome {
        run_dir,
        best: best_path,
        last: last_path,
        metrics,
    })
}
