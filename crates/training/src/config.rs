//! Run configuration: matcher weights, loss gains, learning-rate schedule, and
//! the fully-resolved `TrainRun` handed to the trainer.

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use models::ModelRef;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EPOCHS: usize = 300;
pub const DEFAULT_IMGSZ: u32 = 640;
pub const DEFAULT_BATCH: usize = 16;
pub const DEFAULT_LR: f32 = 1e-3;
pub const DEFAULT_PATIENCE: usize = 100;
pub const DEFAULT_FLIPLR: f32 = 0.5;
pub const DEFAULT_RUN_NAME: &str = "train";

/// Weights of the bipartite-matching cost.
///
/// `C = cost_bbox * L1 + cost_class * class + cost_giou * (-GIoU)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub cost_class: f32,
    pub cost_bbox: f32,
    pub cost_giou: f32,
    /// Focal class cost instead of plain `-p`.
    pub use_focal: bool,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    #[serde(default = "default_gamma")]
    pub gamma: f32,
}

fn default_alpha() -> f32 {
    0.25
}

fn default_gamma() -> f32 {
    2.0
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            cost_class: 1.0,
            cost_bbox: 5.0,
            cost_giou: 2.0,
            use_focal: true,
            alpha: default_alpha(),
            gamma: default_gamma(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Optimal one-to-one assignment on the full matching cost.
    Hungarian,
    /// Highest-IoU-first assignment.
    Greedy,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchType::Hungarian => "hungarian",
            MatchType::Greedy => "greedy",
        })
    }
}

/// Per-term weights of the training loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossGains {
    pub class: f32,
    pub bbox: f32,
    pub giou: f32,
}

impl Default for LossGains {
    fn default() -> Self {
        Self {
            class: 1.0,
            bbox: 5.0,
            giou: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningRateSchedule {
    #[default]
    Constant,
    Cosine {
        /// Final LR as a fraction of the base LR.
        final_frac: f32,
    },
    WarmupCosine {
        warmup_epochs: usize,
        final_frac: f32,
    },
}

impl LearningRateSchedule {
    pub fn compute_lr(&self, base_lr: f32, epoch: usize, total_epochs: usize) -> f32 {
        let cosine = |progress: f32, final_frac: f32| {
            let min_lr = base_lr * final_frac;
            let c = (std::f32::consts::PI * progress.clamp(0.0, 1.0)).cos();
            min_lr + (base_lr - min_lr) * (1.0 + c) / 2.0
        };
        match *self {
            Self::Constant => base_lr,
            Self::Cosine { final_frac } => {
                cosine(epoch as f32 / total_epochs.max(1) as f32, final_frac)
            }
            Self::WarmupCosine {
                warmup_epochs,
                final_frac,
            } => {
                if epoch < warmup_epochs {
                    base_lr * (epoch + 1) as f32 / warmup_epochs as f32
                } else {
                    let remaining = total_epochs.saturating_sub(warmup_epochs).max(1);
                    cosine((epoch - warmup_epochs) as f32 / remaining as f32, final_frac)
                }
            }
        }
    }
}

/// CLI-selectable schedule shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScheduleKind {
    Constant,
    Cosine,
    WarmupCosine,
}

impl ScheduleKind {
    pub fn schedule(self) -> LearningRateSchedule {
        match self {
            ScheduleKind::Constant => LearningRateSchedule::Constant,
            ScheduleKind::Cosine => LearningRateSchedule::Cosine { final_frac: 0.01 },
            ScheduleKind::WarmupCosine => LearningRateSchedule::WarmupCosine {
                warmup_epochs: 3,
                final_frac: 0.01,
            },
        }
    }
}

/// Everything one training run needs, resolved from flags, config file, and defaults.
///
/// Serialized verbatim to `<run_dir>/args.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRun {
    pub model: ModelRef,
    pub data: PathBuf,
    pub project: PathBuf,
    pub name: String,
    pub epochs: usize,
    pub imgsz: u32,
    pub batch: usize,
    pub lr: f32,
    pub lr_schedule: LearningRateSchedule,
    /// Epochs without validation improvement before stopping; 0 disables.
    pub patience: usize,
    pub seed: u64,
    pub match_type: MatchType,
    pub matcher: MatcherConfig,
    pub loss_gains: LossGains,
    /// Probability of a horizontal flip per training image.
    pub fliplr: f32,
    /// Image-loading threads; 0 uses the rayon default.
    pub workers: usize,
}

impl TrainRun {
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |reason: &str| -> crate::Result<()> {
            Err(crate::TrainingError::invalid_config(reason))
        };
        if self.epochs == 0 {
            return invalid("epochs must be > 0");
        }
        if self.imgsz < 32 {
            return invalid("imgsz must be >= 32");
        }
        if self.batch == 0 {
            return invalid("batch must be > 0");
        }
        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return invalid("lr must be a positive number");
        }
        if !(0.0..=1.0).contains(&self.fliplr) {
            return invalid("fliplr must be in [0, 1]");
        }
        if self.name.trim().is_empty() {
            return invalid("run name is empty");
        }
        Ok(())
    }
}
