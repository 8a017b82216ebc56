#![recursion_limit = "256"]

pub mod config;
pub mod dataset;
pub mod error;
pub mod loss;
pub mod matching;
pub mod metrics;
pub mod util;

pub use config::{
    LearningRateSchedule, LossGains, MatchType, MatcherConfig, ScheduleKind, TrainRun,
};
pub use dataset::{collate, CollatedBatch, DetectionDataset, ImageTargets};
pub use error::{Result, TrainingError};
pub use loss::{build_targets, detection_loss, DetectionLoss, LossValues, MatchedTargets};
pub use matching::{greedy_iou_pairs, linear_sum_assignment, Assignment, HungarianMatcher, Matcher};
pub use metrics::{DetectionCounts, EpochMetrics, TrainingMetrics, TrainingState};
pub use util::{run_train, validate_backend_choice, BackendKind, TrainArgs, TrainOutcome};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
