//! Epoch metrics, run summary, early-stopping state, and detection counts.

use serde::{Deserialize, Serialize};

use crate::loss::LossValues;
use crate::matching::greedy_iou_pairs;

/// One line of `results.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_class_loss: f32,
    pub train_bbox_loss: f32,
    pub train_giou_loss: f32,
    pub val_loss: Option<f32>,
    pub precision: Option<f32>,
    pub recall: Option<f32>,
    pub learning_rate: f32,
    pub train_time_secs: f32,
    pub val_time_secs: Option<f32>,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train: LossValues, learning_rate: f32) -> Self {
        Self {
            epoch,
            train_loss: train.total,
            train_class_loss: train.class,
            train_bbox_loss: train.bbox,
            train_giou_loss: train.giou,
            val_loss: None,
            precision: None,
            recall: None,
            learning_rate,
            train_time_secs: 0.0,
            val_time_secs: None,
        }
    }

    /// Loss used for best-checkpoint selection: validation if available, else training.
    pub fn fitness_loss(&self) -> f32 {
        self.val_loss.unwrap_or(self.train_loss)
    }

    pub fn total_time_secs(&self) -> f32 {
        self.train_time_secs + self.val_time_secs.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epoch_metrics: Vec<EpochMetrics>,
    pub best_loss: Option<f32>,
    pub best_epoch: Option<usize>,
    pub total_time_secs: f32,
    pub early_stopped: bool,
    pub stop_reason: Option<String>,
}

impl TrainingMetrics {
    pub fn add_epoch(&mut self, metrics: EpochMetrics) {
        let loss = metrics.fitness_loss();
        if loss.is_finite() && self.best_loss.map_or(true, |best| loss < best) {
            self.best_loss = Some(loss);
            self.best_epoch = Some(metrics.epoch);
        }
        self.total_time_secs += metrics.total_time_secs();
        self.epoch_metrics.push(metrics);
    }

    pub fn epochs_completed(&self) -> usize {
        self.epoch_metrics.len()
    }

    pub fn initial_loss(&self) -> f32 {
        self.epoch_metrics.first().map_or(f32::NAN, |m| m.train_loss)
    }

    pub fn final_loss(&self) -> f32 {
        self.epoch_metrics.last().map_or(f32::NAN, |m| m.train_loss)
    }

    pub fn set_early_stopped(&mut self, reason: impl Into<String>) {
        self.early_stopped = true;
        self.stop_reason = Some(reason.into());
    }

    pub fn summary(&self) -> String {
        use std::fmt::Write;

        let mut s = String::new();
        let _ = writeln!(s, "epochs completed: {}", self.epochs_completed());
        let _ = writeln!(s, "total time: {:.1}s", self.total_time_secs);
        let _ = writeln!(
            s,
            "train loss: {:.4} -> {:.4}",
            self.initial_loss(),
            self.final_loss()
        );
        if let (Some(best), Some(epoch)) = (self.best_loss, self.best_epoch) {
            let _ = writeln!(s, "best loss: {best:.4} (epoch {epoch})");
        }
        if let Some(last) = self.epoch_metrics.last() {
            if let (Some(p), Some(r)) = (last.precision, last.recall) {
                let _ = writeln!(s, "final precision {p:.3} recall {r:.3}");
            }
        }
        if self.early_stopped {
            let _ = writeln!(
                s,
                "early stopped: {}",
                self.stop_reason.as_deref().unwrap_or("yes")
            );
        }
        s
    }
}

/// Best-loss tracking for checkpoint selection and early stopping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingState {
    pub epoch: usize,
    pub best_loss: Option<f32>,
    pub epochs_without_improvement: usize,
}

impl TrainingState {
    /// Returns `true` when `loss` beats the best so far.
    pub fn record_loss(&mut self, loss: f32) -> bool {
        let improved = loss.is_finite() && self.best_loss.map_or(true, |best| loss < best);
        if improved {
            self.best_loss = Some(loss);
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;
        }
        improved
    }

    pub fn should_early_stop(&self, patience: usize) -> bool {
        patience > 0 && self.epochs_without_improvement >= patience
    }
}

/// True/false positive counts at a fixed IoU threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub num_gt: usize,
}

impl DetectionCounts {
    /// Class-aware greedy matching of xyxy boxes.
    pub fn from_image(
        preds: &[([f32; 4], usize)],
        gts: &[([f32; 4], usize)],
        iou_thresh: f32,
    ) -> Self {
        let mut classes: Vec<usize> = preds.iter().chain(gts).map(|(_, c)| *c).collect();
        classes.sort_unstable();
        classes.dedup();
        let mut tp = 0;
        for cls in classes {
            let p: Vec<[f32; 4]> = preds.iter().filter(|d| d.1 == cls).map(|d| d.0).collect();
            let g: Vec<[f32; 4]> = gts.iter().filter(|d| d.1 == cls).map(|d| d.0).collect();
            tp += greedy_iou_pairs(&p, &g, iou_thresh).len();
        }
        Self {
            true_positives: tp,
            false_positives: preds.len() - tp,
            num_gt: gts.len(),
        }
    }

    pub fn merge(&mut self, other: DetectionCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.num_gt += other.num_gt;
    }

    pub fn precision(&self) -> f32 {
        let predicted = self.true_positives + self.false_positives;
        if predicted == 0 {
            0.0
        } else {
            self.true_positives as f32 / predicted as f32
        }
    }

    pub fn recall(&self) -> f32 {
        if self.num_gt == 0 {
            0.0
        } else {
            self.true_positives as f32 / self.num_gt as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patience_counts_stale_epochs() {
        let mut state = TrainingState::default();
        assert!(state.record_loss(1.0));
        assert!(!state.record_loss(1.5));
        assert!(!state.record_loss(1.0));
        assert!(state.should_early_stop(2));
        assert!(!state.should_early_stop(0));
        assert!(state.record_loss(0.5));
        assert_eq!(state.epochs_without_improvement, 0);
    }

    #[test]
    fn nan_loss_never_improves() {
        let mut state = TrainingState::default();
        assert!(!state.record_loss(f32::NAN));
        assert!(state.best_loss.is_none());
    }

    #[test]
    fn counts_are_class_aware() {
        let gts = [([0.1, 0.1, 0.4, 0.4], 0), ([0.5, 0.5, 0.9, 0.9], 1)];
        let preds = [
            ([0.1, 0.1, 0.4, 0.4], 0),
            ([0.5, 0.5, 0.9, 0.9], 0),
        ];
        let c = DetectionCounts::from_image(&preds, &gts, 0.5);
        assert_eq!(c.true_positives, 1);
        assert_eq!(c.false_positives, 1);
        assert_eq!(c.precision(), 0.5);
        assert_eq!(c.recall(), 0.5);
    }

    #[test]
    fn best_epoch_tracks_fitness() {
        let mut m = TrainingMetrics::default();
        let mut e0 = EpochMetrics::new(0, LossValues { total: 2.0, ..Default::default() }, 1e-3);
        e0.val_loss = Some(1.5);
        let mut e1 = EpochMetrics::new(1, LossValues { total: 1.0, ..Default::default() }, 1e-3);
        e1.val_loss = Some(1.7);
        m.add_epoch(e0);
        m.add_epoch(e1);
        assert_eq!(m.best_epoch, Some(0));
        assert!(m.summary().contains("epochs completed: 2"));
    }
}
