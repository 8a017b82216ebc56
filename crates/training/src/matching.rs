//! Prediction-to-ground-truth assignment for set-prediction training.
//!
//! The Hungarian matcher builds a `Q x G` cost from class probability, L1 box
//! distance, and GIoU, then solves the rectangular assignment exactly. The
//! greedy matcher takes pairs in descending IoU order.

use data_contracts::{cxcywh_to_xyxy, giou_xyxy, iou_xyxy};

use crate::config::{MatchType, MatcherConfig};
use crate::dataset::ImageTargets;

const EPS: f32 = 1e-8;

/// Assignment of prediction slot to ground-truth index, sorted by prediction slot.
pub type Assignment = Vec<(usize, usize)>;

#[derive(Debug, Clone)]
pub struct HungarianMatcher {
    cfg: MatcherConfig,
}

impl HungarianMatcher {
    pub fn new(cfg: MatcherConfig) -> Self {
        Self { cfg }
    }

    fn sigmoid(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    fn class_cost(&self, logit: f32) -> f32 {
        let p = Self::sigmoid(logit);
        if self.cfg.use_focal {
            let (alpha, gamma) = (self.cfg.alpha, self.cfg.gamma);
            let pos = alpha * (1.0 - p).powf(gamma) * -(p + EPS).ln();
            let neg = (1.0 - alpha) * p.powf(gamma) * -(1.0 - p + EPS).ln();
            pos - neg
        } else {
            -p
        }
    }

    /// Row-major `Q x G` matching cost. Non-finite entries are replaced by 0.
    ///
    /// `pred_logits` is `Q * C` raw logits; boxes are cxcywh.
    pub fn cost_matrix(
        &self,
        pred_boxes: &[[f32; 4]],
        pred_logits: &[f32],
        gt_boxes: &[[f32; 4]],
        gt_classes: &[usize],
    ) -> Vec<Vec<f32>> {
        let q = pred_boxes.len();
        let num_classes = if q == 0 { 0 } else { pred_logits.len() / q };
        let gt_xyxy: Vec<[f32; 4]> = gt_boxes.iter().copied().map(cxcywh_to_xyxy).collect();
        pred_boxes
            .iter()
            .enumerate()
            .map(|(qi, pb)| {
                let pb_xyxy = cxcywh_to_xyxy(*pb);
                gt_boxes
                    .iter()
                    .zip(&gt_xyxy)
                    .zip(gt_classes)
                    .map(|((gb, gb_xyxy), &cls)| {
                        let logit = if cls < num_classes {
                            pred_logits[qi * num_classes + cls]
                        } else {
                            f32::NEG_INFINITY
                        };
                        let l1: f32 = pb.iter().zip(gb).map(|(a, b)| (a - b).abs()).sum();
                        let giou = giou_xyxy(pb_xyxy, *gb_xyxy);
                        let c = self.cfg.cost_bbox * l1
                            + self.cfg.cost_class * self.class_cost(logit)
                            - self.cfg.cost_giou * giou;
                        if c.is_finite() {
                            c
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Optimal one-to-one assignment of length `min(Q, G)`.
    pub fn match_image(
        &self,
        pred_boxes: &[[f32; 4]],
        pred_logits: &[f32],
        gt_boxes: &[[f32; 4]],
        gt_classes: &[usize],
    ) -> Assignment {
        if pred_boxes.is_empty() || gt_boxes.is_empty() {
            return Vec::new();
        }
        let cost = self.cost_matrix(pred_boxes, pred_logits, gt_boxes, gt_classes);
        linear_sum_assignment(&cost)
    }
}

/// Minimum-cost assignment on a rectangular matrix (Kuhn-Munkres with potentials).
///
/// Returns `min(rows, cols)` `(row, col)` pairs sorted by row.
pub fn linear_sum_assignment(cost: &[Vec<f32>]) -> Assignment {
    let rows = cost.len();
    let cols = cost.first().map_or(0, Vec::len);
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    if rows > cols {
        let transposed: Vec<Vec<f32>> = (0..cols)
            .map(|c| (0..rows).map(|r| cost[r][c]).collect())
            .collect();
        let mut pairs: Assignment = linear_sum_assignment(&transposed)
            .into_iter()
            .map(|(c, r)| (r, c))
            .collect();
        pairs.sort_unstable();
        return pairs;
    }

    // rows <= cols; 1-based indices, column 0 is the virtual start.
    let (n, m) = (rows, cols);
    let a = |i: usize, j: usize| -> f64 {
        let v = f64::from(cost[i - 1][j - 1]);
        if v.is_finite() {
            v
        } else {
            0.0
        }
    };
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];
    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = a(i0, j) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }
    let mut pairs: Assignment = (1..=m)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Pairs in descending IoU order, each index used once, IoU >= `min_iou`.
///
/// Boxes are xyxy. Returns `(pred, gt, iou)` in assignment order.
pub fn greedy_iou_pairs(
    preds: &[[f32; 4]],
    gts: &[[f32; 4]],
    min_iou: f32,
) -> Vec<(usize, usize, f32)> {
    let mut candidates: Vec<(usize, usize, f32)> = Vec::with_capacity(preds.len() * gts.len());
    for (pi, pb) in preds.iter().enumerate() {
        for (gi, gb) in gts.iter().enumerate() {
            let iou = iou_xyxy(*pb, *gb);
            if iou >= min_iou {
                candidates.push((pi, gi, iou));
            }
        }
    }
    candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut pred_used = vec![false; preds.len()];
    let mut gt_used = vec![false; gts.len()];
    let mut out = Vec::new();
    for (pi, gi, iou) in candidates {
        if !pred_used[pi] && !gt_used[gi] {
            pred_used[pi] = true;
            gt_used[gi] = true;
            out.push((pi, gi, iou));
        }
    }
    out
}

/// Strategy selected by `match_type`, applied per image.
#[derive(Debug, Clone)]
pub struct Matcher {
    match_type: MatchType,
    hungarian: HungarianMatcher,
}

impl Matcher {
    pub fn new(match_type: MatchType, cfg: MatcherConfig) -> Self {
        Self {
            match_type,
            hungarian: HungarianMatcher::new(cfg),
        }
    }

    pub fn match_image(
        &self,
        pred_boxes: &[[f32; 4]],
        pred_logits: &[f32],
        targets: &ImageTargets,
    ) -> Assignment {
        match self.match_type {
            MatchType::Hungarian => self.hungarian.match_image(
                pred_boxes,
                pred_logits,
                &targets.boxes,
                &targets.classes,
            ),
            MatchType::Greedy => {
                let preds: Vec<[f32; 4]> =
                    pred_boxes.iter().copied().map(cxcywh_to_xyxy).collect();
                let gts: Vec<[f32; 4]> =
                    targets.boxes.iter().copied().map(cxcywh_to_xyxy).collect();
                let mut pairs: Assignment = greedy_iou_pairs(&preds, &gts, 0.0)
                    .into_iter()
                    .map(|(p, g, _)| (p, g))
                    .collect();
                pairs.sort_unstable();
                pairs
            }
        }
    }

    /// `pred_boxes` is `[B * Q * 4]`, `pred_logits` is `[B * Q * C]`, both flat row-major.
    pub fn match_batch(
        &self,
        pred_boxes: &[f32],
        pred_logits: &[f32],
        num_queries: usize,
        targets: &[ImageTargets],
    ) -> Vec<Assignment> {
        let batch = targets.len();
        if batch == 0 || num_queries == 0 {
            return vec![Vec::new(); batch];
        }
        let num_classes = pred_logits.len() / (batch * num_queries);
        targets
            .iter()
            .enumerate()
            .map(|(b, t)| {
                let boxes: Vec<[f32; 4]> = pred_boxes
                    [b * num_queries * 4..(b + 1) * num_queries * 4]
                    .chunks_exact(4)
                    .map(|c| [c[0], c[1], c[2], c[3]])
                    .collect();
                let logits = &pred_logits
                    [b * num_queries * num_classes..(b + 1) * num_queries * num_classes];
                self.match_image(&boxes, logits, t)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_min(cost: &[Vec<f32>]) -> f32 {
        fn go(cost: &[Vec<f32>], row: usize, used: &mut Vec<bool>, acc: f32, best: &mut f32) {
            if row == cost.len() {
                *best = best.min(acc);
                return;
            }
            for c in 0..used.len() {
                if !used[c] {
                    used[c] = true;
                    go(cost, row + 1, used, acc + cost[row][c], best);
                    used[c] = false;
                }
            }
        }
        let mut best = f32::INFINITY;
        let cols = cost[0].len();
        go(cost, 0, &mut vec![false; cols], 0.0, &mut best);
        best
    }

    fn total(cost: &[Vec<f32>], pairs: &Assignment) -> f32 {
        pairs.iter().map(|&(r, c)| cost[r][c]).sum()
    }

    fn lcg_matrix(rows: usize, cols: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut s = seed;
        (0..rows)
            .map(|_| {
                (0..cols)
                    .map(|_| {
                        s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                        ((s >> 33) % 1000) as f32 / 100.0
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn square_assignment_is_optimal() {
        let cost = vec![
            vec![4.0, 1.0, 3.0],
            vec![2.0, 0.0, 5.0],
            vec![3.0, 2.0, 2.0],
        ];
        let pairs = linear_sum_assignment(&cost);
        assert_eq!(pairs, vec![(0, 1), (1, 0), (2, 2)]);
        assert_eq!(total(&cost, &pairs), 5.0);
    }

    #[test]
    fn matches_brute_force_on_random_square() {
        for seed in 0..20 {
            let cost = lcg_matrix(5, 5, seed);
            let pairs = linear_sum_assignment(&cost);
            assert_eq!(pairs.len(), 5);
            assert!((total(&cost, &pairs) - brute_force_min(&cost)).abs() < 1e-3);
        }
    }

    #[test]
    fn wide_matrix_uses_every_row() {
        for seed in 0..10 {
            let cost = lcg_matrix(3, 6, seed);
            let pairs = linear_sum_assignment(&cost);
            assert_eq!(pairs.len(), 3);
            assert!((total(&cost, &pairs) - brute_force_min(&cost)).abs() < 1e-3);
        }
    }

    #[test]
    fn tall_matrix_is_transposed() {
        for seed in 0..10 {
            let cost = lcg_matrix(6, 2, seed);
            let pairs = linear_sum_assignment(&cost);
            assert_eq!(pairs.len(), 2);
            let mut cols: Vec<usize> = pairs.iter().map(|p| p.1).collect();
            cols.sort_unstable();
            assert_eq!(cols, vec![0, 1]);
            let transposed: Vec<Vec<f32>> =
                (0..2).map(|c| (0..6).map(|r| cost[r][c]).collect()).collect();
            assert!((total(&cost, &pairs) - brute_force_min(&transposed)).abs() < 1e-3);
        }
    }

    #[test]
    fn empty_inputs_give_empty_assignment() {
        assert!(linear_sum_assignment(&[]).is_empty());
        assert!(linear_sum_assignment(&[vec![], vec![]]).is_empty());
        let m = HungarianMatcher::new(MatcherConfig::default());
        assert!(m.match_image(&[[0.5; 4]], &[0.0], &[], &[]).is_empty());
    }

    #[test]
    fn matcher_prefers_overlapping_confident_slot() {
        let m = HungarianMatcher::new(MatcherConfig::default());
        // Slot 0 far away, slot 1 on top of the target.
        let preds = [[0.1, 0.1, 0.1, 0.1], [0.7, 0.7, 0.2, 0.2]];
        let logits = [0.0, 0.0, 0.0, 3.0];
        let pairs = m.match_image(&preds, &logits, &[[0.7, 0.7, 0.2, 0.2]], &[1]);
        assert_eq!(pairs, vec![(1, 0)]);
    }

    #[test]
    fn focal_class_cost_matches_closed_form() {
        let m = HungarianMatcher::new(MatcherConfig::default());
        // p = 0.5: 0.25 * 0.25 * ln2 - 0.75 * 0.25 * ln2
        let expected = -0.125 * std::f32::consts::LN_2;
        assert!((m.class_cost(0.0) - expected).abs() < 1e-5);

        let p = 1.0 / (1.0 + (-2.0f32).exp());
        let pos = 0.25 * (1.0 - p).powi(2) * -p.ln();
        let neg = 0.75 * p.powi(2) * -(1.0 - p).ln();
        assert!((m.class_cost(2.0) - (pos - neg)).abs() < 1e-5);
        assert!(m.class_cost(2.0) < m.class_cost(-2.0));
    }

    #[test]
    fn plain_class_cost_is_negative_probability() {
        let m = HungarianMatcher::new(MatcherConfig {
            use_focal: false,
            ..MatcherConfig::default()
        });
        assert!((m.class_cost(0.0) + 0.5).abs() < 1e-6);
        assert!((m.class_cost(2.0) + 0.880_797).abs() < 1e-5);
    }

    #[test]
    fn nan_costs_become_zero() {
        let m = HungarianMatcher::new(MatcherConfig::default());
        let cost = m.cost_matrix(&[[f32::NAN; 4]], &[0.0], &[[0.5, 0.5, 0.1, 0.1]], &[0]);
        assert_eq!(cost[0][0], 0.0);
    }

    #[test]
    fn greedy_takes_best_iou_first() {
        let preds = [[0.0, 0.0, 0.5, 0.5], [0.1, 0.1, 0.6, 0.6]];
        let gts = [[0.1, 0.1, 0.6, 0.6]];
        let pairs = greedy_iou_pairs(&preds, &gts, 0.5);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].0, pairs[0].1), (1, 0));
    }
}
