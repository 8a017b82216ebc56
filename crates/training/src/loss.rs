//! Set-prediction loss: classification on every slot, box terms on matched slots.

use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::config::{LossGains, MatcherConfig};
use crate::dataset::ImageTargets;
use crate::matching::Assignment;

const EPS: f32 = 1e-7;

/// Dense targets built from per-image assignments.
#[derive(Debug, Clone)]
pub struct MatchedTargets<B: Backend> {
    /// One-hot `[B, Q, C]`; unmatched slots are all zeros (background).
    pub classes: Tensor<B, 3>,
    /// `[B, Q, 4]` cxcywh; zeros where unmatched.
    pub boxes: Tensor<B, 3>,
    /// `[B, Q, 1]`, 1.0 on matched slots.
    pub mask: Tensor<B, 3>,
    pub num_gt: usize,
}

pub fn build_targets<B: Backend>(
    assignments: &[Assignment],
    targets: &[ImageTargets],
    num_queries: usize,
    num_classes: usize,
    device: &B::Device,
) -> MatchedTargets<B> {
    let batch = targets.len();
    let mut classes = vec![0.0f32; batch * num_queries * num_classes];
    let mut boxes = vec![0.0f32; batch * num_queries * 4];
    let mut mask = vec![0.0f32; batch * num_queries];
    for (b, (pairs, t)) in assignments.iter().zip(targets).enumerate() {
        for &(q, g) in pairs {
            let slot = b * num_queries + q;
            let cls = t.classes[g];
            if cls < num_classes {
                classes[slot * num_classes + cls] = 1.0;
            }
            boxes[slot * 4..slot * 4 + 4].copy_from_slice(&t.boxes[g]);
            mask[slot] = 1.0;
        }
    }
    MatchedTargets {
        classes: Tensor::from_data(
            TensorData::new(classes, [batch, num_queries, num_classes]),
            device,
        ),
        boxes: Tensor::from_data(TensorData::new(boxes, [batch, num_queries, 4]), device),
        mask: Tensor::from_data(TensorData::new(mask, [batch, num_queries, 1]), device),
        num_gt: targets.iter().map(ImageTargets::len).sum(),
    }
}

/// Sigmoid focal loss, summed.
pub fn focal_loss<B: Backend>(
    logits: Tensor<B, 3>,
    targets: Tensor<B, 3>,
    alpha: f32,
    gamma: f32,
) -> Tensor<B, 1> {
    let p = sigmoid(logits).clamp(EPS, 1.0 - EPS);
    let ones = Tensor::ones_like(&targets);
    let ce = bce_elementwise(p.clone(), targets.clone());
    let p_t = p.clone() * targets.clone() + (ones.clone() - p) * (ones.clone() - targets.clone());
    let modulating = (ones.clone() - p_t).powf_scalar(gamma);
    let alpha_t = targets.clone().mul_scalar(alpha) + (ones - targets).mul_scalar(1.0 - alpha);
    (alpha_t * modulating * ce).sum()
}

/// Sigmoid binary cross-entropy, summed.
pub fn bce_loss<B: Backend>(logits: Tensor<B, 3>, targets: Tensor<B, 3>) -> Tensor<B, 1> {
    let p = sigmoid(logits).clamp(EPS, 1.0 - EPS);
    bce_elementwise(p, targets).sum()
}

fn bce_elementwise<B: Backend>(p: Tensor<B, 3>, t: Tensor<B, 3>) -> Tensor<B, 3> {
    let ones = Tensor::ones_like(&t);
    -(t.clone() * p.clone().log() + (ones.clone() - t) * (ones - p).log())
}

/// L1 distance on matched slots, summed.
pub fn l1_box_loss<B: Backend>(
    pred: Tensor<B, 3>,
    target: Tensor<B, 3>,
    mask: Tensor<B, 3>,
) -> Tensor<B, 1> {
    ((pred - target).abs() * mask).sum()
}

fn corners<B: Backend>(cxcywh: Tensor<B, 3>) -> [Tensor<B, 3>; 4] {
    let [b, q, _] = cxcywh.dims();
    let cx = cxcywh.clone().slice([0..b, 0..q, 0..1]);
    let cy = cxcywh.clone().slice([0..b, 0..q, 1..2]);
    let hw = cxcywh.clone().slice([0..b, 0..q, 2..3]).mul_scalar(0.5);
    let hh = cxcywh.slice([0..b, 0..q, 3..4]).mul_scalar(0.5);
    [
        cx.clone() - hw.clone(),
        cy.clone() - hh.clone(),
        cx + hw,
        cy + hh,
    ]
}

/// Per-slot GIoU `[B, Q, 1]` between cxcywh boxes.
pub fn giou<B: Backend>(pred: Tensor<B, 3>, target: Tensor<B, 3>) -> Tensor<B, 3> {
    let [px0, py0, px1, py1] = corners(pred);
    let [tx0, ty0, tx1, ty1] = corners(target);

    let inter_w = (px1.clone().min_pair(tx1.clone()) - px0.clone().max_pair(tx0.clone()))
        .clamp_min(0.0);
    let inter_h = (py1.clone().min_pair(ty1.clone()) - py0.clone().max_pair(ty0.clone()))
        .clamp_min(0.0);
    let inter = inter_w * inter_h;

    let area_p = (px1.clone() - px0.clone()) * (py1.clone() - py0.clone());
    let area_t = (tx1.clone() - tx0.clone()) * (ty1.clone() - ty0.clone());
    let union = area_p + area_t - inter.clone();
    let iou = inter / union.clone().add_scalar(EPS);

    let enc_w = px1.max_pair(tx1) - px0.min_pair(tx0);
    let enc_h = py1.max_pair(ty1) - py0.min_pair(ty0);
    let enclosing = (enc_w * enc_h).add_scalar(EPS);
    iou - (enclosing.clone() - union) / enclosing
}

/// `1 - GIoU` on matched slots, summed.
pub fn giou_box_loss<B: Backend>(
    pred: Tensor<B, 3>,
    target: Tensor<B, 3>,
    mask: Tensor<B, 3>,
) -> Tensor<B, 1> {
    let g = giou(pred, target);
    ((Tensor::ones_like(&g) - g) * mask).sum()
}

/// Weighted loss terms, each already divided by `max(num_gt, 1)`.
#[derive(Debug, Clone)]
pub struct DetectionLoss<B: Backend> {
    pub total: Tensor<B, 1>,
    pub class: Tensor<B, 1>,
    pub bbox: Tensor<B, 1>,
    pub giou: Tensor<B, 1>,
}

/// Detached scalar values of a `DetectionLoss`, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossValues {
    pub total: f32,
    pub class: f32,
    pub bbox: f32,
    pub giou: f32,
}

impl<B: Backend> DetectionLoss<B> {
    pub fn values(&self) -> LossValues {
        LossValues {
            total: scalar(self.total.clone()),
            class: scalar(self.class.clone()),
            bbox: scalar(self.bbox.clone()),
            giou: scalar(self.giou.clone()),
        }
    }
}

pub fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(f32::NAN)
}

pub fn detection_loss<B: Backend>(
    pred_boxes: Tensor<B, 3>,
    pred_logits: Tensor<B, 3>,
    targets: &MatchedTargets<B>,
    matcher: &MatcherConfig,
    gains: &LossGains,
) -> DetectionLoss<B> {
    let norm = targets.num_gt.max(1) as f32;
    let class = if matcher.use_focal {
        focal_loss(pred_logits, targets.classes.clone(), matcher.alpha, matcher.gamma)
    } else {
        bce_loss(pred_logits, targets.classes.clone())
    }
    .div_scalar(norm);
    let bbox = l1_box_loss(
        pred_boxes.clone(),
        targets.boxes.clone(),
        targets.mask.clone(),
    )
    .div_scalar(norm);
    let giou = giou_box_loss(pred_boxes, targets.boxes.clone(), targets.mask.clone()).div_scalar(norm);
    let total = class.clone().mul_scalar(gains.class)
        + bbox.clone().mul_scalar(gains.bbox)
        + giou.clone().mul_scalar(gains.giou);
    DetectionLoss {
        total,
        class,
        bbox,
        giou,
    }
}
