use std::fmt;
use std::str::FromStr;

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Spatial grid the backbone is pooled down to before the MLP.
const POOL_GRID: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub base_channels: usize,
    /// Number of stride-2 conv stages.
    pub stages: usize,
    pub hidden: usize,
    /// Hidden MLP blocks after the stem.
    pub depth: usize,
    pub num_queries: usize,
    pub num_classes: usize,
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.base_channels == 0
            || self.stages == 0
            || self.hidden == 0
            || self.num_queries == 0
            || self.num_classes == 0
        {
            return Err(ModelError::invalid_config(format!("{self:?}")));
        }
        Ok(())
    }

    fn stage_channels(&self, stage: usize) -> usize {
        self.base_channels << stage.min(3)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorScale::Nano.config(1)
    }
}

/// Preset sizes, addressed by short names (`det-n`, `det-s`, `det-m`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectorScale {
    Nano,
    Small,
    Medium,
}

impl DetectorScale {
    pub const ALL: [DetectorScale; 3] = [Self::Nano, Self::Small, Self::Medium];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Nano => "det-n",
            Self::Small => "det-s",
            Self::Medium => "det-m",
        }
    }

    pub fn config(&self, num_classes: usize) -> DetectorConfig {
        let (base_channels, stages, hidden, depth, num_queries) = match self {
            Self::Nano => (16, 4, 128, 1, 50),
            Self::Small => (32, 4, 256, 2, 100),
            Self::Medium => (48, 5, 384, 2, 100),
        };
        DetectorConfig {
            base_channels,
            stages,
            hidden,
            depth,
            num_queries,
            num_classes,
        }
    }
}

impl fmt::Display for DetectorScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DetectorScale {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scale| scale.name() == s)
            .ok_or_else(|| ModelError::invalid_config(format!("unknown preset {s:?}")))
    }
}

/// Set-prediction detector: strided conv backbone, pooled MLP, box + class heads.
///
/// Output per image is a fixed set of `num_queries` slots; training assigns
/// ground truth to slots by bipartite matching.
#[derive(Debug, Module)]
pub struct Detector<B: Backend> {
    stages: Vec<Conv2d<B>>,
    pool: AdaptiveAvgPool2d,
    stem: nn::Linear<B>,
    blocks: Vec<nn::Linear<B>>,
    box_head: nn::Linear<B>,
    class_head: nn::Linear<B>,
    num_queries: usize,
    num_classes: usize,
}

impl<B: Backend> Detector<B> {
    pub fn new(cfg: DetectorConfig, device: &B::Device) -> Self {
        let mut stages = Vec::with_capacity(cfg.stages);
        let mut in_ch = 3;
        for s in 0..cfg.stages {
            let out_ch = cfg.stage_channels(s);
            stages.push(
                Conv2dConfig::new([in_ch, out_ch], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            );
            in_ch = out_ch;
        }
        let pool = AdaptiveAvgPool2dConfig::new([POOL_GRID, POOL_GRID]).init();
        let stem = nn::LinearConfig::new(in_ch * POOL_GRID * POOL_GRID, cfg.hidden).init(device);
        let blocks = (0..cfg.depth)
            .map(|_| nn::LinearConfig::new(cfg.hidden, cfg.hidden).init(device))
            .collect();
        let box_head = nn::LinearConfig::new(cfg.hidden, cfg.num_queries * 4).init(device);
        let class_head =
            nn::LinearConfig::new(cfg.hidden, cfg.num_queries * cfg.num_classes).init(device);
        Self {
            stages,
            pool,
            stem,
            blocks,
            box_head,
            class_head,
            num_queries: cfg.num_queries,
            num_classes: cfg.num_classes,
        }
    }

    pub fn num_queries(&self) -> usize {
        self.num_queries
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// `images` is `[B, 3, H, W]` in 0..1.
    ///
    /// Returns `(boxes [B, Q, 4]` cxcywh in 0..1`, class_logits [B, Q, C])`.
    pub fn forward(&self, images: Tensor<B, 4>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let batch = images.dims()[0];
        let mut x = images;
        for conv in &self.stages {
            x = relu(conv.forward(x));
        }
        let x: Tensor<B, 2> = self.pool.forward(x).flatten(1, 3);
        let mut x = relu(self.stem.forward(x));
        for block in &self.blocks {
            x = relu(block.forward(x));
        }
        let boxes = sigmoid(self.box_head.forward(x.clone())).reshape([
            batch,
            self.num_queries,
            4,
        ]);
        let logits = self
            .class_head
            .forward(x)
            .reshape([batch, self.num_queries, self.num_classes]);
        (boxes, logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn forward_shapes_follow_config() {
        let device = Default::default();
        let cfg = DetectorScale::Nano.config(3);
        let model = Detector::<B>::new(cfg, &device);
        let images = Tensor::<B, 4>::zeros([2, 3, 32, 48], &device);
        let (boxes, logits) = model.forward(images);
        assert_eq!(boxes.dims(), [2, cfg.num_queries, 4]);
        assert_eq!(logits.dims(), [2, cfg.num_queries, 3]);
    }

    #[test]
    fn preset_names_parse() {
        for scale in DetectorScale::ALL {
            assert_eq!(scale.name().parse::<DetectorScale>().unwrap(), scale);
        }
        assert!("det-x".parse::<DetectorScale>().is_err());
    }

    #[test]
    fn zero_classes_rejected() {
        assert!(DetectorScale::Small.config(0).validate().is_err());
    }
}
