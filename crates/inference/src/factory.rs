use std::time::Instant;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use cli_support::ThresholdOpts;
use data_contracts::cxcywh_to_xyxy;
use models::{decode_queries, load_checkpoint, Detector as DetectorModel, ModelRef};
use tracing::{debug, info, warn};
use vision_core::interfaces::{Detection, DetectionResult, Detector, Frame};
use vision_core::preprocess::letterbox;

use crate::error::{InferenceError, Result};
use crate::postprocess::class_aware_nms;
use crate::InferenceBackend;

pub const DEFAULT_MAX_DET: usize = 300;

/// Checkpoint-backed detector: letterbox, forward, decode, NMS, map back.
pub struct BurnDetector {
    model: DetectorModel<InferenceBackend>,
    device: <InferenceBackend as Backend>::Device,
    imgsz: u32,
    conf: f32,
    iou: f32,
    max_det: usize,
}

impl BurnDetector {
    pub fn new(
        model: DetectorModel<InferenceBackend>,
        imgsz: u32,
        thresh: ThresholdOpts,
        max_det: usize,
    ) -> Self {
        Self {
            model,
            device: Default::default(),
            imgsz,
            conf: thresh.conf_thresh,
            iou: thresh.iou_thresh,
            max_det,
        }
    }

    pub fn imgsz(&self) -> u32 {
        self.imgsz
    }
}

impl Detector for BurnDetector {
    fn detect(&mut self, frame: &Frame) -> DetectionResult {
        let Some(img) = frame.to_image() else {
            warn!(frame = frame.id, "frame buffer does not match its size; skipping");
            return DetectionResult {
                frame_id: frame.id,
                ..Default::default()
            };
        };
        let started = Instant::now();
        let boxed = letterbox(&img, self.imgsz);
        let size = self.imgsz as usize;
        let input = Tensor::<InferenceBackend, 4>::from_data(
            TensorData::new(boxed.chw, [1, 3, size, size]),
            &self.device,
        );
        let (boxes, logits) = self.model.forward(input);
        let boxes = boxes.into_data().to_vec::<f32>().unwrap_or_default();
        let logits = logits.into_data().to_vec::<f32>().unwrap_or_default();

        let candidates: Vec<Detection> = decode_queries(
            &boxes,
            &logits,
            self.model.num_queries(),
            self.model.num_classes(),
            self.conf,
        )
        .into_iter()
        .map(|q| Detection {
            bbox_xyxy: cxcywh_to_xyxy(q.bbox_cxcywh),
            score: q.score,
            class_id: q.class_id,
        })
        .collect();
        let num_candidates = candidates.len();

        let detections: Vec<Detection> = class_aware_nms(candidates, self.iou, self.max_det)
            .into_iter()
            .map(|d| Detection {
                bbox_xyxy: boxed.info.from_letterbox(d.bbox_xyxy),
                ..d
            })
            .collect();
        debug!(
            frame = frame.id,
            candidates = num_candidates,
            kept = detections.len(),
            ms = started.elapsed().as_secs_f32() * 1000.0,
            "detect"
        );
        DetectionResult {
            frame_id: frame.id,
            detections,
        }
    }

    fn set_thresholds(&mut self, conf: f32, iou: f32) {
        self.conf = conf;
        self.iou = iou;
    }
}

/// Builds detectors from model references. Only trained checkpoints are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorFactory {
    /// Input size; `None` uses the size stored with the checkpoint.
    pub imgsz: Option<u32>,
    pub max_det: usize,
}

impl Default for PredictorFactory {
    fn default() -> Self {
        Self {
            imgsz: None,
            max_det: DEFAULT_MAX_DET,
        }
    }
}

impl PredictorFactory {
    pub fn build(&self, model: &ModelRef, thresh: ThresholdOpts) -> Result<Box<dyn Detector>> {
        Ok(Box::new(self.build_burn(model, thresh)?))
    }

    pub fn build_burn(&self, model: &ModelRef, thresh: ThresholdOpts) -> Result<BurnDetector> {
        let path = match model {
            ModelRef::Checkpoint(path) => path,
            ModelRef::Preset(scale) => {
                return Err(InferenceError::invalid_config(format!(
                    "{scale} is an untrained preset; predict needs a checkpoint"
                )));
            }
        };
        let device = <InferenceBackend as Backend>::Device::default();
        let (net, meta) = load_checkpoint::<InferenceBackend>(path, &device)?;
        let imgsz = self.imgsz.unwrap_or(meta.imgsz);
        if imgsz == 0 {
            return Err(InferenceError::invalid_config("imgsz must be > 0"));
        }
        info!(
            checkpoint = %path.display(),
            epoch = meta.epoch,
            classes = meta.names.len(),
            imgsz,
            "loaded detector"
        );
        Ok(BurnDetector::new(net, imgsz, thresh, self.max_det))
    }
}
