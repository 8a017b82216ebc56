use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use data_contracts::{
    cxcywh_to_xyxy, read_label_file, xyxy_to_cxcywh, DatasetDescriptor, Split, SplitSample,
};
use rayon::prelude::*;
use tracing::{debug, warn};
use vision_core::preprocess::letterbox;

use crate::error::{Result, TrainingError};

/// Ground truth of one image in letterbox space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageTargets {
    /// Normalized cxcywh boxes.
    pub boxes: Vec<[f32; 4]>,
    pub classes: Vec<usize>,
}

impl ImageTargets {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CollatedBatch<B: Backend> {
    /// `[batch, 3, imgsz, imgsz]` in 0..1.
    pub images: Tensor<B, 4>,
    pub targets: Vec<ImageTargets>,
}

/// Indexed split of a YOLO dataset.
#[derive(Debug, Clone)]
pub struct DetectionDataset {
    pub split: Split,
    pub num_classes: usize,
    samples: Vec<SplitSample>,
}

impl DetectionDataset {
    /// `None` when the descriptor does not list this split.
    pub fn from_descriptor(desc: &DatasetDescriptor, split: Split) -> Result<Option<Self>> {
        let Some(index) = desc.index_split(split)? else {
            return Ok(None);
        };
        debug!(%split, images = index.len(), "indexed split");
        Ok(Some(Self {
            split,
            num_classes: desc.num_classes(),
            samples: index.samples,
        }))
    }

    /// Parse every label file up front and drop samples whose labels are
    /// unreadable or malformed, warning with the file and line. Returns the
    /// number of dropped samples.
    pub fn drop_corrupt_labels(&mut self) -> usize {
        let nc = self.num_classes;
        let valid: Vec<bool> = self
            .samples
            .par_iter()
            .map(|s| match read_label_file(&s.label, nc) {
                Ok(_) => true,
                Err(e) => {
                    warn!(
                        image = %s.image.display(),
                        error = %e,
                        "skipping sample with corrupt labels"
                    );
                    false
                }
            })
            .collect();
        let before = self.samples.len();
        let mut keep = valid.into_iter();
        self.samples.retain(|_| keep.next().unwrap_or(false));
        let dropped = before - self.samples.len();
        if dropped > 0 {
            warn!(
                split = %self.split,
                dropped,
                kept = self.samples.len(),
                "corrupt label files skipped"
            );
        }
        dropped
    }

    pub fn samples(&self) -> &[SplitSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

struct LoadedSample {
    chw: Vec<f32>,
    targets: ImageTargets,
}

fn load_sample(
    sample: &SplitSample,
    num_classes: usize,
    imgsz: u32,
    flip: bool,
) -> Result<LoadedSample> {
    let img = image::open(&sample.image)
        .map_err(|source| TrainingError::Image {
            path: sample.image.clone(),
            source,
        })?
        .to_rgb8();
    let labels = read_label_file(&sample.label, num_classes)?;
    let mut boxed = letterbox(&img, imgsz);
    if flip {
        flip_chw_horizontal(&mut boxed.chw, imgsz as usize);
    }

    let mut targets = ImageTargets::default();
    for label in labels {
        let mut xyxy = boxed.info.to_letterbox(cxcywh_to_xyxy(label.bbox_cxcywh));
        if flip {
            xyxy = [1.0 - xyxy[2], xyxy[1], 1.0 - xyxy[0], xyxy[3]];
        }
        let cxcywh = xyxy_to_cxcywh(xyxy);
        if cxcywh[2] <= 0.0 || cxcywh[3] <= 0.0 {
            continue;
        }
        targets.boxes.push(cxcywh);
        targets.classes.push(label.class_id);
    }
    Ok(LoadedSample {
        chw: boxed.chw,
        targets,
    })
}

fn flip_chw_horizontal(chw: &mut [f32], size: usize) {
    for row in chw.chunks_exact_mut(size) {
        row.reverse();
    }
}

/// Load, letterbox, and stack a batch. `hflip[i]` flips sample `i`; an empty
/// slice disables flipping.
pub fn collate<B: Backend>(
    samples: &[SplitSample],
    num_classes: usize,
    imgsz: u32,
    hflip: &[bool],
    device: &B::Device,
) -> Result<CollatedBatch<B>> {
    if samples.is_empty() {
        return Err(TrainingError::EmptyBatch);
    }
    let loaded = samples
        .par_iter()
        .enumerate()
        .map(|(i, s)| load_sample(s, num_classes, imgsz, hflip.get(i).copied().unwrap_or(false)))
        .collect::<Result<Vec<_>>>()?;

    let batch = loaded.len();
    let size = imgsz as usize;
    let mut image_buf = Vec::with_capacity(batch * 3 * size * size);
    let mut targets = Vec::with_capacity(batch);
    for sample in loaded {
        image_buf.extend_from_slice(&sample.chw);
        targets.push(sample.targets);
    }
    let images = Tensor::<B, 4>::from_data(
        TensorData::new(image_buf, [batch, 3, size, size]),
        device,
    );
    Ok(CollatedBatch { images, targets })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_reverses_each_row() {
        let mut chw: Vec<f32> = (0..8).map(|v| v as f32).collect();
        flip_chw_horizontal(&mut chw, 2);
        assert_eq!(chw, vec![1.0, 0.0, 3.0, 2.0, 5.0, 4.0, 7.0, 6.0]);
    }
}
