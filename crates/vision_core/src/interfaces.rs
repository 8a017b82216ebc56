use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A frame of image data and associated metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: u64,
    /// Raw RGB8 data, row-major.
    pub rgb: Vec<u8>,
    /// Image dimensions (width, height).
    pub size: (u32, u32),
    /// Where the frame came from, if it was a file.
    pub path: Option<PathBuf>,
}

impl Frame {
    pub fn from_image(id: u64, image: RgbImage, path: Option<PathBuf>) -> Self {
        let size = image.dimensions();
        Self {
            id,
            rgb: image.into_raw(),
            size,
            path,
        }
    }

    /// Rebuild an image buffer; `None` when `rgb` does not match `size`.
    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.size.0, self.size.1, self.rgb.clone())
    }
}

/// One detected object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    /// Normalized box \[x0,y0,x1,y1\] in 0..1 of the source frame.
    pub bbox_xyxy: [f32; 4],
    pub score: f32,
    pub class_id: usize,
}

/// Result of running a detector on a frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    pub frame_id: u64,
    /// Sorted by descending score.
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Runs inference on a frame.
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> DetectionResult;
    /// Optional: adjust thresholds at runtime.
    fn set_thresholds(&mut self, _conf: f32, _iou: f32) {}
}
