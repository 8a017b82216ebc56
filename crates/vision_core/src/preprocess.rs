use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Padding value used for the letterbox border.
pub const PAD_VALUE: u8 = 114;

/// Geometry of a letterbox transform from a source image into a `size x size` square.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LetterboxInfo {
    pub src_size: (u32, u32),
    pub size: u32,
    /// Resized content size inside the square.
    pub content: (u32, u32),
    /// Top-left offset of the content.
    pub pad: (u32, u32),
}

impl LetterboxInfo {
    pub fn new(src_size: (u32, u32), size: u32) -> Self {
        let (w, h) = (src_size.0.max(1), src_size.1.max(1));
        let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
        let cw = ((w as f32 * scale).round() as u32).clamp(1, size);
        let ch = ((h as f32 * scale).round() as u32).clamp(1, size);
        Self {
            src_size: (w, h),
            size,
            content: (cw, ch),
            pad: ((size - cw) / 2, (size - ch) / 2),
        }
    }

    /// Normalized source-image xyxy box to normalized letterbox xyxy.
    pub fn to_letterbox(&self, b: [f32; 4]) -> [f32; 4] {
        let s = self.size as f32;
        let (cw, ch) = (self.content.0 as f32, self.content.1 as f32);
        let (px, py) = (self.pad.0 as f32, self.pad.1 as f32);
        [
            (b[0] * cw + px) / s,
            (b[1] * ch + py) / s,
            (b[2] * cw + px) / s,
            (b[3] * ch + py) / s,
        ]
    }

    /// Normalized letterbox xyxy box back to the source image, clamped to 0..1.
    pub fn from_letterbox(&self, b: [f32; 4]) -> [f32; 4] {
        let s = self.size as f32;
        let (cw, ch) = (self.content.0 as f32, self.content.1 as f32);
        let (px, py) = (self.pad.0 as f32, self.pad.1 as f32);
        let fx = |v: f32| ((v * s - px) / cw).clamp(0.0, 1.0);
        let fy = |v: f32| ((v * s - py) / ch).clamp(0.0, 1.0);
        [fx(b[0]), fy(b[1]), fx(b[2]), fy(b[3])]
    }
}

/// A letterboxed image as a CHW float buffer in 0..1.
#[derive(Debug, Clone)]
pub struct Letterboxed {
    pub chw: Vec<f32>,
    pub info: LetterboxInfo,
}

/// Resize keeping aspect ratio and pad to `size x size`.
pub fn letterbox(img: &RgbImage, size: u32) -> Letterboxed {
    let info = LetterboxInfo::new(img.dimensions(), size);
    let resized = image::imageops::resize(img, info.content.0, info.content.1, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    image::imageops::replace(&mut canvas, &resized, info.pad.0 as i64, info.pad.1 as i64);

    let plane = (size * size) as usize;
    let mut chw = vec![0.0f32; 3 * plane];
    for (x, y, px) in canvas.enumerate_pixels() {
        let idx = y as usize * size as usize + x as usize;
        chw[idx] = px[0] as f32 / 255.0;
        chw[plane + idx] = px[1] as f32 / 255.0;
        chw[2 * plane + idx] = px[2] as f32 / 255.0;
    }
    Letterboxed { chw, info }
}
