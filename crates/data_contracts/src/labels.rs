use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::boxes::xyxy_to_cxcywh;
use crate::error::{DatasetError, DatasetResult, LabelError};

/// One object from a YOLO label file, normalized to the image size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct YoloLabel {
    pub class_id: usize,
    pub bbox_cxcywh: [f32; 4],
}

impl YoloLabel {
    /// Parse one line. `nc` bounds the class id.
    ///
    /// Accepts `cls cx cy w h` or a polygon `cls x1 y1 x2 y2 x3 y3 ...`;
    /// polygons collapse to their enclosing box.
    pub fn parse_line(line: &str, nc: usize) -> Result<Self, LabelError> {
        let mut parts = line.split_whitespace();
        let cls_raw = parts.next().ok_or(LabelError::Empty)?;
        let class_id = parse_class_id(cls_raw)?;
        if class_id >= nc {
            return Err(LabelError::UnknownClass { class_id, nc });
        }
        let values = parts
            .map(|p| {
                p.parse::<f32>()
                    .map_err(|_| LabelError::NotANumber(p.to_string()))
                    .and_then(clamp_coord)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let bbox_cxcywh = match values.len() {
            4 => [values[0], values[1], values[2], values[3]],
            n if n >= 6 && n % 2 == 0 => {
                let mut x0 = f32::MAX;
                let mut y0 = f32::MAX;
                let mut x1 = f32::MIN;
                let mut y1 = f32::MIN;
                for pt in values.chunks_exact(2) {
                    x0 = x0.min(pt[0]);
                    y0 = y0.min(pt[1]);
                    x1 = x1.max(pt[0]);
                    y1 = y1.max(pt[1]);
                }
                xyxy_to_cxcywh([x0, y0, x1, y1])
            }
            n => return Err(LabelError::BadArity(n)),
        };
        Ok(Self {
            class_id,
            bbox_cxcywh,
        })
    }
}

/// Exporters round polygon vertices slightly past the image edge.
const COORD_TOLERANCE: f32 = 1e-3;

fn clamp_coord(v: f32) -> Result<f32, LabelError> {
    if v.is_finite() && (-COORD_TOLERANCE..=1.0 + COORD_TOLERANCE).contains(&v) {
        Ok(v.clamp(0.0, 1.0))
    } else {
        Err(LabelError::OutOfRange(v))
    }
}

fn parse_class_id(raw: &str) -> Result<usize, LabelError> {
    if let Ok(id) = raw.parse::<usize>() {
        return Ok(id);
    }
    // Some exporters write "0.0".
    match raw.parse::<f32>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        _ => Err(LabelError::BadClassId(raw.to_string())),
    }
}

/// Map `.../images/.../x.jpg` to `.../labels/.../x.txt` (last `images` component only).
pub fn label_path_for_image(image: &Path) -> PathBuf {
    let comps: Vec<Component<'_>> = image.components().collect();
    let images_idx = comps
        .iter()
        .rposition(|c| c.as_os_str() == OsStr::new("images"));
    let mut out = PathBuf::new();
    for (i, c) in comps.iter().enumerate() {
        if Some(i) == images_idx {
            out.push("labels");
        } else {
            out.push(c.as_os_str());
        }
    }
    out.set_extension("txt");
    out
}

/// Read a label file. A missing file means the image has no objects.
pub fn read_label_file(path: &Path, nc: usize) -> DatasetResult<Vec<YoloLabel>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DatasetError::io(path, e)),
    };
    let mut labels = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let label = YoloLabel::parse_line(line, nc).map_err(|source| DatasetError::Label {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        labels.push(label);
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_box_line() {
        let l = YoloLabel::parse_line("1 0.5 0.5 0.2 0.3", 2).unwrap();
        assert_eq!(l.class_id, 1);
        assert_eq!(l.bbox_cxcywh, [0.5, 0.5, 0.2, 0.3]);
    }

    #[test]
    fn polygon_collapses_to_box() {
        let l = YoloLabel::parse_line("0 0.1 0.2 0.5 0.2 0.5 0.6 0.1 0.6", 1).unwrap();
        let [cx, cy, w, h] = l.bbox_cxcywh;
        assert!((cx - 0.3).abs() < 1e-6);
        assert!((cy - 0.4).abs() < 1e-6);
        assert!((w - 0.4).abs() < 1e-6);
        assert!((h - 0.4).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_lines() {
        assert_eq!(
            YoloLabel::parse_line("3 0.5 0.5 0.1 0.1", 2),
            Err(LabelError::UnknownClass { class_id: 3, nc: 2 })
        );
        assert_eq!(
            YoloLabel::parse_line("0 0.5 0.5 0.1", 1),
            Err(LabelError::BadArity(3))
        );
        assert_eq!(
            YoloLabel::parse_line("0 0.5 1.5 0.1 0.1", 1),
            Err(LabelError::OutOfRange(1.5))
        );
        assert!(matches!(
            YoloLabel::parse_line("a 0.5 0.5 0.1 0.1", 1),
            Err(LabelError::BadClassId(_))
        ));
    }

    #[test]
    fn edge_overshoot_is_clamped() {
        let l = YoloLabel::parse_line("0 0.1 0.1 1.0000001 0.1 0.5 0.9", 1).unwrap();
        let [cx, _, w, _] = l.bbox_cxcywh;
        assert!((cx + w / 2.0 - 1.0).abs() < 1e-6);
        let l = YoloLabel::parse_line("0 -0.0005 0.5 0.2 0.2", 1).unwrap();
        assert_eq!(l.bbox_cxcywh[0], 0.0);
        assert_eq!(
            YoloLabel::parse_line("0 0.5 0.5 1.01 0.2", 1),
            Err(LabelError::OutOfRange(1.01))
        );
    }

    #[test]
    fn label_path_swaps_last_images_component() {
        let p = label_path_for_image(Path::new("/data/images/train/images/a.jpg"));
        assert_eq!(p, PathBuf::from("/data/images/train/labels/a.txt"));
    }
}
