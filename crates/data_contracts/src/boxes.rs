//! Box conversions and overlap measures on normalized `[f32; 4]` boxes.
//!
//! Two layouts are used across the workspace:
//! - `cxcywh`: center x, center y, width, height (labels and model output).
//! - `xyxy`: x0, y0, x1, y1 (overlap math and drawing).

pub fn cxcywh_to_xyxy(b: [f32; 4]) -> [f32; 4] {
    let [cx, cy, w, h] = b;
    [cx - w * 0.5, cy - h * 0.5, cx + w * 0.5, cy + h * 0.5]
}

pub fn xyxy_to_cxcywh(b: [f32; 4]) -> [f32; 4] {
    let [x0, y0, x1, y1] = b;
    [(x0 + x1) * 0.5, (y0 + y1) * 0.5, x1 - x0, y1 - y0]
}

/// Intersection over union. Coordinates may arrive unordered.
pub fn iou_xyxy(a: [f32; 4], b: [f32; 4]) -> f32 {
    let (inter, union) = inter_union(a, b);
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Generalized IoU in `[-1, 1]`: `IoU - (C - U) / C` with `C` the enclosing box area.
pub fn giou_xyxy(a: [f32; 4], b: [f32; 4]) -> f32 {
    let a = ordered(a);
    let b = ordered(b);
    let (inter, union) = inter_union(a, b);
    let iou = if union <= 0.0 { 0.0 } else { inter / union };
    let enc_w = (a[2].max(b[2]) - a[0].min(b[0])).max(0.0);
    let enc_h = (a[3].max(b[3]) - a[1].min(b[1])).max(0.0);
    let enclosing = enc_w * enc_h;
    if enclosing <= 0.0 {
        iou
    } else {
        iou - (enclosing - union) / enclosing
    }
}

fn ordered(b: [f32; 4]) -> [f32; 4] {
    [b[0].min(b[2]), b[1].min(b[3]), b[0].max(b[2]), b[1].max(b[3])]
}

fn inter_union(a: [f32; 4], b: [f32; 4]) -> (f32, f32) {
    let a = ordered(a);
    let b = ordered(b);
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    (inter, area_a + area_b - inter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_layouts() {
        let xyxy = cxcywh_to_xyxy([0.5, 0.5, 0.2, 0.4]);
        assert!((xyxy[0] - 0.4).abs() < 1e-6);
        assert!((xyxy[1] - 0.3).abs() < 1e-6);
        assert!((xyxy[2] - 0.6).abs() < 1e-6);
        assert!((xyxy[3] - 0.7).abs() < 1e-6);
        let back = xyxy_to_cxcywh(xyxy);
        for (x, y) in back.iter().zip([0.5, 0.5, 0.2, 0.4]) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn iou_half_overlap() {
        let iou = iou_xyxy([0.0, 0.0, 1.0, 1.0], [0.5, 0.0, 1.5, 1.0]);
        assert!((iou - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn giou_negative_for_disjoint_boxes() {
        let giou = giou_xyxy([0.0, 0.0, 0.25, 0.25], [0.75, 0.75, 1.0, 1.0]);
        assert!(giou < 0.0);
        assert!(giou >= -1.0);
    }

    #[test]
    fn giou_equals_iou_for_identical() {
        let b = [0.1, 0.2, 0.4, 0.6];
        assert!((giou_xyxy(b, b) - 1.0).abs() < 1e-6);
    }
}
