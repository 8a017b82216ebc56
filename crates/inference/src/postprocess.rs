use data_contracts::iou_xyxy;
use vision_core::interfaces::Detection;

/// Indices kept by greedy NMS, highest score first.
pub fn nms(boxes: &[[f32; 4]], scores: &[f32], iou_thresh: f32) -> Vec<usize> {
    let mut idxs: Vec<usize> = (0..boxes.len().min(scores.len())).collect();
    // ascending, so `pop` yields the best remaining box
    idxs.sort_by(|a, b| {
        scores[*a]
            .partial_cmp(&scores[*b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    while let Some(i) = idxs.pop() {
        keep.push(i);
        idxs.retain(|&j| iou_xyxy(boxes[i], boxes[j]) <= iou_thresh);
    }
    keep
}

/// Per-class NMS over `dets`, then the `max_det` highest scores overall.
pub fn class_aware_nms(dets: Vec<Detection>, iou_thresh: f32, max_det: usize) -> Vec<Detection> {
    let mut classes: Vec<usize> = dets.iter().map(|d| d.class_id).collect();
    classes.sort_unstable();
    classes.dedup();

    let mut kept = Vec::with_capacity(dets.len());
    for cls in classes {
        let group: Vec<&Detection> = dets.iter().filter(|d| d.class_id == cls).collect();
        let boxes: Vec<[f32; 4]> = group.iter().map(|d| d.bbox_xyxy).collect();
        let scores: Vec<f32> = group.iter().map(|d| d.score).collect();
        kept.extend(nms(&boxes, &scores, iou_thresh).into_iter().map(|i| *group[i]));
    }
    kept.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    kept.truncate(max_det);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], score: f32, class_id: usize) -> Detection {
        Detection {
            bbox_xyxy: bbox,
            score,
            class_id,
        }
    }

    #[test]
    fn nms_keeps_the_best_of_overlapping_boxes() {
        let boxes = [
            [0.0, 0.0, 0.5, 0.5],
            [0.01, 0.01, 0.5, 0.5],
            [0.6, 0.6, 0.9, 0.9],
        ];
        let keep = nms(&boxes, &[0.6, 0.9, 0.3], 0.5);
        assert_eq!(keep, vec![1, 2]);
    }

    #[test]
    fn overlap_across_classes_is_kept() {
        let dets = vec![
            det([0.0, 0.0, 0.5, 0.5], 0.8, 0),
            det([0.0, 0.0, 0.5, 0.5], 0.7, 1),
            det([0.0, 0.0, 0.5, 0.5], 0.6, 0),
        ];
        let kept = class_aware_nms(dets, 0.7, 300);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].class_id, 0);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn max_det_caps_output() {
        let dets: Vec<Detection> = (0..10)
            .map(|i| {
                let x = i as f32 * 0.1;
                det([x, 0.0, x + 0.05, 0.05], 0.1 * i as f32, 0)
            })
            .collect();
        let kept = class_aware_nms(dets, 0.7, 3);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].score >= kept[1].score && kept[1].score >= kept[2].score);
    }
}
