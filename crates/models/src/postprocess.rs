/// One query slot decoded to its best class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryDetection {
    pub query: usize,
    /// Normalized cxcywh in model-input space.
    pub bbox_cxcywh: [f32; 4],
    pub class_id: usize,
    /// Sigmoid probability of `class_id`.
    pub score: f32,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode one image's raw outputs: best class per query, keep scores >= `conf`,
/// sorted by descending score.
///
/// `boxes` is `Q * 4`, `logits` is `Q * C`, both row-major.
pub fn decode_queries(
    boxes: &[f32],
    logits: &[f32],
    num_queries: usize,
    num_classes: usize,
    conf: f32,
) -> Vec<QueryDetection> {
    if num_classes == 0 {
        return Vec::new();
    }
    let mut out: Vec<QueryDetection> = (0..num_queries)
        .filter_map(|q| {
            let row = logits.get(q * num_classes..(q + 1) * num_classes)?;
            let (class_id, logit) = row
                .iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
            let score = sigmoid(logit);
            if !(score >= conf) {
                return None;
            }
            let b = boxes.get(q * 4..q * 4 + 4)?;
            Some(QueryDetection {
                query: q,
                bbox_cxcywh: [b[0], b[1], b[2], b[3]],
                class_id,
                score,
            })
        })
        .collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_confident_queries_sorted() {
        let boxes = [0.5, 0.5, 0.1, 0.1, 0.2, 0.2, 0.1, 0.1, 0.8, 0.8, 0.1, 0.1];
        // 3 queries x 2 classes
        let logits = [2.0, -1.0, -5.0, -6.0, -1.0, 4.0];
        let dets = decode_queries(&boxes, &logits, 3, 2, 0.5);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].query, 2);
        assert_eq!(dets[0].class_id, 1);
        assert_eq!(dets[1].query, 0);
        assert_eq!(dets[1].class_id, 0);
    }

    #[test]
    fn nan_scores_are_dropped() {
        let dets = decode_queries(&[0.5; 4], &[f32::NAN], 1, 1, 0.0);
        assert!(dets.is_empty());
    }
}
