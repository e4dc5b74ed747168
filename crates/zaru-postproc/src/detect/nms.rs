//! Non-maximum suppression (§4.4.2). Generalizes the teacher workspace's own
//! `NonMaxSuppression`/`SuppressionMode` (previously `zaru::detection::nms`, keyed on raw
//! detections with optional landmarks) to the spec's class-aware detections: grouped per class,
//! greedy removal by default, with the teacher's confidence-weighted averaging kept available as
//! an alternate mode.

use zaru_utils::num::TotalF32;

use crate::Detection;

/// How [`NonMaxSuppression`] resolves overlapping detections of the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SuppressionMode {
    /// Keep only the highest-scoring detection among each overlapping group (§4.4.2's NMS).
    /// Idempotent: running it twice on its own output is a no-op.
    Remove,
    /// Compute a confidence-weighted average of each overlapping group's rectangles, matching
    /// the teacher's "Non-Maximum Averaging" variant.
    Average,
}

/// Greedy per-class non-maximum suppression.
pub struct NonMaxSuppression {
    iou_thresh: f32,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    pub fn new(iou_thresh: f32) -> Self {
        Self {
            iou_thresh,
            mode: SuppressionMode::Remove,
        }
    }

    pub fn set_mode(&mut self, mode: SuppressionMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Suppresses overlapping detections of the same class. `detections` is consumed; the
    /// deterministic tie-break (lower input index wins on equal score) falls out of a stable
    /// sort on `(-score, index)`.
    pub fn process(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let mut indexed: Vec<(usize, Detection)> = detections.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            TotalF32(b.score).partial_cmp(&TotalF32(a.score)).unwrap().then(ia.cmp(ib))
        });

        let mut out: Vec<Detection> = Vec::new();
        let mut remaining = indexed;

        while let Some((_, seed)) = remaining.first().cloned() {
            let class = seed.class_id;
            let mut group: Vec<Detection> = Vec::new();
            let mut rest = Vec::new();
            for (idx, det) in remaining {
                if det.class_id == class && det.rect.iou(&seed.rect) >= self.iou_thresh {
                    group.push(det);
                } else {
                    rest.push((idx, det));
                }
            }
            remaining = rest;

            match self.mode {
                SuppressionMode::Remove => out.push(group.into_iter().next().unwrap()),
                SuppressionMode::Average => out.push(average(group)),
            }
        }

        out
    }
}

fn average(group: Vec<Detection>) -> Detection {
    let total: f32 = group.iter().map(|d| d.score).sum();
    let (mut x1, mut y1, mut x2, mut y2) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for det in &group {
        let w = det.score / total;
        x1 += det.rect.x() as f32 * w;
        y1 += det.rect.y() as f32 * w;
        x2 += det.rect.right() as f32 * w;
        y2 += det.rect.bottom() as f32 * w;
    }
    let best = group
        .iter()
        .max_by(|a, b| TotalF32(a.score).partial_cmp(&TotalF32(b.score)).unwrap())
        .unwrap();
    Detection {
        class_id: best.class_id,
        label: best.label.clone(),
        score: best.score,
        rect: zaru_image::Rect::from_top_left(
            x1.round() as i32,
            y1.round() as i32,
            (x2 - x1).round() as u32,
            (y2 - y1).round() as u32,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zaru_image::Rect;

    fn det(class_id: u32, score: f32, rect: Rect) -> Detection {
        Detection {
            class_id,
            label: class_id.to_string(),
            score,
            rect,
        }
    }

    #[test]
    fn reference_scenario_suppresses_at_low_threshold() {
        // two boxes with IoU ~0.68
        let a = det(0, 0.9, Rect::from_top_left(0, 0, 10, 10));
        let b = det(0, 0.8, Rect::from_top_left(1, 1, 10, 10));
        let nms = NonMaxSuppression::new(0.5);
        let out = nms.process(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, 0.9);
    }

    #[test]
    fn reference_scenario_keeps_both_at_high_threshold() {
        let a = det(0, 0.9, Rect::from_top_left(0, 0, 10, 10));
        let b = det(0, 0.8, Rect::from_top_left(1, 1, 10, 10));
        let nms = NonMaxSuppression::new(0.7);
        let out = nms.process(vec![a, b]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn is_idempotent() {
        let a = det(0, 0.9, Rect::from_top_left(0, 0, 10, 10));
        let b = det(0, 0.8, Rect::from_top_left(1, 1, 10, 10));
        let nms = NonMaxSuppression::new(0.5);
        let once = nms.process(vec![a, b]);
        let twice = nms.process(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn different_classes_are_not_suppressed() {
        let a = det(0, 0.9, Rect::from_top_left(0, 0, 10, 10));
        let b = det(1, 0.8, Rect::from_top_left(1, 1, 10, 10));
        let nms = NonMaxSuppression::new(0.1);
        let out = nms.process(vec![a, b]);
        assert_eq!(out.len(), 2);
    }
}
