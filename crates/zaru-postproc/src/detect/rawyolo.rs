//! Raw-YOLO anchor decoding (§4.4.2, "RAWYOLO family"): each output tensor is a grid of shape
//! `[A, 5+C, Gy, Gx]` (anchors-per-cell, objectness+box+class logits, grid height, grid width)
//! that this module turns into detections in network-input pixel space.

use zaru_tensor::softmax;
use zaru_utils::num::sigmoid;

use crate::PostProcError;

/// Which raw-YOLO decoding convention to use. All members share the same grid/anchor indexing;
/// they differ only in how box scale and class probability are computed (§4.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawYoloVariant {
    Face,
    V2,
    V3,
    V4,
    V3Tiny,
}

impl RawYoloVariant {
    fn anchors_in_pixels(&self) -> bool {
        // v3/v4/face/tiny anchors are already declared in input-pixel units; v2's Darknet-lineage
        // anchors are in grid-cell units and must be scaled by the layer's stride (§9, Open
        // Question: resolved in favor of the Darknet v2 convention).
        !matches!(self, RawYoloVariant::V2)
    }

    fn class_scores_are_softmax(&self) -> bool {
        matches!(self, RawYoloVariant::V2)
    }
}

/// A single decoded box in network-input pixel space, before NMS or coordinate remapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RawYoloDetection {
    pub class_id: u32,
    pub confidence: f32,
    /// `(x1, y1, x2, y2)` in network-input pixel space.
    pub rect: (f32, f32, f32, f32),
}

/// Parses the `anchors` zoo parameter: semicolon-separated groups (one per raw output layer, in
/// declared order), each a comma-separated list of alternating width/height values.
///
/// A single group is broadcast to every layer; otherwise the group count must equal
/// `num_layers`.
pub fn parse_anchors(s: &str, num_layers: usize) -> Result<Vec<Vec<(f32, f32)>>, PostProcError> {
    let groups: Vec<Vec<(f32, f32)>> = s
        .split(';')
        .map(parse_anchor_group)
        .collect::<Result<_, _>>()?;

    if groups.len() == 1 {
        Ok(std::iter::repeat(groups.into_iter().next().unwrap())
            .take(num_layers)
            .collect())
    } else if groups.len() == num_layers {
        Ok(groups)
    } else {
        Err(PostProcError::AnchorMismatch {
            expected_groups: num_layers,
            got_groups: groups.len(),
        })
    }
}

fn parse_anchor_group(s: &str) -> Result<Vec<(f32, f32)>, PostProcError> {
    let values: Result<Vec<f32>, _> = s
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect();
    let values = values.map_err(|_| PostProcError::MalformedAnchors(s.to_string()))?;
    if values.is_empty() || values.len() % 2 != 0 {
        return Err(PostProcError::MalformedAnchors(s.to_string()));
    }
    Ok(values.chunks(2).map(|pair| (pair[0], pair[1])).collect())
}

/// Decodes one raw-YOLO output layer.
///
/// `data` is the flattened `[A, 5+C, Gy, Gx]` tensor; `input_size` is the network's input
/// `(width, height)`, used to compute the layer's stride from the grid size.
pub fn decode_layer(
    data: &[f32],
    num_anchors: usize,
    num_classes: usize,
    grid_h: usize,
    grid_w: usize,
    anchors: &[(f32, f32)],
    variant: RawYoloVariant,
    input_size: (u32, u32),
    thresh: f32,
) -> Vec<RawYoloDetection> {
    let stride_x = input_size.0 as f32 / grid_w as f32;
    let stride_y = input_size.1 as f32 / grid_h as f32;
    let channels = 5 + num_classes;
    let plane = grid_h * grid_w;

    let mut out = Vec::new();
    for a in 0..num_anchors.min(anchors.len()) {
        let base = a * channels * plane;
        let (mut anchor_w, mut anchor_h) = anchors[a];
        if !variant.anchors_in_pixels() {
            anchor_w *= stride_x;
            anchor_h *= stride_y;
        }

        for gy in 0..grid_h {
            for gx in 0..grid_w {
                let cell = gy * grid_w + gx;
                let at = |c: usize| data[base + c * plane + cell];

                let tx = at(0);
                let ty = at(1);
                let tw = at(2);
                let th = at(3);
                let t_obj = at(4);

                let object_conf = sigmoid(t_obj);
                let class_scores: Vec<f32> = (0..num_classes).map(|c| at(5 + c)).collect();
                let class_probs = if variant.class_scores_are_softmax() {
                    softmax(&class_scores, 1.0)
                } else {
                    class_scores.iter().map(|v| sigmoid(*v)).collect()
                };

                for (class_id, class_score) in class_probs.into_iter().enumerate() {
                    let confidence = object_conf * class_score;
                    if confidence < thresh {
                        continue;
                    }

                    let bx = (sigmoid(tx) + gx as f32) * stride_x;
                    let by = (sigmoid(ty) + gy as f32) * stride_y;
                    let bw = tw.exp() * anchor_w;
                    let bh = th.exp() * anchor_h;

                    out.push(RawYoloDetection {
                        class_id: class_id as u32,
                        confidence,
                        rect: (bx - bw / 2.0, by - bh / 2.0, bx + bw / 2.0, by + bh / 2.0),
                    });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_shared_anchor_group() {
        let groups = parse_anchors("10,14,23,27,37,58", 3).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], vec![(10.0, 14.0), (23.0, 27.0), (37.0, 58.0)]);
        assert_eq!(groups[2], groups[0]);
    }

    #[test]
    fn rejects_group_count_mismatch() {
        let err = parse_anchors("10,14;23,27", 3).unwrap_err();
        assert!(matches!(err, PostProcError::AnchorMismatch { .. }));
    }

    #[test]
    fn reference_scenario_decodes_centered_box_at_first_anchor_size() {
        // grid 13x13, 3 anchors, stride 32 (=> input 416x416), cell (0,0):
        // (tx,ty,tw,th,to,tc0) = (0,0,0,0,+5,+5)
        let channels = 5 + 1; // 1 class
        let plane = 13 * 13;
        let mut data = vec![0.0f32; 3 * channels * plane];
        // anchor 0, cell (0,0)
        data[4 * plane + 0] = 5.0; // t_obj
        data[5 * plane + 0] = 5.0; // tc0

        let anchors = vec![(10.0, 14.0), (23.0, 27.0), (37.0, 58.0)];
        let dets = decode_layer(&data, 3, 1, 13, 13, &anchors, RawYoloVariant::V3, (416, 416), 0.5);

        let hit = dets.iter().find(|d| d.class_id == 0).unwrap();
        let (x1, y1, x2, y2) = hit.rect;
        let (cx, cy) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
        assert!((cx - 16.0).abs() < 1e-3);
        assert!((cy - 16.0).abs() < 1e-3);
        assert!((x2 - x1 - 10.0).abs() < 1e-3);
        assert!((y2 - y1 - 14.0).abs() < 1e-3);
        assert!(hit.confidence > 0.98);
    }
}
