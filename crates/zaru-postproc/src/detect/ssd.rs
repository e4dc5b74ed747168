//! SSD-family decoders (§4.4.2): `SSD` and `TPUSSD` both consume three parallel outputs —
//! per-box scores, normalized box coordinates, and class ids — and differ only in which
//! normalization the exporting toolchain already guarantees (both are treated identically here,
//! since a `TensorAttr` already carries its own layout/quant bookkeeping upstream).

use crate::PostProcError;

/// The order box coordinates are stored in within the `[N x 4]` boxes tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxOrder {
    /// `(y1, x1, y2, x2)`, the common TensorFlow/TFLite SSD export order.
    YxYx,
    /// `(x1, y1, x2, y2)`.
    XyXy,
}

/// One raw SSD-style detection, in normalized `[0, 1]` network-input coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SsdDetection {
    pub class_id: u32,
    pub score: f32,
    /// `(x1, y1, x2, y2)`, normalized.
    pub rect: (f32, f32, f32, f32),
}

/// Decodes the `[N]` scores / `[N x 4]` boxes / `[N]` class-id triple into detections with
/// `score >= thresh`.
pub fn decode(
    scores: &[f32],
    boxes: &[f32],
    class_ids: &[f32],
    order: BoxOrder,
    thresh: f32,
) -> Result<Vec<SsdDetection>, PostProcError> {
    let n = scores.len();
    if boxes.len() != n * 4 || class_ids.len() != n {
        return Err(PostProcError::UnexpectedOutputCount {
            expected: n,
            actual: class_ids.len(),
        });
    }

    Ok((0..n)
        .filter(|&i| scores[i] >= thresh)
        .map(|i| {
            let b = &boxes[i * 4..i * 4 + 4];
            let rect = match order {
                BoxOrder::YxYx => (b[1], b[0], b[3], b[2]),
                BoxOrder::XyXy => (b[0], b[1], b[2], b[3]),
            };
            SsdDetection {
                class_id: class_ids[i].round() as u32,
                score: scores[i],
                rect,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discards_below_threshold() {
        let scores = [0.9, 0.1];
        let boxes = [0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 0.5, 0.5];
        let class_ids = [0.0, 1.0];
        let out = decode(&scores, &boxes, &class_ids, BoxOrder::XyXy, 0.5).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 0);
    }

    #[test]
    fn yxyx_order_is_swapped_to_xyxy() {
        let scores = [0.9];
        let boxes = [0.1, 0.2, 0.6, 0.7]; // y1,x1,y2,x2
        let class_ids = [0.0];
        let out = decode(&scores, &boxes, &class_ids, BoxOrder::YxYx, 0.5).unwrap();
        assert_eq!(out[0].rect, (0.2, 0.1, 0.7, 0.6));
    }
}
