//! "Plain" YOLO decoder (§4.4.2): the network already performs its own grid/anchor decoding and
//! emits one row per candidate box, so this module only has to recognize the row's layout and
//! threshold it — no sigmoid/exp math involved (that's what separates it from the `rawyolo`
//! family).

use crate::PostProcError;

#[derive(Debug, Clone, PartialEq)]
pub struct YoloDetection {
    pub class_id: u32,
    pub score: f32,
    /// `(x1, y1, x2, y2)` in network-input pixel space.
    pub rect: (f32, f32, f32, f32),
}

/// Decodes rows of either `(cx, cy, w, h, obj_conf, class_probs...)` (center-format, as emitted by
/// most exported detection heads) or, when no per-class scores are present, `(x1, y1, x2, y2,
/// score, class_id)` (already-decoded corner format).
pub fn decode(
    rows: &[f32],
    row_len: usize,
    num_classes: usize,
    thresh: f32,
) -> Result<Vec<YoloDetection>, PostProcError> {
    if row_len == 0 || rows.len() % row_len != 0 {
        return Err(PostProcError::UnexpectedOutputCount {
            expected: row_len,
            actual: rows.len(),
        });
    }

    let mut out = Vec::new();
    for row in rows.chunks(row_len) {
        if row_len == 6 && num_classes == 0 {
            let score = row[4];
            if score >= thresh {
                out.push(YoloDetection {
                    class_id: row[5].round() as u32,
                    score,
                    rect: (row[0], row[1], row[2], row[3]),
                });
            }
            continue;
        }

        let (cx, cy, w, h, obj_conf) = (row[0], row[1], row[2], row[3], row[4]);
        let class_probs = &row[5..5 + num_classes];
        for (class_id, &class_score) in class_probs.iter().enumerate() {
            let score = obj_conf * class_score;
            if score >= thresh {
                out.push(YoloDetection {
                    class_id: class_id as u32,
                    score,
                    rect: (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_center_format_with_class_probs() {
        let rows = [50.0, 50.0, 20.0, 10.0, 0.9, 0.1, 0.8];
        let out = decode(&rows, 7, 2, 0.5).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 1);
        assert!((out[0].score - 0.72).abs() < 1e-6);
        assert_eq!(out[0].rect, (40.0, 45.0, 60.0, 55.0));
    }

    #[test]
    fn decodes_precomputed_corner_format() {
        let rows = [10.0, 10.0, 20.0, 20.0, 0.9, 3.0];
        let out = decode(&rows, 6, 0, 0.5).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 3);
    }
}
