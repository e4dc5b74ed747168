//! FasterRCNN decoder (§4.4.2): a single `[N x 7]` output, each row
//! `(batch, class, score, x1, y1, x2, y2)` already in normalized `[0, 1]` coordinates.

use crate::PostProcError;

#[derive(Debug, Clone, PartialEq)]
pub struct FasterRcnnDetection {
    pub class_id: u32,
    pub score: f32,
    /// `(x1, y1, x2, y2)`, normalized.
    pub rect: (f32, f32, f32, f32),
}

pub fn decode(rows: &[f32], thresh: f32) -> Result<Vec<FasterRcnnDetection>, PostProcError> {
    if rows.len() % 7 != 0 {
        return Err(PostProcError::UnexpectedOutputCount {
            expected: 7,
            actual: rows.len() % 7,
        });
    }

    Ok(rows
        .chunks(7)
        .filter(|row| row[2] >= thresh)
        .map(|row| FasterRcnnDetection {
            class_id: row[1].round() as u32,
            score: row[2],
            rect: (row[3], row[4], row[5], row[6]),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_rows_above_threshold() {
        let rows = [0.0, 3.0, 0.95, 0.1, 0.2, 0.6, 0.7, 0.0, 1.0, 0.1, 0.0, 0.0, 0.1, 0.1];
        let out = decode(&rows, 0.5).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 3);
        assert_eq!(out[0].rect, (0.1, 0.2, 0.6, 0.7));
    }

    #[test]
    fn rejects_non_multiple_of_seven() {
        let rows = [0.0; 6];
        assert!(decode(&rows, 0.5).is_err());
    }
}
