use zaru_tensor::{softmax, top_k, Blob};

use crate::{LabelMap, PostProcError};

/// One classification result, already past the threshold and sorted by descending score.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyEntry {
    pub class_id: u32,
    pub label: String,
    pub score: f32,
}

/// §4.4.1: decodes a single 1-D score vector into labeled, thresholded, top-`top` results.
pub struct Classify {
    labels: LabelMap,
    apply_softmax: bool,
    score_scale: f32,
    /// Threshold in percent (as the zoo's `thresh` key is specified), compared against
    /// `score * 100`.
    thresh_pct: f32,
    top: usize,
    class_offset: i64,
}

impl Classify {
    pub fn new(labels: LabelMap) -> Self {
        Self {
            labels,
            apply_softmax: false,
            score_scale: 1.0,
            thresh_pct: 0.0,
            top: 5,
            class_offset: 0,
        }
    }

    pub fn set_softmax(&mut self, apply: bool) -> &mut Self {
        self.apply_softmax = apply;
        self
    }

    pub fn set_score_scale(&mut self, scale: f32) -> &mut Self {
        self.score_scale = scale;
        self
    }

    pub fn set_thresh_pct(&mut self, thresh_pct: f32) -> &mut Self {
        self.thresh_pct = thresh_pct;
        self
    }

    pub fn set_top(&mut self, top: usize) -> &mut Self {
        self.top = top;
        self
    }

    pub fn set_class_offset(&mut self, offset: i64) -> &mut Self {
        self.class_offset = offset;
        self
    }

    pub fn process(&mut self, outputs: &[Blob]) -> Result<Vec<ClassifyEntry>, PostProcError> {
        if outputs.len() != 1 {
            return Err(PostProcError::UnexpectedOutputCount {
                expected: 1,
                actual: outputs.len(),
            });
        }
        let raw = outputs[0]
            .as_f32()
            .expect("classify output must be f32 (network stage dequantizes integer outputs)");

        let scores = if self.apply_softmax {
            softmax(raw, 1.0)
        } else {
            raw.to_vec()
        };
        let scores: Vec<f32> = scores.iter().map(|s| s * self.score_scale).collect();

        let thresh = self.thresh_pct / 100.0;
        let mut candidates: Vec<(usize, f32)> = top_k(&scores, scores.len())
            .into_iter()
            .filter(|(_, score)| *score >= thresh)
            .collect();
        candidates.truncate(self.top);

        Ok(candidates
            .into_iter()
            .map(|(id, score)| {
                let display_id = (id as i64 + self.class_offset).max(0) as u32;
                ClassifyEntry {
                    class_id: display_id,
                    label: self.labels.get(display_id),
                    score,
                }
            })
            .collect())
    }

    pub fn report(&self, entries: &[ClassifyEntry]) -> Vec<String> {
        if entries.is_empty() {
            return vec!["(no detections above threshold)".to_string()];
        }
        entries
            .iter()
            .map(|e| format!("{}: {}: {:.1}%", e.class_id, e.label, e.score * 100.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zaru_tensor::{ElementType, Layout, Quant, TensorAttr};

    fn blob(values: &[f32]) -> Blob {
        let attr = TensorAttr::new(Layout::Na, ElementType::F32, vec![values.len()], Quant::None)
            .unwrap();
        Blob::from_slice(attr, values).unwrap()
    }

    #[test]
    fn selects_top_k_by_descending_score() {
        let mut c = Classify::new(LabelMap::empty());
        c.set_top(2).set_thresh_pct(0.0);
        let out = c.process(&[blob(&[0.1, 0.9, 0.2, 0.05])]).unwrap();
        assert_eq!(out.iter().map(|e| e.class_id).collect::<Vec<_>>(), [1, 2]);
    }

    #[test]
    fn empty_above_threshold_reports_no_detections() {
        let c = Classify::new(LabelMap::empty());
        let report = c.report(&[]);
        assert_eq!(report, ["(no detections above threshold)"]);
    }

    #[test]
    fn applies_class_offset_to_label_lookup() {
        let labels = LabelMap::parse("bg\nperson\n");
        let mut c = Classify::new(labels);
        c.set_class_offset(1).set_top(1).set_thresh_pct(0.0);
        let out = c.process(&[blob(&[0.9])]).unwrap();
        assert_eq!(out[0].class_id, 1);
        assert_eq!(out[0].label, "person");
    }
}
