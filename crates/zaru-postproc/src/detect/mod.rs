//! Object detection decoders (§4.4.2). [`Detect`] dispatches on [`DetectType`] to one of five
//! output conventions, then shares a single NMS + coordinate-remap + report tail across all of
//! them ("Final step for all detect modes").

pub mod nms;
mod fasterrcnn;
mod rawyolo;
mod ssd;
mod yolo;

use zaru_image::{draw, Color, Image};
use zaru_tensor::Blob;

use crate::{Detection, LabelMap, PostProcError, PreProcContext};
pub use nms::{NonMaxSuppression, SuppressionMode};
pub use rawyolo::RawYoloVariant;
pub use ssd::BoxOrder;

/// Which output convention a detection model uses (§4.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectType {
    /// Three outputs (boxes, class ids, scores), normalized `[0, 1]` box coordinates.
    Ssd,
    /// Identical wire format to [`DetectType::Ssd`]; kept distinct because some exporters
    /// guarantee the normalization only on this path.
    TpuSsd,
    /// A single `[N x 7]` output of `(batch, class, score, x1, y1, x2, y2)` rows.
    FasterRcnn,
    /// A single output of already-decoded rows; the network performs its own anchor math.
    Yolo,
    RawYoloFace,
    RawYoloV2,
    RawYoloV3,
    RawYoloV4,
    RawYoloV3Tiny,
}

impl DetectType {
    fn raw_yolo_variant(&self) -> Option<RawYoloVariant> {
        match self {
            DetectType::RawYoloFace => Some(RawYoloVariant::Face),
            DetectType::RawYoloV2 => Some(RawYoloVariant::V2),
            DetectType::RawYoloV3 => Some(RawYoloVariant::V3),
            DetectType::RawYoloV4 => Some(RawYoloVariant::V4),
            DetectType::RawYoloV3Tiny => Some(RawYoloVariant::V3Tiny),
            _ => None,
        }
    }
}

/// §4.4.2: decodes a detection model's output into labeled, NMS'd detections in original-frame
/// pixel coordinates.
pub struct Detect {
    detect_type: DetectType,
    labels: LabelMap,
    thresh: f32,
    num_classes: usize,
    nms: NonMaxSuppression,
    box_order: BoxOrder,
    anchors: Vec<Vec<(f32, f32)>>,
    alpha: u8,
}

impl Detect {
    pub fn new(detect_type: DetectType, labels: LabelMap, num_classes: usize) -> Self {
        Self {
            detect_type,
            labels,
            thresh: 0.5,
            num_classes,
            nms: NonMaxSuppression::new(0.5),
            box_order: BoxOrder::XyXy,
            anchors: Vec::new(),
            alpha: 128,
        }
    }

    pub fn set_thresh(&mut self, thresh: f32) -> &mut Self {
        self.thresh = thresh;
        self
    }

    pub fn set_iou_thresh(&mut self, iou_thresh: f32) -> &mut Self {
        self.nms = NonMaxSuppression::new(iou_thresh);
        self
    }

    pub fn set_suppression_mode(&mut self, mode: SuppressionMode) -> &mut Self {
        self.nms.set_mode(mode);
        self
    }

    pub fn set_box_order(&mut self, order: BoxOrder) -> &mut Self {
        self.box_order = order;
        self
    }

    pub fn set_alpha(&mut self, alpha: u8) -> &mut Self {
        self.alpha = alpha;
        self
    }

    /// Parses and stores the zoo `anchors` parameter, required by the RAWYOLO family.
    pub fn set_anchors(&mut self, anchors: &str, num_layers: usize) -> Result<&mut Self, PostProcError> {
        self.anchors = rawyolo::parse_anchors(anchors, num_layers)?;
        Ok(self)
    }

    pub fn process(
        &mut self,
        outputs: &[Blob],
        ctx: &PreProcContext,
    ) -> Result<Vec<Detection>, PostProcError> {
        let raw = match self.detect_type {
            DetectType::Ssd | DetectType::TpuSsd => self.decode_ssd(outputs, ctx)?,
            DetectType::FasterRcnn => self.decode_fasterrcnn(outputs, ctx)?,
            DetectType::Yolo => self.decode_yolo(outputs, ctx)?,
            _ => self.decode_rawyolo(outputs, ctx)?,
        };
        Ok(self.nms.process(raw))
    }

    fn decode_ssd(&self, outputs: &[Blob], ctx: &PreProcContext) -> Result<Vec<Detection>, PostProcError> {
        if outputs.len() != 3 {
            return Err(PostProcError::UnexpectedOutputCount {
                expected: 3,
                actual: outputs.len(),
            });
        }
        let boxes = as_f32(&outputs[0]);
        let class_ids = as_f32(&outputs[1]);
        let scores = as_f32(&outputs[2]);

        let decoded = ssd::decode(scores, boxes, class_ids, self.box_order, self.thresh)?;
        Ok(decoded
            .into_iter()
            .map(|d| {
                let (x1, y1, x2, y2) = d.rect;
                self.to_detection(d.class_id, d.score, ctx.norm_corners_to_frame_rect(x1, y1, x2, y2))
            })
            .collect())
    }

    fn decode_fasterrcnn(&self, outputs: &[Blob], ctx: &PreProcContext) -> Result<Vec<Detection>, PostProcError> {
        if outputs.len() != 1 {
            return Err(PostProcError::UnexpectedOutputCount {
                expected: 1,
                actual: outputs.len(),
            });
        }
        let decoded = fasterrcnn::decode(as_f32(&outputs[0]), self.thresh)?;
        Ok(decoded
            .into_iter()
            .map(|d| {
                let (x1, y1, x2, y2) = d.rect;
                self.to_detection(d.class_id, d.score, ctx.norm_corners_to_frame_rect(x1, y1, x2, y2))
            })
            .collect())
    }

    fn decode_yolo(&self, outputs: &[Blob], ctx: &PreProcContext) -> Result<Vec<Detection>, PostProcError> {
        if outputs.len() != 1 {
            return Err(PostProcError::UnexpectedOutputCount {
                expected: 1,
                actual: outputs.len(),
            });
        }
        let row_len = 5 + self.num_classes;
        let decoded = yolo::decode(as_f32(&outputs[0]), row_len, self.num_classes, self.thresh)?;
        Ok(decoded
            .into_iter()
            .map(|d| {
                let (x1, y1, x2, y2) = d.rect;
                self.to_detection(d.class_id, d.score, ctx.net_corners_to_frame_rect(x1, y1, x2, y2))
            })
            .collect())
    }

    fn decode_rawyolo(&self, outputs: &[Blob], ctx: &PreProcContext) -> Result<Vec<Detection>, PostProcError> {
        let variant = self.detect_type.raw_yolo_variant().expect("raw-yolo detect type");
        if self.anchors.len() != outputs.len() {
            return Err(PostProcError::AnchorMismatch {
                expected_groups: outputs.len(),
                got_groups: self.anchors.len(),
            });
        }

        let input_size = ctx_net_size(ctx);
        let mut raw = Vec::new();
        for (blob, anchors) in zaru_utils::iter::zip_exact(outputs.iter(), &self.anchors) {
            let dims = blob.attr().dims();
            let (num_anchors, grid_h, grid_w) = match dims {
                [a, _channels, h, w] => (*a, *h, *w),
                _ => {
                    return Err(PostProcError::UnexpectedOutputCount {
                        expected: 4,
                        actual: dims.len(),
                    })
                }
            };

            let decoded = rawyolo::decode_layer(
                as_f32(blob),
                num_anchors,
                self.num_classes,
                grid_h,
                grid_w,
                anchors,
                variant,
                input_size,
                self.thresh,
            );
            raw.extend(decoded.into_iter().map(|d| {
                let (x1, y1, x2, y2) = d.rect;
                self.to_detection(d.class_id, d.confidence, ctx.net_corners_to_frame_rect(x1, y1, x2, y2))
            }));
        }
        Ok(raw)
    }

    fn to_detection(&self, class_id: u32, score: f32, rect: zaru_image::Rect) -> Detection {
        Detection {
            class_id,
            label: self.labels.get(class_id),
            score,
            rect,
        }
    }

    /// Emits one text line per detection and, if `overlay` is set, draws a filled box for each.
    pub fn report(&self, detections: &[Detection], out_img: Option<&mut Image>, overlay: bool) -> Vec<String> {
        if detections.is_empty() {
            return vec!["(no detections above threshold)".to_string()];
        }

        if overlay {
            if let Some(out_img) = out_img {
                for det in detections {
                    let color = Color::from_rgb8(255, 0, 0).with_alpha(self.alpha);
                    draw::filled_rect(out_img.as_raw_mut(), det.rect, color);
                }
            }
        }

        detections
            .iter()
            .map(|d| format!("{}: {:.1}%", d.label, d.score * 100.0))
            .collect()
    }
}

fn as_f32(blob: &Blob) -> &[f32] {
    blob.as_f32()
        .expect("detect output must be f32 (network stage dequantizes integer outputs)")
}

fn ctx_net_size(ctx: &PreProcContext) -> (u32, u32) {
    let size = ctx.net_size();
    (size.width(), size.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LabelMap;
    use zaru_image::Resolution;
    use zaru_tensor::{ElementType, Layout, Quant, TensorAttr};

    fn blob(dims: Vec<usize>, values: &[f32]) -> Blob {
        let attr = TensorAttr::new(Layout::Na, ElementType::F32, dims, Quant::None).unwrap();
        Blob::from_slice(attr, values).unwrap()
    }

    #[test]
    fn ssd_decodes_and_remaps_to_frame() {
        let mut d = Detect::new(DetectType::Ssd, LabelMap::empty(), 1);
        d.set_thresh(0.5);
        let ctx = PreProcContext::identity(Resolution::new(100, 100));
        let boxes = blob(vec![4], &[0.1, 0.2, 0.6, 0.7]);
        let classes = blob(vec![1], &[0.0]);
        let scores = blob(vec![1], &[0.9]);
        let out = d.process(&[boxes, classes, scores], &ctx).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 0);
    }

    #[test]
    fn empty_report_names_no_detections() {
        let d = Detect::new(DetectType::Ssd, LabelMap::empty(), 1);
        assert_eq!(d.report(&[], None, false), ["(no detections above threshold)"]);
    }
}
