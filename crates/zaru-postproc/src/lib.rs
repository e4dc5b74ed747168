//! Decodes network output tensors into labeled results (§4.4) and renders overlays onto the
//! output frame. Three built-in variants — [`Classify`], [`Detect`], [`Segment`] — plus a custom
//! seat, all sharing the same `(outputs, preproc context) -> result` / `report(...)` shape.

mod classify;
mod detect;
mod label_map;
mod segment;

pub use classify::{Classify, ClassifyEntry};
pub use detect::{
    nms::{NonMaxSuppression, SuppressionMode},
    Detect, DetectType, RawYoloVariant,
};
pub use label_map::LabelMap;
pub use segment::{Segment, SegmentType};

use zaru_image::{Image, Rect, Resolution};
use zaru_tensor::Blob;

/// A single post-processed detection result (§3, "Detection").
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub label: String,
    /// Score in `[0, 1]`, already past the post-processor's threshold.
    pub score: f32,
    /// Bounding rectangle in original-image pixel coordinates, clamped to the frame.
    pub rect: Rect,
}

/// The decoded result of one post-processor invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PostProcResult {
    Classify(Vec<ClassifyEntry>),
    Detect(Vec<Detection>),
    Segment(segment::SegmentMap),
}

/// Errors raised while decoding post-processor output.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PostProcError {
    /// §4.4.2: the `anchors` parameter's group count doesn't match the number of raw-YOLO output
    /// layers (and isn't exactly 1, the "shared across all layers" shorthand).
    #[error("anchors declares {got_groups} group(s), but there are {expected_groups} raw-YOLO output layer(s)")]
    AnchorMismatch {
        expected_groups: usize,
        got_groups: usize,
    },
    #[error("malformed anchors string: {0}")]
    MalformedAnchors(String),
    #[error("post-processor expected {expected} output tensor(s), got {actual}")]
    UnexpectedOutputCount { expected: usize, actual: usize },
}

/// Supplies the post-processor with enough information about the pre-processing that happened
/// upstream to translate network-space coordinates back into original-image coordinates (§4.4,
/// "the preproc context supplies the source frame size and crop/scale inverse").
#[derive(Debug, Clone, Copy)]
pub struct PreProcContext {
    frame_size: Resolution,
    crop: Rect,
    net_size: Resolution,
}

impl PreProcContext {
    pub fn new(frame_size: Resolution, crop: Rect, net_size: Resolution) -> Self {
        Self {
            frame_size,
            crop,
            net_size,
        }
    }

    /// A context for a model that was fed the whole, unresized frame (1:1 coordinate mapping).
    pub fn identity(frame_size: Resolution) -> Self {
        Self {
            frame_size,
            crop: frame_size.rect(),
            net_size: frame_size,
        }
    }

    pub fn frame_size(&self) -> Resolution {
        self.frame_size
    }

    /// The network's input resolution, used to compute raw-YOLO layer strides.
    pub fn net_size(&self) -> Resolution {
        self.net_size
    }

    /// Maps a point in network-input pixel space back to original-frame pixel space.
    pub fn net_point_to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = self.crop.width() as f32 / self.net_size.width().max(1) as f32;
        let sy = self.crop.height() as f32 / self.net_size.height().max(1) as f32;
        (self.crop.x() as f32 + x * sx, self.crop.y() as f32 + y * sy)
    }

    /// Maps a point normalized to `[0, 1]` x `[0, 1]` (as SSD-style models emit) back to
    /// original-frame pixel space.
    pub fn norm_point_to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        self.net_point_to_frame(x * self.net_size.width() as f32, y * self.net_size.height() as f32)
    }

    /// Maps two network-space corner points to a frame-space [`Rect`], clamped to the frame.
    pub fn net_corners_to_frame_rect(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Rect {
        let (fx1, fy1) = self.net_point_to_frame(x1, y1);
        let (fx2, fy2) = self.net_point_to_frame(x2, y2);
        let rect = Rect::from_top_left(
            fx1.min(fx2).round() as i32,
            fy1.min(fy2).round() as i32,
            (fx1 - fx2).abs().round() as u32,
            (fy1 - fy2).abs().round() as u32,
        );
        zaru_image::clamp(rect, self.frame_size.width(), self.frame_size.height())
    }

    /// Maps two normalized `[0, 1]` corner points to a frame-space [`Rect`], clamped to the
    /// frame.
    pub fn norm_corners_to_frame_rect(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Rect {
        self.net_corners_to_frame_rect(
            x1 * self.net_size.width() as f32,
            y1 * self.net_size.height() as f32,
            x2 * self.net_size.width() as f32,
            y2 * self.net_size.height() as f32,
        )
    }
}

/// The post-processing stage: one of the three built-ins, or a user-supplied implementation.
pub enum PostProc {
    Classify(Classify),
    Detect(Detect),
    Segment(Segment),
    Custom(Box<dyn CustomPostProc>),
}

impl PostProc {
    pub fn process(
        &mut self,
        outputs: &[Blob],
        ctx: &PreProcContext,
    ) -> Result<PostProcResult, PostProcError> {
        match self {
            PostProc::Classify(p) => Ok(PostProcResult::Classify(p.process(outputs)?)),
            PostProc::Detect(p) => Ok(PostProcResult::Detect(p.process(outputs, ctx)?)),
            PostProc::Segment(p) => Ok(PostProcResult::Segment(p.process(outputs)?)),
            PostProc::Custom(p) => p.process(outputs, ctx),
        }
    }

    /// Emits a serial-style text report (one line per result, or a single "nothing found" line)
    /// and, if `overlay` is set, draws onto `out_img`.
    pub fn report(&self, result: &PostProcResult, out_img: Option<&mut Image>, overlay: bool) -> Vec<String> {
        match self {
            PostProc::Classify(p) => p.report(as_classify(result)),
            PostProc::Detect(p) => p.report(as_detect(result), out_img, overlay),
            PostProc::Segment(p) => p.report(as_segment(result), out_img, overlay),
            PostProc::Custom(p) => p.report(result, out_img, overlay),
        }
    }
}

fn as_classify(result: &PostProcResult) -> &[ClassifyEntry] {
    match result {
        PostProcResult::Classify(v) => v,
        _ => &[],
    }
}

fn as_detect(result: &PostProcResult) -> &[Detection] {
    match result {
        PostProcResult::Detect(v) => v,
        _ => &[],
    }
}

fn as_segment(result: &PostProcResult) -> Option<&segment::SegmentMap> {
    match result {
        PostProcResult::Segment(v) => Some(v),
        _ => None,
    }
}

/// A user-supplied post-processing stage, installed via the pipeline's `setCustomPostProc` when
/// the zoo entry's `postproc` key is `Custom`.
pub trait CustomPostProc: Send {
    fn process(
        &mut self,
        outputs: &[Blob],
        ctx: &PreProcContext,
    ) -> Result<PostProcResult, PostProcError>;

    fn report(&self, result: &PostProcResult, out_img: Option<&mut Image>, overlay: bool) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_context_is_1_to_1() {
        let ctx = PreProcContext::identity(Resolution::new(100, 50));
        let (x, y) = ctx.net_point_to_frame(10.0, 20.0);
        assert_eq!((x, y), (10.0, 20.0));
    }

    #[test]
    fn crop_and_scale_are_inverted() {
        // crop is the right half of a 100x100 frame, resized to a 50x50 network input
        let ctx = PreProcContext::new(
            Resolution::new(100, 100),
            Rect::from_top_left(50, 0, 50, 100),
            Resolution::new(50, 100),
        );
        let (x, y) = ctx.net_point_to_frame(25.0, 50.0);
        assert_eq!((x, y), (75.0, 50.0));
    }
}
