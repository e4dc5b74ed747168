//! Cross-runtime tensor attribute descriptors, tensor-spec string parsing, and the small set of
//! numeric utilities (top-k, softmax, label-to-color) shared by pre- and post-processing.

mod attr;
mod blob;
mod color;
mod softmax;
mod spec;
mod topk;

pub use attr::{ElementType, Layout, Quant, TensorAttr};
pub use blob::{Blob, BlobError};
pub use color::label_to_color;
pub use softmax::softmax;
pub use spec::{format_spec, parse_spec, TensorSpecError};
pub use topk::top_k;

/// Clamps a pixel-space rectangle to `[0, width) x [0, height)`. Re-exported for callers that
/// only depend on `zaru-tensor` and not `zaru-image` directly.
pub use zaru_image::clamp;
