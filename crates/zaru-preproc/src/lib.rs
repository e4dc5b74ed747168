//! Converts a captured frame into the input [`Blob`]s a network declares, by cropping, resizing,
//! reordering channels, applying a per-channel mean/scale and quantizing to the declared element
//! type.

mod blob_preproc;

use zaru_image::ImageView;
use zaru_tensor::{Blob, TensorAttr};

pub use blob_preproc::BlobPreProc;

/// Error produced while turning a frame into blobs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PreProcError {
    #[error(
        "pre-processor produced {actual} blob(s), network declared {expected} input tensor(s)"
    )]
    BlobCountMismatch { expected: usize, actual: usize },
    #[error("pre-processor blob {index} has attrs {actual:?}, network declared {expected:?}")]
    BlobShapeMismatch {
        index: usize,
        expected: TensorAttr,
        actual: TensorAttr,
    },
}

/// The pre-processing stage: either the built-in blob pre-processor or a user-supplied one.
pub enum PreProc {
    Blob(BlobPreProc),
    Custom(Box<dyn CustomPreProc>),
}

impl PreProc {
    /// Converts `frame` into one blob per entry in `expected`, in declared order.
    pub fn process(
        &mut self,
        frame: ImageView<'_>,
        expected: &[TensorAttr],
    ) -> Result<Vec<Blob>, PreProcError> {
        let blobs = match self {
            PreProc::Blob(p) => p.process(frame, expected)?,
            PreProc::Custom(p) => p.process(frame, expected)?,
        };
        validate_blobs(&blobs, expected)?;
        Ok(blobs)
    }
}

/// A user-supplied pre-processing stage, installed via the pipeline's `setCustomPreProc` when the
/// zoo entry's `preproc` key is `Custom`.
pub trait CustomPreProc: Send {
    fn process(
        &mut self,
        frame: ImageView<'_>,
        expected: &[TensorAttr],
    ) -> Result<Vec<Blob>, PreProcError>;
}

/// Checks that `blobs` matches `expected` in count and per-tensor attributes, the invariant every
/// [`PreProc`] variant (built-in or custom) must uphold.
fn validate_blobs(blobs: &[Blob], expected: &[TensorAttr]) -> Result<(), PreProcError> {
    if blobs.len() != expected.len() {
        return Err(PreProcError::BlobCountMismatch {
            expected: expected.len(),
            actual: blobs.len(),
        });
    }
    for (index, (blob, want)) in blobs.iter().zip(expected).enumerate() {
        if blob.attr() != want {
            return Err(PreProcError::BlobShapeMismatch {
                index,
                expected: want.clone(),
                actual: blob.attr().clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zaru_tensor::{ElementType, Layout, Quant};

    #[test]
    fn rejects_wrong_blob_count() {
        let attr = TensorAttr::new(Layout::Nchw, ElementType::F32, vec![1, 3, 2, 2], Quant::None)
            .unwrap();
        let err = validate_blobs(&[], &[attr]).unwrap_err();
        assert!(matches!(err, PreProcError::BlobCountMismatch { .. }));
    }

    #[test]
    fn rejects_mismatched_attrs() {
        let want = TensorAttr::new(Layout::Nchw, ElementType::F32, vec![1, 3, 2, 2], Quant::None)
            .unwrap();
        let got = TensorAttr::new(Layout::Nchw, ElementType::F32, vec![1, 3, 4, 4], Quant::None)
            .unwrap();
        let blob = Blob::from_bytes(got, vec![0u8; 3 * 4 * 4 * 4]).unwrap();
        let err = validate_blobs(&[blob], &[want]).unwrap_err();
        assert!(matches!(err, PreProcError::BlobShapeMismatch { .. }));
    }
}
