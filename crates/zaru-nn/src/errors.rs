use zaru_tensor::TensorAttr;

/// Errors surfaced by the network stage.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// `process()` was called before `load()` finished (or before it was started). Recovered
    /// locally by the pipeline: the frame is skipped and a "Network loading..." overlay shown.
    #[error("network has not finished loading")]
    ModelNotLoaded,

    /// The backend SDK reported a failure while loading or running the model.
    #[error("backend failure: {0}")]
    BackendFailure(String),

    /// Input blobs did not match the network's declared input attributes.
    #[error("input blob attrs {actual:?} do not match declared {expected:?}")]
    ShapeMismatch {
        expected: TensorAttr,
        actual: TensorAttr,
    },
}
