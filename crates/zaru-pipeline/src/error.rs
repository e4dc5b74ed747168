//! Error taxonomy surfaced by the pipeline controller (§7).

use zaru_nn::NetworkError;
use zaru_postproc::PostProcError;
use zaru_preproc::PreProcError;
use zaru_tensor::TensorSpecError;

use crate::zoo::ZooParseError;

/// Errors the pipeline controller can surface. `process()` itself never returns one of these —
/// they are caught at the boundary and turned into an overlay/log line (§7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {

    #[error(transparent)]
    TensorSpec(#[from] TensorSpecError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    PostProc(#[from] PostProcError),
    #[error(transparent)]
    PreProc(#[from] PreProcError),
    #[error(transparent)]
    Zoo(#[from] ZooParseError),
    #[error("zoo entry's {0} type is Custom but no custom implementation was installed")]
    MissingCustomStage(&'static str),
    #[error("zoo entry declares no model path")]
    MissingModelPath,
    #[error("no zoo file has been loaded")]
    NoZooLoaded,
    #[error("no pipe has been selected")]
    NoPipeSelected,
}

impl PipelineError {
    /// Whether this error should be recovered locally (frame skipped, pipeline stays *ready*)
    /// rather than transitioning the pipeline to *error* (§7).
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(self, PipelineError::Network(NetworkError::ModelNotLoaded))
    }

    /// Whether a failed reconfiguration should leave whatever pipe was already running in place
    /// (§7: "ZooParseError ... previous pipe remains active") rather than error out the frame.
    pub fn keeps_previous_pipe_active(&self) -> bool {
        matches!(self, PipelineError::Zoo(_))
    }
}
