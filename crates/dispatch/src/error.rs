use gpuq_cloud::StoreError;
use gpuq_core::CoreError;

use crate::invoker::InvokeError;

/// Errors local to one job task. None of these escape the task: the
/// supervisor logs them, releases the lease, and the consumer loop
/// continues undisturbed.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Staging(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error while staging: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive packaging failed (exit {exit_code:?}): {stderr}")]
    Package {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}
