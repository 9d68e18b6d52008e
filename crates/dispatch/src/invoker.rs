//! Remote-invocation handoff.
//!
//! The packaged archive has to reach the intermediate storage location,
//! which is what triggers downstream execution -- the invocation is
//! fire-and-forget, with no completion callback beyond the result
//! artifact appearing later. Two interchangeable handoffs exist: an
//! external invoker CLI, and a direct upload through the object store
//! (the intermediate bucket is watched downstream, so the upload itself
//! is the trigger).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use gpuq_cloud::{ObjectStore, StoreError};

/// Errors from the archive handoff.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("Failed to run invoker command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Invoker command failed (exit {exit_code:?}): {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Archive upload failed: {0}")]
    Upload(#[from] StoreError),
}

/// Hands a packaged archive to the remote execution engine. Returns once
/// the handoff is accepted; completion is observed separately through
/// the result poller.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Trigger execution for an archive, targeting the given key inside
    /// the intermediate bucket.
    async fn invoke(&self, archive: &Path, archive_key: &str) -> Result<(), InvokeError>;
}

/// Invoker shelling out to an external CLI tool. Only the exit status is
/// checked; the tool produces no other output contract.
pub struct CliInvoker {
    program: PathBuf,
    bucket: String,
}

impl CliInvoker {
    pub fn new(program: PathBuf, bucket: String) -> Self {
        Self { program, bucket }
    }
}

#[async_trait]
impl FunctionInvoker for CliInvoker {
    async fn invoke(&self, archive: &Path, archive_key: &str) -> Result<(), InvokeError> {
        let target = format!("s3://{}/{}", self.bucket, archive_key);
        tracing::info!(
            program = %self.program.display(),
            archive = %archive.display(),
            target = %target,
            "Invoking remote execution",
        );

        let output = Command::new(&self.program)
            .arg(archive)
            .arg(&target)
            .output()
            .await?;

        if !output.status.success() {
            return Err(InvokeError::Failed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Invoker that uploads the archive straight into the watched
/// intermediate bucket through the object store.
pub struct UploadInvoker {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl UploadInvoker {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }
}

#[async_trait]
impl FunctionInvoker for UploadInvoker {
    async fn invoke(&self, archive: &Path, archive_key: &str) -> Result<(), InvokeError> {
        tracing::info!(
            bucket = %self.bucket,
            key = archive_key,
            "Uploading archive to trigger remote execution",
        );
        self.store.upload(&self.bucket, archive_key, archive).await?;
        Ok(())
    }
}
