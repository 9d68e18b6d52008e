//! External scheduler CLI invocations.
//!
//! Allocation and deallocation both shell out to the scheduler binary
//! (`-alloc` / `-dealloc`). The allocation call runs under an optional
//! wall-clock deadline; deallocation never gets one, since an abandoned
//! release is exactly what the deadline would produce.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::response::{parse_alloc_response, AllocationOutcome};

/// Scheduler connection and allocation parameters.
#[derive(Debug, Clone)]
pub struct SchedConfig {
    /// Path to the scheduler CLI binary.
    pub program: PathBuf,
    /// Resource manager address.
    pub address: String,
    /// Resource manager port.
    pub port: String,
    /// Number of GPUs to request per allocation.
    pub gpus: u32,
    /// Optional wall-clock deadline for one allocation attempt.
    pub alloc_deadline: Option<Duration>,
}

/// Errors from scheduler CLI invocations.
///
/// Allocation failures are folded into [`AllocationOutcome`]; this enum
/// only surfaces from deallocation, where callers log and move on.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    #[error("Failed to run scheduler command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Scheduler deallocation failed (exit {exit_code:?}): {stderr}")]
    DeallocFailed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Allocation/release operations against the external resource manager,
/// implemented by [`SsgmCli`] in production and by fakes in tests.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run one allocation attempt.
    ///
    /// Every failure mode is expressed in the returned outcome: spawn
    /// errors and non-zero exits map to
    /// [`AllocationOutcome::RequestError`], a deadline overrun to
    /// [`AllocationOutcome::TimedOut`].
    async fn allocate(&self) -> AllocationOutcome;

    /// Release a previously granted lease.
    async fn deallocate(&self, job_id: &str) -> Result<(), SchedError>;
}

/// Scheduler driver shelling out to the SSGM binary.
pub struct SsgmCli {
    config: SchedConfig,
}

impl SsgmCli {
    pub fn new(config: SchedConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Scheduler for SsgmCli {
    async fn allocate(&self) -> AllocationOutcome {
        let cfg = &self.config;
        tracing::debug!(
            program = %cfg.program.display(),
            gpus = cfg.gpus,
            "Requesting scheduler allocation",
        );

        let invocation = Command::new(&cfg.program)
            .args(["-S", &cfg.address, "-P", &cfg.port, "-alloc", "-g"])
            .arg(cfg.gpus.to_string())
            .output();

        let result = match cfg.alloc_deadline {
            Some(deadline) => match tokio::time::timeout(deadline, invocation).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(
                        deadline_secs = deadline.as_secs(),
                        "Allocation attempt hit its deadline",
                    );
                    return AllocationOutcome::TimedOut;
                }
            },
            None => invocation.await,
        };

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                return AllocationOutcome::RequestError(format!(
                    "failed to run scheduler command: {e}"
                ))
            }
        };

        if !output.status.success() {
            return AllocationOutcome::RequestError(format!(
                "scheduler command exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        parse_alloc_response(&String::from_utf8_lossy(&output.stdout))
    }

    async fn deallocate(&self, job_id: &str) -> Result<(), SchedError> {
        let cfg = &self.config;
        tracing::info!(job_id, "Deallocating scheduler job");

        let output = Command::new(&cfg.program)
            .args(["-S", &cfg.address, "-P", &cfg.port, "-dealloc", "-j", job_id])
            .output()
            .await?;

        if !output.status.success() {
            return Err(SchedError::DeallocFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::info!(job_id, "Scheduler job deallocated");
        Ok(())
    }
}
