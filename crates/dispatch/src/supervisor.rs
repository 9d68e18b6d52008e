//! Dispatch supervisor.
//!
//! Owns the active-allocation registry and spawns one independent task
//! per granted lease. The release discipline is structural: the spawned
//! wrapper runs the job body under `catch_unwind` and performs the
//! release afterwards, so completion, failure, and panic all funnel
//! through the same single release point. The interrupt path claims
//! whatever is still registered via [`AllocationRegistry::drain`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;

use gpuq_cloud::ObjectStore;
use gpuq_sched::{GrantedLease, Scheduler};

use crate::invoker::FunctionInvoker;
use crate::registry::{Allocation, AllocationRegistry};
use crate::task::{run_job, JobParams};

/// Spawns and tracks job tasks, one per granted allocation.
pub struct DispatchSupervisor {
    registry: Arc<AllocationRegistry>,
    scheduler: Arc<dyn Scheduler>,
    store: Arc<dyn ObjectStore>,
    invoker: Arc<dyn FunctionInvoker>,
    params: JobParams,
}

impl DispatchSupervisor {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn ObjectStore>,
        invoker: Arc<dyn FunctionInvoker>,
        params: JobParams,
    ) -> Self {
        Self {
            registry: Arc::new(AllocationRegistry::new()),
            scheduler,
            store,
            invoker,
            params,
        }
    }

    /// Register the allocation and spawn its job task.
    ///
    /// Returns once the task is launched -- the caller may then
    /// acknowledge the source message; it must not wait for completion.
    pub async fn launch(
        &self,
        message_id: &str,
        body: &str,
        lease: GrantedLease,
    ) -> JoinHandle<()> {
        let job_id = lease.job_id.clone();
        self.registry
            .register(Allocation {
                job_id: job_id.clone(),
                message_id: message_id.to_string(),
            })
            .await;
        tracing::info!(job_id = %job_id, message_id, "Job task launched");

        let registry = Arc::clone(&self.registry);
        let scheduler = Arc::clone(&self.scheduler);
        let store = Arc::clone(&self.store);
        let invoker = Arc::clone(&self.invoker);
        let params = self.params.clone();
        let message_id = message_id.to_string();
        let body = body.to_string();

        tokio::spawn(async move {
            let job = run_job(
                store.as_ref(),
                invoker.as_ref(),
                &params,
                &message_id,
                &body,
                &lease.config_lines,
            );

            match AssertUnwindSafe(job).catch_unwind().await {
                Ok(Ok(())) => {
                    tracing::info!(job_id = %job_id, message_id = %message_id, "Job completed");
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        job_id = %job_id,
                        message_id = %message_id,
                        error = %e,
                        "Job failed",
                    );
                }
                Err(_) => {
                    tracing::error!(
                        job_id = %job_id,
                        message_id = %message_id,
                        "Job panicked",
                    );
                }
            }

            release(&registry, scheduler.as_ref(), &job_id).await;
        })
    }

    /// Release every allocation still live (interrupt path).
    ///
    /// Race-safe against tasks finishing concurrently: a lease already
    /// claimed by its own task is no longer in the registry, and the
    /// drain makes this call the exclusive releaser of the rest.
    pub async fn release_all(&self) -> usize {
        let live = self.registry.drain().await;
        let count = live.len();
        if count > 0 {
            tracing::info!(count, "Releasing all live allocations");
        }

        for allocation in live {
            if let Err(e) = self.scheduler.deallocate(&allocation.job_id).await {
                tracing::error!(
                    job_id = %allocation.job_id,
                    message_id = %allocation.message_id,
                    error = %e,
                    "Failed to deallocate scheduler job",
                );
            }
        }
        count
    }

    /// Number of allocations currently live.
    pub async fn active_count(&self) -> usize {
        self.registry.active_count().await
    }
}

/// Claim the allocation through the registry and release it. A lost
/// claim means the interrupt path already took it.
async fn release(registry: &AllocationRegistry, scheduler: &dyn Scheduler, job_id: &str) {
    if registry.deregister(job_id).await.is_none() {
        return;
    }

    if let Err(e) = scheduler.deallocate(job_id).await {
        // Best-effort: the resource manager reclaims stale leases on
        // its own, so a failed release is reported, never fatal.
        tracing::error!(job_id, error = %e, "Failed to deallocate scheduler job");
    }
}
