//! The sequential consumer loop.
//!
//! One message at a time: long-poll the queue, run the blocking
//! allocation state machine, launch the job task, then acknowledge the
//! message. The loop never waits for a task -- acknowledgment happens
//! right after a successful launch, which is what lets many leases run
//! concurrently while the consumer keeps polling.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use gpuq_cloud::{MessageQueue, QueueError};
use gpuq_dispatch::DispatchSupervisor;
use gpuq_sched::{allocate_until_decided, AllocationDecision, Scheduler};

/// What one consumer iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The queue was empty for the whole poll.
    Empty,
    /// Allocation failed permanently; the message was left
    /// unacknowledged so the visibility timeout redelivers it.
    Abandoned { message_id: String },
    /// A job task was launched and the message acknowledged.
    Dispatched { message_id: String, job_id: String },
}

/// Queue consumer plus allocator, run in lock-step on one loop.
pub struct Consumer {
    queue: Arc<dyn MessageQueue>,
    scheduler: Arc<dyn Scheduler>,
    supervisor: Arc<DispatchSupervisor>,
    empty_queue_backoff: Duration,
    alloc_retry_interval: Duration,
}

impl Consumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        scheduler: Arc<dyn Scheduler>,
        supervisor: Arc<DispatchSupervisor>,
        empty_queue_backoff: Duration,
        alloc_retry_interval: Duration,
    ) -> Self {
        Self {
            queue,
            scheduler,
            supervisor,
            empty_queue_backoff,
            alloc_retry_interval,
        }
    }

    /// Run the consumer loop until the cancellation token is triggered.
    ///
    /// Returns `Err` only on queue transport failures, which are fatal
    /// to the process.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), QueueError> {
        tracing::info!("Consumer loop started");

        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Consumer loop shutting down");
                    return Ok(());
                }
                outcome = self.poll_once() => outcome?,
            };

            if outcome == PollOutcome::Empty {
                tracing::info!(
                    wait_secs = self.empty_queue_backoff.as_secs(),
                    "Queue empty, backing off before the next poll",
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Consumer loop shutting down");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(self.empty_queue_backoff) => {}
                }
            }
        }
    }

    /// One consumer iteration: poll, allocate, launch, acknowledge.
    pub async fn poll_once(&self) -> Result<PollOutcome, QueueError> {
        tracing::debug!("Polling the queue");
        let Some(message) = self.queue.receive_one().await? else {
            return Ok(PollOutcome::Empty);
        };
        tracing::info!(message_id = %message.id, "Message pulled from queue");

        match allocate_until_decided(self.scheduler.as_ref(), self.alloc_retry_interval).await {
            AllocationDecision::RequestError(reason) => {
                tracing::warn!(
                    message_id = %message.id,
                    reason = %reason,
                    "Abandoning message, left unacknowledged for redelivery",
                );
                Ok(PollOutcome::Abandoned {
                    message_id: message.id,
                })
            }
            AllocationDecision::Granted(lease) => {
                let job_id = lease.job_id.clone();
                let _task = self
                    .supervisor
                    .launch(&message.id, &message.body, lease)
                    .await;

                // Launch strictly precedes acknowledgment. A failed
                // delete is fatal: the job is already running, and a
                // redelivered duplicate has no recovery story.
                self.queue.delete(&message.receipt_handle).await?;
                tracing::info!(message_id = %message.id, job_id = %job_id, "Message acknowledged");

                Ok(PollOutcome::Dispatched {
                    message_id: message.id,
                    job_id,
                })
            }
        }
    }
}
