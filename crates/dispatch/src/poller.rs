//! Result artifact polling.
//!
//! Downstream execution is fire-and-forget, so the appearance of the
//! deterministically named result artifact is the only completion
//! signal. The poller lists the output bucket at a fixed interval with
//! no attempt bound: a job that never produces output keeps its lease
//! until the process is interrupted.

use std::time::Duration;

use gpuq_cloud::{ObjectStore, StoreError};

/// Poll the output bucket until a key containing `needle` exists.
///
/// Listing failures abort the poll (and thereby fail the job task);
/// an absent artifact just schedules the next poll.
pub async fn poll_until_present(
    store: &dyn ObjectStore,
    bucket: &str,
    needle: &str,
    interval: Duration,
) -> Result<(), StoreError> {
    loop {
        tracing::debug!(bucket, needle, "Polling output bucket for result artifact");
        let keys = store.list_keys(bucket).await?;

        if keys.iter().any(|key| key.contains(needle)) {
            tracing::info!(bucket, needle, "Result artifact found");
            return Ok(());
        }

        tracing::debug!(
            bucket,
            needle,
            retry_secs = interval.as_secs(),
            "Result artifact not present yet",
        );
        tokio::time::sleep(interval).await;
    }
}
