//! Blocking allocation with busy retry.
//!
//! Runs on the consumer path, one instance per message: keep attempting
//! until the scheduler either grants the lease or reports a request
//! error. `Busy` sleeps a fixed retry interval; a deadline overrun
//! retries immediately, since the attempt already consumed its deadline.

use std::time::Duration;

use crate::client::Scheduler;
use crate::response::{AllocationOutcome, GrantedLease};

/// Terminal result of the allocation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationDecision {
    /// The lease was granted; the message can be dispatched.
    Granted(GrantedLease),
    /// The attempt failed permanently; the message is abandoned
    /// (left unacknowledged for redelivery).
    RequestError(String),
}

/// Attempt allocation until the scheduler grants or errors.
///
/// Retries forever on `Busy` (sleeping `retry_interval` between
/// attempts) and on `TimedOut` (immediately, no extra sleep).
pub async fn allocate_until_decided(
    scheduler: &dyn Scheduler,
    retry_interval: Duration,
) -> AllocationDecision {
    loop {
        match scheduler.allocate().await {
            AllocationOutcome::Granted(lease) => {
                tracing::info!(job_id = %lease.job_id, "Scheduler granted allocation");
                return AllocationDecision::Granted(lease);
            }
            AllocationOutcome::RequestError(reason) => {
                tracing::warn!(reason = %reason, "Scheduler allocation request failed");
                return AllocationDecision::RequestError(reason);
            }
            AllocationOutcome::Busy => {
                tracing::info!(
                    retry_secs = retry_interval.as_secs(),
                    "Scheduler busy, retrying after backoff",
                );
                tokio::time::sleep(retry_interval).await;
            }
            AllocationOutcome::TimedOut => {
                tracing::info!("Allocation attempt timed out, retrying immediately");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::client::SchedError;
    use crate::response::GrantedLease;

    /// Scheduler fake fed from a scripted list of outcomes.
    struct ScriptedScheduler {
        script: Mutex<Vec<AllocationOutcome>>,
        alloc_calls: AtomicUsize,
        dealloc_calls: AtomicUsize,
    }

    impl ScriptedScheduler {
        fn new(script: Vec<AllocationOutcome>) -> Self {
            Self {
                script: Mutex::new(script),
                alloc_calls: AtomicUsize::new(0),
                dealloc_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Scheduler for ScriptedScheduler {
        async fn allocate(&self) -> AllocationOutcome {
            self.alloc_calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .expect("scheduler fake ran out of scripted outcomes")
        }

        async fn deallocate(&self, _job_id: &str) -> Result<(), SchedError> {
            self.dealloc_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn granted(job_id: &str) -> AllocationOutcome {
        AllocationOutcome::Granted(GrantedLease {
            job_id: job_id.to_string(),
            config_lines: Vec::new(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn busy_n_times_then_granted_makes_n_plus_one_calls_and_n_sleeps() {
        let retry = Duration::from_secs(30);
        let n = 3;
        // Script is popped back-to-front: three Busy answers, then a grant.
        let mut script = vec![granted("42")];
        script.extend(vec![AllocationOutcome::Busy; n]);
        let scheduler = ScriptedScheduler::new(script);

        let started = tokio::time::Instant::now();
        let decision = allocate_until_decided(&scheduler, retry).await;

        assert_matches!(decision, AllocationDecision::Granted(lease) if lease.job_id == "42");
        assert_eq!(scheduler.alloc_calls.load(Ordering::SeqCst), n + 1);
        // Paused time advances only through sleeps: exactly n retry intervals.
        assert_eq!(started.elapsed(), retry * n as u32);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_retries_without_sleeping() {
        let retry = Duration::from_secs(30);
        let scheduler = ScriptedScheduler::new(vec![
            granted("7"),
            AllocationOutcome::TimedOut,
            AllocationOutcome::TimedOut,
        ]);

        let started = tokio::time::Instant::now();
        let decision = allocate_until_decided(&scheduler, retry).await;

        assert_matches!(decision, AllocationDecision::Granted(_));
        assert_eq!(scheduler.alloc_calls.load(Ordering::SeqCst), 3);
        // No backoff sleeps: paused time never advanced.
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn request_error_is_terminal_and_never_deallocates() {
        let scheduler = ScriptedScheduler::new(vec![AllocationOutcome::RequestError(
            "no route to manager".to_string(),
        )]);

        let decision = allocate_until_decided(&scheduler, Duration::from_secs(1)).await;

        assert_matches!(decision, AllocationDecision::RequestError(_));
        assert_eq!(scheduler.alloc_calls.load(Ordering::SeqCst), 1);
        // Nothing was allocated, so nothing may be released.
        assert_eq!(scheduler.dealloc_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_then_request_error_sleeps_once_then_stops() {
        let retry = Duration::from_secs(10);
        let scheduler = ScriptedScheduler::new(vec![
            AllocationOutcome::RequestError("bad request".to_string()),
            AllocationOutcome::Busy,
        ]);

        let started = tokio::time::Instant::now();
        let decision = allocate_until_decided(&scheduler, retry).await;

        assert_matches!(decision, AllocationDecision::RequestError(_));
        assert_eq!(scheduler.alloc_calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), retry);
    }
}
