//! Active-allocation registry.
//!
//! The only shared mutable state in the system: every granted lease is
//! registered here the moment a job task is created and removed when its
//! release runs. Removal doubles as the release claim -- whichever path
//! removes an entry (the task's own cleanup or the interrupt handler's
//! [`AllocationRegistry::drain`]) is the one that deallocates it, which
//! is what makes the release exactly-once under concurrent interruption.

use std::collections::HashMap;

use tokio::sync::Mutex;

/// A live lease on scheduler resources, bound to one queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub job_id: String,
    pub message_id: String,
}

/// Process-wide map of live allocations keyed by scheduler job id.
#[derive(Default)]
pub struct AllocationRegistry {
    inner: Mutex<HashMap<String, Allocation>>,
}

impl AllocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly granted allocation.
    pub async fn register(&self, allocation: Allocation) {
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.insert(allocation.job_id.clone(), allocation) {
            // The scheduler must not reuse a live job id; if it does,
            // the old entry can no longer be released through us.
            tracing::warn!(
                job_id = %previous.job_id,
                message_id = %previous.message_id,
                "Registered a duplicate job id, replacing live allocation",
            );
        }
    }

    /// Claim an allocation for release. Returns `None` when another path
    /// already claimed it.
    pub async fn deregister(&self, job_id: &str) -> Option<Allocation> {
        self.inner.lock().await.remove(job_id)
    }

    /// Claim every live allocation at once (interrupt path).
    pub async fn drain(&self) -> Vec<Allocation> {
        self.inner.lock().await.drain().map(|(_, a)| a).collect()
    }

    /// Number of live allocations.
    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.len()
    }
}
