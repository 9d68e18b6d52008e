//! Consumer loop tests.
//!
//! Covers the acknowledgment ordering contract (allocation before
//! acknowledgment before task completion), the abandon-on-request-error
//! path, and the empty-queue backoff, using in-memory fakes for the
//! queue, the scheduler, and the dispatch dependencies.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use gpuq_cloud::{
    MessageQueue, ObjectStore, QueueError, QueueMessage, StoreError,
};
use gpuq_dispatch::{DispatchSupervisor, FunctionInvoker, InvokeError, JobParams};
use gpuq_sched::{AllocationOutcome, GrantedLease, SchedError, Scheduler};
use gpuq_worker::consumer::{Consumer, PollOutcome};

const BODY: &str = r#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"in/img.jpg"}}}]}"#;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Queue fake fed from a scripted message list; empty script = empty queue.
/// Optionally cancels a token once a receive-call budget is spent, so
/// `run()` tests terminate deterministically.
struct FakeQueue {
    script: Mutex<Vec<QueueMessage>>,
    deleted: Mutex<Vec<String>>,
    receive_calls: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeQueue {
    fn with_messages(messages: Vec<QueueMessage>) -> Self {
        Self {
            script: Mutex::new(messages),
            deleted: Mutex::new(Vec::new()),
            receive_calls: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    fn empty_cancelling_after(calls: usize, cancel: CancellationToken) -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            receive_calls: AtomicUsize::new(0),
            cancel_after: Some((calls, cancel)),
        }
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageQueue for FakeQueue {
    async fn receive_one(&self) -> Result<Option<QueueMessage>, QueueError> {
        let calls = self.receive_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((budget, cancel)) = &self.cancel_after {
            if calls >= *budget {
                cancel.cancel();
            }
        }
        Ok(self.script.lock().unwrap().pop())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.deleted.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }
}

/// Scheduler fake fed from scripted outcomes, recording deallocations.
struct ScriptedScheduler {
    script: Mutex<Vec<AllocationOutcome>>,
    alloc_calls: AtomicUsize,
    deallocated: Mutex<Vec<String>>,
}

impl ScriptedScheduler {
    fn new(script: Vec<AllocationOutcome>) -> Self {
        Self {
            script: Mutex::new(script),
            alloc_calls: AtomicUsize::new(0),
            deallocated: Mutex::new(Vec::new()),
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

    async fn deallocate(&self, job_id: &str) -> Result<(), SchedError> {
        self.deallocated.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
}

/// Store fake whose downloads never return, keeping launched tasks live.
struct HangingStore;

#[async_trait]
impl ObjectStore for HangingStore {
    async fn download(&self, _: &str, _: &str, _: &Path) -> Result<(), StoreError> {
        futures::future::pending::<()>().await;
        unreachable!()
    }

    async fn upload(&self, _: &str, _: &str, _: &Path) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_keys(&self, _: &str) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

struct NoopInvoker;

#[async_trait]
impl FunctionInvoker for NoopInvoker {
    async fn invoke(&self, _: &Path, _: &str) -> Result<(), InvokeError> {
        Ok(())
    }
}

struct Fixture {
    queue: Arc<FakeQueue>,
    scheduler: Arc<ScriptedScheduler>,
    supervisor: Arc<DispatchSupervisor>,
    consumer: Consumer,
    _staging: tempfile::TempDir,
}

fn fixture(queue: FakeQueue, scheduler: ScriptedScheduler) -> Fixture {
    let staging = tempfile::tempdir().unwrap();
    let queue = Arc::new(queue);
    let scheduler = Arc::new(scheduler);
    let supervisor = Arc::new(DispatchSupervisor::new(
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        Arc::new(HangingStore),
        Arc::new(NoopInvoker),
        JobParams {
            staging_dir: staging.path().to_path_buf(),
            intermediate: "ib/inter".parse().unwrap(),
            output: "ob/out".parse().unwrap(),
            result_poll_interval: Duration::from_secs(60),
        },
    ));
    let consumer = Consumer::new(
        Arc::clone(&queue) as Arc<dyn MessageQueue>,
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        Arc::clone(&supervisor),
        Duration::from_secs(10),
        Duration::from_secs(30),
    );
    Fixture {
        queue,
        scheduler,
        supervisor,
        consumer,
        _staging: staging,
    }
}

fn message(id: &str) -> QueueMessage {
    QueueMessage {
        id: id.to_string(),
        receipt_handle: format!("rh-{id}"),
        body: BODY.to_string(),
    }
}

fn granted(job_id: &str) -> AllocationOutcome {
    AllocationOutcome::Granted(GrantedLease {
        job_id: job_id.to_string(),
        config_lines: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Acknowledgment ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatch_acknowledges_after_launch_and_before_completion() {
    let fx = fixture(
        FakeQueue::with_messages(vec![message("abc")]),
        ScriptedScheduler::new(vec![granted("42")]),
    );

    let outcome = fx.consumer.poll_once().await.unwrap();

    assert_matches!(
        outcome,
        PollOutcome::Dispatched { message_id, job_id }
            if message_id == "abc" && job_id == "42"
    );
    // The message is acknowledged...
    assert_eq!(fx.queue.deleted(), vec!["rh-abc"]);
    // ...while the task (hung in its download) is still running, so the
    // acknowledgment cannot have waited for completion.
    assert_eq!(fx.supervisor.active_count().await, 1);
    assert!(fx.scheduler.deallocated.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Request-error path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_error_leaves_message_unacknowledged_and_releases_nothing() {
    let fx = fixture(
        FakeQueue::with_messages(vec![message("abc")]),
        ScriptedScheduler::new(vec![AllocationOutcome::RequestError(
            "manager unreachable".to_string(),
        )]),
    );

    let outcome = fx.consumer.poll_once().await.unwrap();

    assert_matches!(outcome, PollOutcome::Abandoned { message_id } if message_id == "abc");
    // Never acknowledged: the visibility timeout will redeliver it.
    assert!(fx.queue.deleted().is_empty());
    // Nothing was allocated, so nothing may be released.
    assert!(fx.scheduler.deallocated.lock().unwrap().is_empty());
    assert_eq!(fx.supervisor.active_count().await, 0);
}

// ---------------------------------------------------------------------------
// Empty queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_poll_makes_no_allocation_calls() {
    let fx = fixture(
        FakeQueue::with_messages(Vec::new()),
        ScriptedScheduler::new(Vec::new()),
    );

    let outcome = fx.consumer.poll_once().await.unwrap();

    assert_eq!(outcome, PollOutcome::Empty);
    assert_eq!(fx.scheduler.alloc_calls.load(Ordering::SeqCst), 0);
    assert!(fx.queue.deleted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_sleeps_the_empty_wait_between_polls() {
    let cancel = CancellationToken::new();
    let empty_backoff = Duration::from_secs(10);

    let staging = tempfile::tempdir().unwrap();
    let queue = Arc::new(FakeQueue::empty_cancelling_after(3, cancel.clone()));
    let scheduler = Arc::new(ScriptedScheduler::new(Vec::new()));
    let supervisor = Arc::new(DispatchSupervisor::new(
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        Arc::new(HangingStore),
        Arc::new(NoopInvoker),
        JobParams {
            staging_dir: staging.path().to_path_buf(),
            intermediate: "ib/inter".parse().unwrap(),
            output: "ob/out".parse().unwrap(),
            result_poll_interval: Duration::from_secs(60),
        },
    ));
    let consumer = Consumer::new(
        Arc::clone(&queue) as Arc<dyn MessageQueue>,
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        supervisor,
        empty_backoff,
        Duration::from_secs(30),
    );

    let started = tokio::time::Instant::now();
    consumer.run(cancel).await.unwrap();

    // Three empty polls; the third cancels before its backoff sleep, so
    // exactly two full backoff intervals elapsed on the virtual clock.
    assert_eq!(queue.receive_calls.load(Ordering::SeqCst), 3);
    assert_eq!(started.elapsed(), empty_backoff * 2);
    assert_eq!(scheduler.alloc_calls.load(Ordering::SeqCst), 0);
}
