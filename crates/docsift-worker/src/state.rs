//! Process-wide worker pool state.
//!
//! Shared by the poll loop, the worker tasks and the interruption handler.
//! One mutex guards the in-flight set and the statistics; it is never held
//! across an await.

use crate::pipeline::{MessageOutcome, Stage};
use crate::stats::{Statistics, StatsSnapshot};
use chrono::{DateTime, Utc};
use docsift_core::QueueMessage;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempPath;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Checkpoint data of a running task, read by evacuation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskProgress {
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub stage: Option<Stage>,
    /// e.g. `record 2/3`
    pub marker: Option<String>,
    pub local_path: Option<PathBuf>,
    /// Extracted text not yet indexed
    pub partial_text: Option<String>,
}

struct InFlightTask {
    message_id: String,
    receipt_handle: String,
    token: CancellationToken,
    progress: TaskProgress,
    acknowledged: bool,
    started_at: DateTime<Utc>,
    /// Local file handed over by a cancelled task; removed on drop.
    retained_file: Option<TempPath>,
}

/// Read-only copy of an in-flight or interrupted task.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub task_id: Uuid,
    pub message_id: String,
    pub receipt_handle: String,
    pub progress: TaskProgress,
    pub acknowledged: bool,
    pub started_at: DateTime<Utc>,
    /// `false` for tasks still running when the snapshot was taken
    pub interrupted: bool,
}

#[derive(Default)]
struct PoolInner {
    in_flight: HashMap<Uuid, InFlightTask>,
    /// Cancelled tasks awaiting evacuation and visibility extension
    interrupted: HashMap<Uuid, InFlightTask>,
    stats: Statistics,
}

pub struct WorkerPoolState {
    accepting: AtomicBool,
    admission: CancellationToken,
    cancellation: CancellationToken,
    inner: Mutex<PoolInner>,
    idle: Notify,
}

impl Default for WorkerPoolState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPoolState {
    pub fn new() -> Self {
        Self {
            accepting: AtomicBool::new(true),
            admission: CancellationToken::new(),
            cancellation: CancellationToken::new(),
            inner: Mutex::new(PoolInner::default()),
            idle: Notify::new(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, PoolInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop admitting new messages. Returns `true` only for the first call.
    pub fn stop_admission(&self) -> bool {
        let first = self.accepting.swap(false, Ordering::SeqCst);
        self.admission.cancel();
        first
    }

    /// Resolves once admission has been stopped.
    pub async fn admission_closed(&self) {
        self.admission.cancelled().await
    }

    /// Track a delivery as in flight and hand its worker a task handle.
    pub fn register(self: &Arc<Self>, message: &QueueMessage) -> TaskHandle {
        let id = Uuid::new_v4();
        let token = self.cancellation.child_token();
        self.inner().in_flight.insert(
            id,
            InFlightTask {
                message_id: message.message_id.clone(),
                receipt_handle: message.receipt_handle.clone(),
                token: token.clone(),
                progress: TaskProgress::default(),
                acknowledged: false,
                started_at: Utc::now(),
                retained_file: None,
            },
        );
        TaskHandle {
            id,
            token,
            state: Arc::clone(self),
        }
    }

    /// Remove a task from the in-flight set and count its outcome.
    ///
    /// Cancelled tasks move to the interrupted set so their receipt and any
    /// handed-over file outlive the worker.
    pub fn finish(&self, id: Uuid, outcome: &MessageOutcome) {
        let now_idle = {
            let mut inner = self.inner();
            inner.stats.record(outcome);
            if let Some(task) = inner.in_flight.remove(&id) {
                if matches!(outcome, MessageOutcome::Cancelled(_)) {
                    inner.interrupted.insert(id, task);
                }
            }
            inner.in_flight.is_empty()
        };
        if now_idle {
            self.idle.notify_waiters();
        }
    }

    /// Cancel every running task's token. Returns the number of tasks signalled.
    pub fn cancel_all(&self) -> usize {
        self.cancellation.cancel();
        self.inner().in_flight.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner().in_flight.len()
    }

    /// Wait until no task is in flight, at most `timeout`. Returns `true` when idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            if self.in_flight_count() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.in_flight_count() == 0;
            }
        }
    }

    /// Running and interrupted tasks, for evacuation and visibility extension.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        let inner = self.inner();
        let running = inner.in_flight.iter().map(|(id, t)| (id, t, false));
        let interrupted = inner.interrupted.iter().map(|(id, t)| (id, t, true));
        running
            .chain(interrupted)
            .map(|(id, task, interrupted)| TaskSnapshot {
                task_id: *id,
                message_id: task.message_id.clone(),
                receipt_handle: task.receipt_handle.clone(),
                progress: task.progress.clone(),
                acknowledged: task.acknowledged,
                started_at: task.started_at,
                interrupted,
            })
            .collect()
    }

    /// Whether a task's message still needs handing back: it was interrupted,
    /// or it is running and has not been acknowledged.
    pub fn is_unfinished(&self, id: Uuid) -> bool {
        let inner = self.inner();
        if inner.interrupted.contains_key(&id) {
            return true;
        }
        inner.in_flight.get(&id).is_some_and(|task| !task.acknowledged)
    }

    /// Drop interrupted tasks, deleting the files they retained.
    pub fn release_interrupted(&self) -> usize {
        let released: Vec<InFlightTask> = self.inner().interrupted.drain().map(|(_, t)| t).collect();
        let count = released.len();
        drop(released);
        count
    }

    pub fn statistics(&self) -> StatsSnapshot {
        self.inner().stats.snapshot()
    }

    fn with_task<F: FnOnce(&mut InFlightTask)>(&self, id: Uuid, f: F) {
        if let Some(task) = self.inner().in_flight.get_mut(&id) {
            f(task);
        }
    }
}

/// A worker's view of its own in-flight entry.
pub struct TaskHandle {
    id: Uuid,
    token: CancellationToken,
    state: Arc<WorkerPoolState>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn update<F: FnOnce(&mut TaskProgress)>(&self, f: F) {
        self.state.with_task(self.id, |task| f(&mut task.progress));
    }

    pub fn reach(&self, stage: Stage) {
        self.update(|progress| progress.stage = Some(stage));
    }

    pub fn mark_acknowledged(&self) {
        self.state.with_task(self.id, |task| task.acknowledged = true);
    }

    /// Give the local file to the pool state so evacuation can still read it.
    pub fn hand_over(&self, file: TempPath) {
        let path = file.to_path_buf();
        self.state.with_task(self.id, |task| {
            task.progress.local_path = Some(path);
            task.retained_file = Some(file);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsift_core::PipelineError;

    fn message(id: &str) -> QueueMessage {
        QueueMessage {
            message_id: id.to_string(),
            receipt_handle: format!("receipt-{}", id),
            body: "{}".to_string(),
            approximate_receive_count: 1,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn admission_stops_exactly_once() {
        let state = WorkerPoolState::new();
        assert!(state.is_accepting());
        assert!(state.stop_admission());
        assert!(!state.stop_admission());
        assert!(!state.is_accepting());
    }

    #[test]
    fn finished_tasks_leave_the_in_flight_set() {
        let state = Arc::new(WorkerPoolState::new());
        let a = state.register(&message("a"));
        let b = state.register(&message("b"));
        assert_eq!(state.in_flight_count(), 2);

        state.finish(a.id(), &MessageOutcome::Success { indexed: true });
        state.finish(
            b.id(),
            &MessageOutcome::Retry(PipelineError::DownloadFailed("x".to_string())),
        );
        assert_eq!(state.in_flight_count(), 0);
        assert!(state.snapshot().is_empty());
        let stats = state.statistics();
        assert_eq!((stats.succeeded, stats.failed), (1, 1));
    }

    #[test]
    fn completed_tasks_are_no_longer_unfinished() {
        let state = Arc::new(WorkerPoolState::new());
        let done = state.register(&message("done"));
        let interrupted = state.register(&message("interrupted"));
        let running = state.register(&message("running"));
        assert!(state.is_unfinished(done.id()));

        done.mark_acknowledged();
        assert!(!state.is_unfinished(done.id()));
        state.finish(done.id(), &MessageOutcome::Success { indexed: true });
        assert!(!state.is_unfinished(done.id()));

        state.finish(interrupted.id(), &MessageOutcome::Cancelled(Stage::Downloaded));
        assert!(state.is_unfinished(interrupted.id()));
        assert!(state.is_unfinished(running.id()));
    }

    #[test]
    fn cancellation_reaches_every_registered_task() {
        let state = Arc::new(WorkerPoolState::new());
        let a = state.register(&message("a"));
        let b = state.register(&message("b"));
        assert_eq!(state.cancel_all(), 2);
        assert!(a.is_cancelled() && b.is_cancelled());
        // tasks registered after cancellation start cancelled
        assert!(state.register(&message("c")).is_cancelled());
    }

    #[test]
    fn cancelled_tasks_keep_their_receipt_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(WorkerPoolState::new());
        let task = state.register(&message("a"));
        task.update(|p| p.key = Some("docs/a.txt".to_string()));
        task.reach(Stage::Downloaded);

        let file = tempfile::NamedTempFile::new_in(dir.path()).unwrap().into_temp_path();
        let path = file.to_path_buf();
        task.hand_over(file);
        state.finish(task.id(), &MessageOutcome::Cancelled(Stage::Downloaded));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].interrupted);
        assert_eq!(snapshot[0].receipt_handle, "receipt-a");
        assert_eq!(snapshot[0].progress.stage, Some(Stage::Downloaded));
        assert!(path.exists());

        assert_eq!(state.release_interrupted(), 1);
        assert!(!path.exists());
        assert_eq!(state.statistics().interrupted, 1);
    }

    #[tokio::test]
    async fn wait_idle_returns_when_last_task_finishes() {
        let state = Arc::new(WorkerPoolState::new());
        let task = state.register(&message("a"));
        assert!(!state.wait_idle(Duration::from_millis(20)).await);

        let finisher = Arc::clone(&state);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            finisher.finish(task.id(), &MessageOutcome::Skipped("zip".to_string()));
        });
        assert!(state.wait_idle(Duration::from_secs(5)).await);
    }
}
