//! Interruption handler: vacate the instance within a hard deadline.
//!
//! Triggered by a termination signal or a preemption notice. The trigger only
//! cancels a token; this module runs the protocol on a normal task:
//!
//! 1. stop admission
//! 2. cancel in-flight tasks, then give them a short drain window
//! 3. evacuate partial results under `{prefix}{host}/{task_id}/`
//! 4. extend visibility of every unacknowledged message
//! 5. flush telemetry and log statistics
//! 6. acknowledge the orchestration lifecycle action
//! 7. clean up local files
//!
//! Every step is bounded by its own timeout and by what remains of the overall
//! budget. A failing step is logged and the protocol continues. Steps 3 and 4
//! run concurrently so a hanging evacuation never delays visibility extension.

use crate::pipeline::Stage;
use crate::settings::ShutdownConfig;
use crate::state::{TaskSnapshot, WorkerPoolState};
use crate::stats::StatsSnapshot;
use chrono::{DateTime, Utc};
use docsift_infra::{flush_telemetry, LifecycleHook};
use docsift_processing::mime_type_for_extension;
use docsift_queue::MessageQueue;
use docsift_storage::keys::evacuation_key;
use docsift_storage::{ObjectMetadata, Storage};
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(10);
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);
const TEMP_FILE_PREFIX: &str = "docsift-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionPhase {
    Running,
    InterruptionDetected,
    Draining,
    Evacuating,
    Terminated,
}

/// What the protocol achieved, for the final log line and for tests.
#[derive(Debug, Clone, Serialize)]
pub struct InterruptionReport {
    pub reason: String,
    pub cancelled_tasks: usize,
    pub drained: bool,
    pub evacuated: usize,
    pub evacuation_failures: usize,
    pub visibility_extended: usize,
    pub visibility_failures: usize,
    pub lifecycle_acknowledged: bool,
    pub files_removed: usize,
    pub elapsed_seconds: f64,
    pub statistics: StatsSnapshot,
}

/// Contents of `partial.json`.
#[derive(Debug, Serialize)]
struct EvacuationRecord<'a> {
    task_id: String,
    message_id: &'a str,
    host: &'a str,
    bucket: Option<&'a str>,
    key: Option<&'a str>,
    stage: Option<Stage>,
    progress_marker: Option<&'a str>,
    partial_text: Option<&'a str>,
    still_running: bool,
    started_at: DateTime<Utc>,
    interrupted_at: DateTime<Utc>,
}

pub struct InterruptionHandler {
    state: Arc<WorkerPoolState>,
    queue: Arc<dyn MessageQueue>,
    storage: Arc<dyn Storage>,
    lifecycle: Arc<dyn LifecycleHook>,
    config: ShutdownConfig,
    temp_dir: PathBuf,
    phase: Mutex<InterruptionPhase>,
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

impl InterruptionHandler {
    pub fn new(
        state: Arc<WorkerPoolState>,
        queue: Arc<dyn MessageQueue>,
        storage: Arc<dyn Storage>,
        lifecycle: Arc<dyn LifecycleHook>,
        config: ShutdownConfig,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            state,
            queue,
            storage,
            lifecycle,
            config,
            temp_dir,
            phase: Mutex::new(InterruptionPhase::Running),
        }
    }

    pub fn phase(&self) -> InterruptionPhase {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, phase: InterruptionPhase) {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = phase;
        tracing::info!(phase = ?phase, "Interruption phase");
    }

    /// Run the shutdown protocol once. Never fails; problems are logged and reported.
    pub async fn run(&self, reason: &str) -> InterruptionReport {
        let started = Instant::now();
        let deadline = started + self.config.budget;
        self.enter(InterruptionPhase::InterruptionDetected);
        tracing::warn!(
            reason = %reason,
            budget_secs = self.config.budget.as_secs(),
            in_flight = self.state.in_flight_count(),
            "Interruption detected, vacating instance"
        );

        // 1. stop admission
        if !self.state.stop_admission() {
            tracing::debug!("Admission was already stopped");
        }

        // 2. cooperative cancellation, then a bounded drain
        let cancelled_tasks = self.state.cancel_all();
        self.enter(InterruptionPhase::Draining);
        let drain_window = self.config.drain_timeout.min(remaining(deadline));
        let drained = self.state.wait_idle(drain_window).await;
        if !drained {
            tracing::warn!(
                still_running = self.state.in_flight_count(),
                drain_secs = drain_window.as_secs_f64(),
                "Tasks did not reach a checkpoint before the drain timeout"
            );
        }

        // 3 + 4. evacuation and visibility extension
        self.enter(InterruptionPhase::Evacuating);
        let tasks: Vec<TaskSnapshot> = self
            .state
            .snapshot()
            .into_iter()
            .filter(|task| !task.acknowledged)
            .collect();
        let ((evacuated, evacuation_failures), (visibility_extended, visibility_failures)) = tokio::join!(
            self.evacuate(&tasks, deadline),
            self.extend_visibility(&tasks, deadline)
        );

        // 5. observability
        let statistics = self.state.statistics();
        statistics.log_report();
        flush_telemetry();

        // 6. lifecycle acknowledgment
        let lifecycle_acknowledged = self.complete_lifecycle(deadline).await;

        // 7. local cleanup, time permitting
        let files_removed = self.cleanup(deadline).await;

        self.enter(InterruptionPhase::Terminated);
        let report = InterruptionReport {
            reason: reason.to_string(),
            cancelled_tasks,
            drained,
            evacuated,
            evacuation_failures,
            visibility_extended,
            visibility_failures,
            lifecycle_acknowledged,
            files_removed,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            statistics,
        };
        tracing::info!(
            cancelled = report.cancelled_tasks,
            drained = report.drained,
            evacuated = report.evacuated,
            evacuation_failures = report.evacuation_failures,
            visibility_extended = report.visibility_extended,
            visibility_failures = report.visibility_failures,
            lifecycle_acknowledged = report.lifecycle_acknowledged,
            elapsed_seconds = report.elapsed_seconds,
            "Interruption handling complete"
        );
        flush_telemetry();
        report
    }

    async fn evacuate(&self, tasks: &[TaskSnapshot], deadline: Instant) -> (usize, usize) {
        let candidates: Vec<&TaskSnapshot> =
            tasks.iter().filter(|t| t.progress.key.is_some()).collect();
        if candidates.is_empty() {
            return (0, 0);
        }

        let succeeded = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let uploads = candidates.iter().map(|task| {
            let succeeded = &succeeded;
            let skipped = &skipped;
            async move {
                match self.evacuate_task(task).await {
                    Some(true) => {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(false) => {}
                    None => {
                        skipped.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        });

        let window = self.config.evacuation_timeout.min(remaining(deadline));
        if tokio::time::timeout(window, join_all(uploads)).await.is_err() {
            tracing::warn!(
                window_secs = window.as_secs_f64(),
                "Evacuation window elapsed; remaining uploads abandoned"
            );
        }
        let succeeded = succeeded.load(Ordering::SeqCst);
        let skipped = skipped.load(Ordering::SeqCst);
        (succeeded, candidates.len() - succeeded - skipped)
    }

    /// Upload `partial.json` and, if still on disk, the local source file.
    ///
    /// Returns `None` when the task completed after the snapshot was taken.
    async fn evacuate_task(&self, task: &TaskSnapshot) -> Option<bool> {
        if !self.state.is_unfinished(task.task_id) {
            tracing::debug!(task_id = %task.task_id, "Task completed meanwhile; not evacuated");
            return None;
        }
        let task_id = task.task_id.to_string();
        let host = self.config.host_id.as_str();
        let progress = &task.progress;

        let mut metadata = ObjectMetadata::new();
        if let Some(key) = &progress.key {
            metadata.insert("original-key".to_string(), key.clone());
        }

        let record = EvacuationRecord {
            task_id: task_id.clone(),
            message_id: &task.message_id,
            host,
            bucket: progress.bucket.as_deref(),
            key: progress.key.as_deref(),
            stage: progress.stage,
            progress_marker: progress.marker.as_deref(),
            partial_text: progress.partial_text.as_deref(),
            still_running: !task.interrupted,
            started_at: task.started_at,
            interrupted_at: Utc::now(),
        };
        let record_upload = async {
            match serde_json::to_vec_pretty(&record) {
                Ok(body) => {
                    let key =
                        evacuation_key(&self.config.evacuation_prefix, host, &task_id, "partial.json");
                    self.upload_bounded(&key, body, "application/json", &metadata)
                        .await
                }
                Err(e) => {
                    tracing::error!(task_id = %task_id, error = %e, "Failed to serialize evacuation record");
                    false
                }
            }
        };

        let file_upload = async {
            let Some(path) = progress.local_path.as_deref() else {
                return true;
            };
            match tokio::fs::read(path).await {
                Ok(data) => {
                    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
                    let name = if ext.is_empty() {
                        "source".to_string()
                    } else {
                        format!("source.{}", ext)
                    };
                    let key = evacuation_key(&self.config.evacuation_prefix, host, &task_id, &name);
                    self.upload_bounded(&key, data, mime_type_for_extension(ext), &metadata)
                        .await
                }
                Err(e) => {
                    // the worker finished and removed it in the meantime
                    tracing::debug!(task_id = %task_id, error = %e, "Local file not available for evacuation");
                    true
                }
            }
        };

        let (record_ok, file_ok) = tokio::join!(record_upload, file_upload);
        Some(record_ok && file_ok)
    }

    async fn upload_bounded(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> bool {
        let bucket = &self.config.evacuation_bucket;
        let upload = self
            .storage
            .upload(bucket, key, data, content_type, metadata);
        match tokio::time::timeout(self.config.upload_timeout, upload).await {
            Ok(Ok(_)) => {
                tracing::info!(bucket = %bucket, key = %key, "Evacuated");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(bucket = %bucket, key = %key, error = %e, "Evacuation upload failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    bucket = %bucket,
                    key = %key,
                    timeout_secs = self.config.upload_timeout.as_secs_f64(),
                    "Evacuation upload timed out"
                );
                false
            }
        }
    }

    async fn extend_visibility(&self, tasks: &[TaskSnapshot], deadline: Instant) -> (usize, usize) {
        if tasks.is_empty() {
            return (0, 0);
        }
        let seconds = self.config.visibility_extension_seconds;
        let call_timeout = self.config.visibility_call_timeout;
        let extended = AtomicUsize::new(0);

        let calls = tasks.iter().map(|task| {
            let extended = &extended;
            async move {
                let call = self.queue.extend_visibility(&task.receipt_handle, seconds);
                match tokio::time::timeout(call_timeout, call).await {
                    Ok(Ok(())) => {
                        extended.fetch_add(1, Ordering::SeqCst);
                        tracing::info!(message_id = %task.message_id, seconds, "Message visibility extended");
                    }
                    Ok(Err(e)) => tracing::error!(
                        message_id = %task.message_id,
                        error = %e,
                        "Failed to extend message visibility"
                    ),
                    Err(_) => tracing::error!(
                        message_id = %task.message_id,
                        "Visibility extension timed out"
                    ),
                }
            }
        });

        let window = remaining(deadline);
        if tokio::time::timeout(window, join_all(calls)).await.is_err() {
            tracing::error!("Interruption budget exhausted during visibility extension");
        }
        let extended = extended.load(Ordering::SeqCst);
        (extended, tasks.len() - extended)
    }

    async fn complete_lifecycle(&self, deadline: Instant) -> bool {
        let window = LIFECYCLE_TIMEOUT.min(remaining(deadline));
        match tokio::time::timeout(window, self.lifecycle.complete(&self.config.host_id)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Lifecycle acknowledgment failed");
                false
            }
            Err(_) => {
                tracing::error!("Lifecycle acknowledgment timed out");
                false
            }
        }
    }

    async fn cleanup(&self, deadline: Instant) -> usize {
        let released = self.state.release_interrupted();
        let window = CLEANUP_TIMEOUT.min(remaining(deadline));
        let removed = tokio::time::timeout(window, remove_temp_files(&self.temp_dir))
            .await
            .unwrap_or(0);
        tracing::debug!(released, removed, "Local cleanup done");
        released + removed
    }
}

/// Remove leftover per-task files from `dir`. Errors are ignored.
async fn remove_temp_files(dir: &Path) -> usize {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_ours = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(TEMP_FILE_PREFIX));
        if is_ours && tokio::fs::remove_file(entry.path()).await.is_ok() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MessageOutcome;
    use docsift_core::QueueMessage;
    use docsift_infra::NoopLifecycleHook;
    use docsift_queue::MemoryQueue;
    use docsift_storage::MemoryStorage;

    fn shutdown_config() -> ShutdownConfig {
        ShutdownConfig {
            evacuation_bucket: "evacuated".to_string(),
            host_id: "test-host".to_string(),
            ..ShutdownConfig::default()
        }
    }

    fn message(id: &str) -> QueueMessage {
        QueueMessage {
            message_id: id.to_string(),
            receipt_handle: format!("receipt-{}", id),
            body: "{}".to_string(),
            approximate_receive_count: 1,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn task_completed_after_snapshot_is_not_evacuated() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(WorkerPoolState::new());
        let storage = MemoryStorage::new();
        let handler = InterruptionHandler::new(
            state.clone(),
            Arc::new(MemoryQueue::new("memory://test", 5)),
            Arc::new(storage.clone()),
            Arc::new(NoopLifecycleHook),
            shutdown_config(),
            dir.path().to_path_buf(),
        );

        let finishing = state.register(&message("finishing"));
        let stuck = state.register(&message("stuck"));
        for (task, key) in [(&finishing, "a.txt"), (&stuck, "b.txt")] {
            task.update(|p| {
                p.bucket = Some("docs".to_string());
                p.key = Some(key.to_string());
            });
        }
        let tasks = state.snapshot();
        assert_eq!(tasks.len(), 2);

        // the worker acknowledges its message between snapshot and upload
        finishing.mark_acknowledged();
        state.finish(finishing.id(), &MessageOutcome::Success { indexed: true });

        let deadline = Instant::now() + Duration::from_secs(60);
        assert_eq!(handler.evacuate(&tasks, deadline).await, (1, 0));

        let keys = storage.keys("evacuated");
        assert_eq!(
            keys,
            vec![format!("interrupted/test-host/{}/partial.json", stuck.id())]
        );
    }

    #[tokio::test]
    async fn removes_only_task_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docsift-abc.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        assert_eq!(remove_temp_files(dir.path()).await, 1);
        assert!(dir.path().join("keep.txt").exists());
        assert_eq!(remove_temp_files(&dir.path().join("missing")).await, 0);
    }
}
