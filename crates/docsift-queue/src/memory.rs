//! In-process queue with SQS delivery semantics.
//!
//! Messages become invisible for the visibility timeout on receive, get a fresh
//! receipt handle per delivery, reappear when the timeout elapses, and move to a
//! dead-letter list once they have been received `max_receive_count` times
//! without being deleted. Used for local runs and as the test double of the
//! pipeline.

use crate::traits::{MessageQueue, QueueError, QueueResult};
use async_trait::async_trait;
use chrono::Utc;
use docsift_core::QueueMessage;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

const POLL_STEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct Entry {
    message_id: String,
    body: String,
    receive_count: u32,
    invisible_until: Option<Instant>,
    receipt: Option<String>,
}

impl Entry {
    fn is_visible(&self, now: Instant) -> bool {
        self.invisible_until.map_or(true, |until| until <= now)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: Vec<Entry>,
    dead_letters: Vec<Entry>,
    deleted: Vec<String>,
    visibility_changes: Vec<(String, i32)>,
    receive_calls: usize,
    fail_deletes: bool,
    fail_visibility_changes: bool,
}

#[derive(Clone)]
pub struct MemoryQueue {
    url: String,
    max_receive_count: u32,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new(url: impl Into<String>, max_receive_count: u32) -> Self {
        Self {
            url: url.into(),
            max_receive_count: max_receive_count.max(1),
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a message body, returning its message ID.
    pub fn send(&self, body: impl Into<String>) -> String {
        let message_id = Uuid::new_v4().to_string();
        self.state().entries.push(Entry {
            message_id: message_id.clone(),
            body: body.into(),
            receive_count: 0,
            invisible_until: None,
            receipt: None,
        });
        self.notify.notify_waiters();
        message_id
    }

    /// Messages currently available to a receive call.
    pub fn visible_count(&self) -> usize {
        let now = Instant::now();
        self.state()
            .entries
            .iter()
            .filter(|e| e.is_visible(now))
            .count()
    }

    /// Messages received and still hidden by their visibility timeout.
    pub fn in_flight_count(&self) -> usize {
        let now = Instant::now();
        self.state()
            .entries
            .iter()
            .filter(|e| !e.is_visible(now))
            .count()
    }

    /// Messages not yet deleted or dead-lettered.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dead_letter_count(&self) -> usize {
        self.state().dead_letters.len()
    }

    /// IDs of deleted messages in deletion order.
    pub fn deleted_message_ids(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    pub fn deleted_count(&self) -> usize {
        self.state().deleted.len()
    }

    /// Successful visibility changes as `(message_id, timeout_seconds)`.
    pub fn visibility_changes(&self) -> Vec<(String, i32)> {
        self.state().visibility_changes.clone()
    }

    /// Number of `receive_batch` calls made so far.
    pub fn receive_calls(&self) -> usize {
        self.state().receive_calls
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.state().fail_deletes = fail;
    }

    pub fn set_fail_visibility_changes(&self, fail: bool) {
        self.state().fail_visibility_changes = fail;
    }

    fn take_visible(&self, max_messages: usize, visibility_timeout: i32) -> Vec<QueueMessage> {
        let now = Instant::now();
        let hidden_until = now + Duration::from_secs(visibility_timeout.max(0) as u64);
        let mut state = self.state();
        let mut batch = Vec::new();
        let mut index = 0;

        while index < state.entries.len() && batch.len() < max_messages {
            if !state.entries[index].is_visible(now) {
                index += 1;
                continue;
            }
            if state.entries[index].receive_count >= self.max_receive_count {
                let entry = state.entries.remove(index);
                tracing::warn!(
                    message_id = %entry.message_id,
                    receive_count = entry.receive_count,
                    "Message exceeded max receive count, moved to dead-letter queue"
                );
                state.dead_letters.push(entry);
                continue;
            }

            let entry = &mut state.entries[index];
            entry.receive_count += 1;
            entry.invisible_until = Some(hidden_until);
            let receipt = Uuid::new_v4().to_string();
            entry.receipt = Some(receipt.clone());
            batch.push(QueueMessage {
                message_id: entry.message_id.clone(),
                receipt_handle: receipt,
                body: entry.body.clone(),
                approximate_receive_count: entry.receive_count,
                received_at: Utc::now(),
            });
            index += 1;
        }

        batch
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive_batch(
        &self,
        max_messages: i32,
        wait_seconds: i32,
        visibility_timeout: i32,
    ) -> QueueResult<Vec<QueueMessage>> {
        self.state().receive_calls += 1;
        let max_messages = max_messages.clamp(1, 10) as usize;
        let deadline = Instant::now() + Duration::from_secs(wait_seconds.max(0) as u64);

        loop {
            let batch = self.take_visible(max_messages, visibility_timeout);
            let now = Instant::now();
            if !batch.is_empty() || now >= deadline {
                return Ok(batch);
            }
            let step = POLL_STEP.min(deadline - now);
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(step) => {}
            }
        }
    }

    async fn delete_message(&self, receipt_handle: &str) -> QueueResult<()> {
        let mut state = self.state();
        if state.fail_deletes {
            return Err(QueueError::DeleteFailed("injected delete failure".to_string()));
        }
        let position = state
            .entries
            .iter()
            .position(|e| e.receipt.as_deref() == Some(receipt_handle))
            .ok_or_else(|| QueueError::InvalidReceipt(receipt_handle.to_string()))?;
        let entry = state.entries.remove(position);
        state.deleted.push(entry.message_id);
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout_seconds: i32,
    ) -> QueueResult<()> {
        let now = Instant::now();
        let mut state = self.state();
        if state.fail_visibility_changes {
            return Err(QueueError::VisibilityFailed(
                "injected visibility failure".to_string(),
            ));
        }
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.receipt.as_deref() == Some(receipt_handle) && !e.is_visible(now))
            .ok_or_else(|| QueueError::InvalidReceipt(receipt_handle.to_string()))?;

        entry.invisible_until = if timeout_seconds <= 0 {
            None
        } else {
            Some(now + Duration::from_secs(timeout_seconds as u64))
        };
        let message_id = entry.message_id.clone();
        state.visibility_changes.push((message_id, timeout_seconds));
        drop(state);

        if timeout_seconds <= 0 {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    fn queue_url(&self) -> &str {
        &self.url
    }
}
