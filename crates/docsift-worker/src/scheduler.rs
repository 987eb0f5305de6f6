//! Queue consumer: long-poll loop feeding a bounded worker pool.
//!
//! The loop only receives as many messages as there are free workers, so a
//! received message is always dispatched immediately or released. Workers run
//! detached; the loop never waits on a single message.

use crate::context::WorkerContext;
use crate::pipeline::process_message;
use crate::settings::SchedulerConfig;
use crate::state::WorkerPoolState;
use docsift_core::QueueMessage;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct Scheduler {
    ctx: WorkerContext,
    state: Arc<WorkerPoolState>,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(ctx: WorkerContext, state: Arc<WorkerPoolState>, config: SchedulerConfig) -> Self {
        let workers = config.max_workers.max(1);
        Self {
            ctx,
            state,
            config,
            semaphore: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Poll until admission is stopped. Returns the number of dispatched messages.
    ///
    /// A receive already in progress when admission stops is allowed to finish;
    /// its messages are released back to the queue.
    pub async fn run(self) -> u64 {
        tracing::info!(
            queue_url = %self.ctx.queue.queue_url(),
            max_workers = self.config.max_workers,
            batch_size = self.config.batch_size,
            wait_time_seconds = self.config.wait_time_seconds,
            "Queue consumer started"
        );

        let mut dispatched = 0u64;
        loop {
            if !self.state.is_accepting() {
                break;
            }

            let first = tokio::select! {
                biased;
                _ = self.state.admission_closed() => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let mut permits = vec![first];
            let batch_size = self.config.batch_size.clamp(1, 10) as usize;
            while permits.len() < batch_size {
                match self.semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permits.push(permit),
                    Err(_) => break,
                }
            }

            if !self.state.is_accepting() {
                break;
            }

            let received = self
                .ctx
                .queue
                .receive_batch(
                    permits.len() as i32,
                    self.config.wait_time_seconds,
                    self.config.visibility_timeout_seconds,
                )
                .await;

            match received {
                Ok(messages) => {
                    if !messages.is_empty() {
                        tracing::debug!(count = messages.len(), "Received messages");
                    }
                    for message in messages {
                        match permits.pop() {
                            Some(permit) if self.state.is_accepting() => {
                                self.dispatch(message, permit);
                                dispatched += 1;
                            }
                            _ => self.release(&message).await,
                        }
                    }
                }
                Err(e) => {
                    drop(permits);
                    tracing::error!(error = %e, "Failed to receive messages");
                    tokio::select! {
                        _ = self.state.admission_closed() => break,
                        _ = tokio::time::sleep(self.config.receive_error_backoff) => {}
                    }
                }
            }
        }

        tracing::info!(dispatched, "Queue consumer stopped");
        dispatched
    }

    fn dispatch(&self, message: QueueMessage, permit: OwnedSemaphorePermit) {
        let task = self.state.register(&message);
        let ctx = self.ctx.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = process_message(&ctx, &message, &task).await;
            state.finish(task.id(), &outcome);
        });
    }

    /// Make an undispatched message visible to other consumers right away.
    async fn release(&self, message: &QueueMessage) {
        match self
            .ctx
            .queue
            .extend_visibility(&message.receipt_handle, 0)
            .await
        {
            Ok(()) => tracing::info!(message_id = %message.message_id, "Released undispatched message"),
            Err(e) => tracing::warn!(
                message_id = %message.message_id,
                error = %e,
                "Failed to release undispatched message; it reappears after its visibility timeout"
            ),
        }
    }
}
