use crate::{MemoryQueue, MessageQueue, QueueResult};
use docsift_core::Config;
use std::sync::Arc;

/// Scheme selecting the in-process queue, e.g. `memory://local`.
pub const MEMORY_QUEUE_SCHEME: &str = "memory://";

/// Create a queue client based on configuration
pub async fn create_queue(config: &Config) -> QueueResult<Arc<dyn MessageQueue>> {
    let queue = config.queue();

    if queue.queue_url.starts_with(MEMORY_QUEUE_SCHEME) {
        tracing::warn!(
            queue_url = %queue.queue_url,
            "Using in-memory queue; messages are lost on exit"
        );
        return Ok(Arc::new(MemoryQueue::new(
            queue.queue_url.clone(),
            queue.max_receive_count,
        )));
    }

    #[cfg(feature = "queue-sqs")]
    {
        let client = crate::SqsQueue::new(queue.queue_url.clone(), queue.region.clone()).await;
        Ok(Arc::new(client))
    }

    #[cfg(not(feature = "queue-sqs"))]
    {
        Err(crate::QueueError::ConfigError(
            "SQS queue backend not available (queue-sqs feature not enabled)".to_string(),
        ))
    }
}
