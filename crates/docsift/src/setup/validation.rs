//! Configuration validation
//!
//! Validates critical configuration values at startup to catch misconfigurations early.

use anyhow::Result;
use docsift_core::{Config, StorageBackend};

/// Queue URLs are shortened to this many characters in the startup summary
const QUEUE_URL_DISPLAY_LEN: usize = 50;

/// Validate critical configuration values
///
/// Structural checks live in `Config::validate`; this adds the deployment
/// level warnings that are not worth refusing to start over.
pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    let is_production = config.is_production();
    if is_production && config.storage_backend() == StorageBackend::Memory {
        return Err(anyhow::anyhow!(
            "STORAGE_BACKEND=memory is not allowed in production - objects would be lost on exit"
        ));
    }

    if is_production && config.queue().queue_url.starts_with("memory://") {
        return Err(anyhow::anyhow!(
            "In-memory queue configured in production - set SQS_QUEUE_URL to a real queue"
        ));
    }

    Ok(())
}

/// Log the effective configuration once tracing is up
pub fn log_config_summary(config: &Config) {
    let queue = config.queue();
    let storage = config.storage();
    let processing = config.processing();
    let shutdown = config.shutdown();
    let preemption = config.preemption();

    tracing::info!(
        environment = %config.environment(),
        queue_url = %truncate(&queue.queue_url, QUEUE_URL_DISPLAY_LEN),
        region = %queue.region,
        batch_size = queue.max_messages,
        wait_time_seconds = queue.wait_time_seconds,
        visibility_timeout_seconds = queue.visibility_timeout_seconds,
        "Queue configuration"
    );

    tracing::info!(
        backend = %config.storage_backend(),
        bucket = %storage.bucket,
        thumbnail_bucket = %config.thumbnail_bucket().unwrap_or(storage.bucket.as_str()),
        evacuation_bucket = %config.evacuation_bucket(),
        index_endpoint = %config.index().endpoint.as_deref().unwrap_or("(disabled)"),
        index_name = %config.index().index_name,
        "Storage and index configuration"
    );

    tracing::info!(
        max_workers = processing.max_workers,
        max_file_size_bytes = processing.max_file_size_bytes,
        temp_dir = %processing.temp_dir.display(),
        malformed_message_policy = %processing.malformed_message_policy,
        index_unavailable_policy = %processing.index_unavailable_policy,
        "Processing configuration"
    );

    tracing::info!(
        budget_seconds = shutdown.budget.as_secs(),
        drain_timeout_seconds = shutdown.drain_timeout.as_secs(),
        evacuation_timeout_seconds = shutdown.evacuation_timeout.as_secs(),
        preemption_watcher = preemption.enabled,
        lifecycle_hook = preemption.lifecycle_hook_url.is_some(),
        "Interruption configuration"
    );

    // The protocol sets an absolute window rather than adding to the current one
    if queue.visibility_timeout_seconds < shutdown.visibility_extension_seconds {
        tracing::warn!(
            visibility_timeout_seconds = queue.visibility_timeout_seconds,
            interruption_visibility_seconds = shutdown.visibility_extension_seconds,
            "Interruption visibility window is longer than the receive visibility timeout"
        );
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let head: String = value.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_queue_urls_are_truncated() {
        let url = "https://sqs.ap-northeast-1.amazonaws.com/123456789012/document-ingestion-queue";
        let shown = truncate(url, QUEUE_URL_DISPLAY_LEN);
        assert_eq!(shown.chars().count(), QUEUE_URL_DISPLAY_LEN + 3);
        assert!(shown.ends_with("..."));
        assert_eq!(truncate("memory://local", QUEUE_URL_DISPLAY_LEN), "memory://local");
    }
}
