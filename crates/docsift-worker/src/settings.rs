//! Runtime settings for the pipeline, the poll loop and the interruption protocol.

use docsift_core::{Config, IndexUnavailablePolicy, MalformedMessagePolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Per-message pipeline behaviour
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Bucket for direct records that name only a key
    pub default_bucket: String,
    pub temp_dir: PathBuf,
    pub max_file_size_bytes: u64,
    /// `None` writes thumbnails next to the source object
    pub thumbnail_bucket: Option<String>,
    pub thumbnail_prefix: String,
    pub malformed_message_policy: MalformedMessagePolicy,
    pub index_unavailable_policy: IndexUnavailablePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_bucket: String::new(),
            temp_dir: std::env::temp_dir(),
            max_file_size_bytes: 100 * 1024 * 1024,
            thumbnail_bucket: None,
            thumbnail_prefix: "thumbnails/".to_string(),
            malformed_message_policy: MalformedMessagePolicy::default(),
            index_unavailable_policy: IndexUnavailablePolicy::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        let processing = config.processing();
        let storage = config.storage();
        Self {
            default_bucket: storage.bucket.clone(),
            temp_dir: processing.temp_dir.clone(),
            max_file_size_bytes: processing.max_file_size_bytes,
            thumbnail_bucket: storage.thumbnail_bucket.clone(),
            thumbnail_prefix: storage.thumbnail_prefix.clone(),
            malformed_message_policy: processing.malformed_message_policy,
            index_unavailable_policy: processing.index_unavailable_policy,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    pub batch_size: i32,
    pub wait_time_seconds: i32,
    pub visibility_timeout_seconds: i32,
    /// Pause after a failed receive call before polling again.
    pub receive_error_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            batch_size: 10,
            wait_time_seconds: 20,
            visibility_timeout_seconds: 600,
            receive_error_backoff: Duration::from_secs(5),
        }
    }
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        let queue = config.queue();
        Self {
            max_workers: config.max_workers(),
            batch_size: queue.max_messages,
            wait_time_seconds: queue.wait_time_seconds,
            visibility_timeout_seconds: queue.visibility_timeout_seconds,
            ..Self::default()
        }
    }
}

/// Budgets and destinations for the interruption protocol.
#[derive(Clone, Debug)]
pub struct ShutdownConfig {
    pub budget: Duration,
    pub drain_timeout: Duration,
    pub evacuation_timeout: Duration,
    pub upload_timeout: Duration,
    pub visibility_extension_seconds: i32,
    pub visibility_call_timeout: Duration,
    pub evacuation_bucket: String,
    pub evacuation_prefix: String,
    /// Namespaces evacuated work and identifies the instance to the lifecycle hook.
    pub host_id: String,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(120),
            drain_timeout: Duration::from_secs(20),
            evacuation_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(10),
            visibility_extension_seconds: 300,
            visibility_call_timeout: Duration::from_secs(5),
            evacuation_bucket: String::new(),
            evacuation_prefix: "interrupted/".to_string(),
            host_id: "unknown-host".to_string(),
        }
    }
}

impl ShutdownConfig {
    pub fn from_config(config: &Config, host_id: String) -> Self {
        let shutdown = config.shutdown();
        Self {
            budget: shutdown.budget,
            drain_timeout: shutdown.drain_timeout,
            evacuation_timeout: shutdown.evacuation_timeout,
            upload_timeout: shutdown.evacuation_upload_timeout,
            visibility_extension_seconds: shutdown.visibility_extension_seconds,
            visibility_call_timeout: shutdown.visibility_call_timeout,
            evacuation_bucket: config.evacuation_bucket().to_string(),
            evacuation_prefix: config.storage().evacuation_prefix.clone(),
            host_id,
        }
    }
}
