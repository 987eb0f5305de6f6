//! Configuration module
//!
//! Every setting is read from the environment (a `.env` file is honoured through
//! `dotenvy`). Numeric values that fail to parse fall back to their defaults;
//! missing required values are reported by [`Config::validate`].

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::storage_types::StorageBackend;

// Queue defaults
const SQS_MAX_MESSAGES: i32 = 10;
const SQS_WAIT_TIME_SECS: i32 = 20;
const SQS_VISIBILITY_TIMEOUT_SECS: i32 = 600;
const SQS_MAX_RECEIVE_COUNT: u32 = 3;
// Processing defaults
const MAX_WORKERS: usize = 8;
const MAX_FILE_SIZE_MB: u64 = 100;
const TEMP_DIR: &str = "/tmp/docsift";
const THUMBNAIL_SIZE: u32 = 200;
const THUMBNAIL_QUALITY: u8 = 85;
const THUMBNAIL_PREFIX: &str = "thumbnails/";
// Index defaults
const OPENSEARCH_INDEX: &str = "file-index";
const OPENSEARCH_TIMEOUT_SECS: u64 = 30;
// Shutdown defaults
const INTERRUPTION_BUDGET_SECS: u64 = 120;
const DRAIN_TIMEOUT_SECS: u64 = 20;
const EVACUATION_TIMEOUT_SECS: u64 = 30;
const EVACUATION_UPLOAD_TIMEOUT_SECS: u64 = 10;
const INTERRUPTION_VISIBILITY_SECS: i32 = 300;
const VISIBILITY_CALL_TIMEOUT_SECS: u64 = 5;
const EVACUATION_PREFIX: &str = "interrupted/";
// Preemption defaults
const PREEMPTION_NOTICE_ENDPOINT: &str = "http://169.254.169.254";
const PREEMPTION_NOTICE_INTERVAL_SECS: u64 = 5;
const AWS_REGION: &str = "ap-northeast-1";

/// What to do with a message whose body cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedMessagePolicy {
    /// Log and delete; the message never reaches the dead-letter queue.
    #[default]
    Delete,
    /// Log and leave it; the redrive policy eventually dead-letters it.
    Retry,
}

impl FromStr for MalformedMessagePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "delete" => Ok(MalformedMessagePolicy::Delete),
            "retry" => Ok(MalformedMessagePolicy::Retry),
            _ => Err(anyhow::anyhow!("Invalid malformed message policy: {}", s)),
        }
    }
}

impl Display for MalformedMessagePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MalformedMessagePolicy::Delete => write!(f, "delete"),
            MalformedMessagePolicy::Retry => write!(f, "retry"),
        }
    }
}

/// What to do when the search index reports it is not connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexUnavailablePolicy {
    /// Acknowledge the message without indexing.
    #[default]
    Skip,
    /// Leave the message for redelivery.
    Fail,
}

impl FromStr for IndexUnavailablePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(IndexUnavailablePolicy::Skip),
            "fail" => Ok(IndexUnavailablePolicy::Fail),
            _ => Err(anyhow::anyhow!("Invalid index unavailable policy: {}", s)),
        }
    }
}

impl Display for IndexUnavailablePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            IndexUnavailablePolicy::Skip => write!(f, "skip"),
            IndexUnavailablePolicy::Fail => write!(f, "fail"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueSettings {
    pub queue_url: String,
    pub region: String,
    pub max_messages: i32,
    pub wait_time_seconds: i32,
    pub visibility_timeout_seconds: i32,
    /// Redrive threshold. Owned by the queue's redrive policy; informational here.
    pub max_receive_count: u32,
}

#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, LocalStack, ...)
    pub local_path: Option<String>,
    pub thumbnail_bucket: Option<String>,
    pub thumbnail_prefix: String,
    pub evacuation_bucket: Option<String>,
    pub evacuation_prefix: String,
}

#[derive(Clone, Debug)]
pub struct IndexSettings {
    pub endpoint: Option<String>,
    pub index_name: String,
    pub timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThumbnailSettings {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            width: THUMBNAIL_SIZE,
            height: THUMBNAIL_SIZE,
            quality: THUMBNAIL_QUALITY,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProcessingSettings {
    pub max_workers: usize,
    pub temp_dir: PathBuf,
    pub max_file_size_bytes: u64,
    pub thumbnail: ThumbnailSettings,
    pub malformed_message_policy: MalformedMessagePolicy,
    pub index_unavailable_policy: IndexUnavailablePolicy,
}

/// Time budgets for the interruption protocol.
#[derive(Clone, Debug)]
pub struct ShutdownSettings {
    pub budget: Duration,
    pub drain_timeout: Duration,
    pub evacuation_timeout: Duration,
    pub evacuation_upload_timeout: Duration,
    pub visibility_extension_seconds: i32,
    pub visibility_call_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct PreemptionSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub interval: Duration,
    pub lifecycle_hook_url: Option<String>,
}

/// Worker configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub environment: String,
    pub log_format: LogFormat,
    pub queue: QueueSettings,
    pub storage: StorageSettings,
    pub index: IndexSettings,
    pub processing: ProcessingSettings,
    pub shutdown: ShutdownSettings,
    pub preemption: PreemptionSettings,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<WorkerConfig>);

impl Config {
    pub fn new(config: WorkerConfig) -> Self {
        Config(Box::new(config))
    }

    fn as_worker(&self) -> &WorkerConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = WorkerConfig::from_lookup(|name| env::var(name).ok())?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_worker().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.as_worker().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn environment(&self) -> &str {
        &self.as_worker().environment
    }

    pub fn log_format(&self) -> LogFormat {
        self.as_worker().log_format
    }

    pub fn queue(&self) -> &QueueSettings {
        &self.as_worker().queue
    }

    pub fn storage(&self) -> &StorageSettings {
        &self.as_worker().storage
    }

    pub fn index(&self) -> &IndexSettings {
        &self.as_worker().index
    }

    pub fn processing(&self) -> &ProcessingSettings {
        &self.as_worker().processing
    }

    pub fn shutdown(&self) -> &ShutdownSettings {
        &self.as_worker().shutdown
    }

    pub fn preemption(&self) -> &PreemptionSettings {
        &self.as_worker().preemption
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_worker().storage.backend
    }

    pub fn s3_bucket(&self) -> &str {
        &self.as_worker().storage.bucket
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_worker().storage.endpoint.as_deref()
    }

    pub fn aws_region(&self) -> &str {
        &self.as_worker().storage.region
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_worker().storage.local_path.as_deref()
    }

    pub fn max_workers(&self) -> usize {
        self.as_worker().processing.max_workers
    }

    /// Bucket receiving thumbnails; `None` means "same bucket as the source object".
    pub fn thumbnail_bucket(&self) -> Option<&str> {
        self.as_worker().storage.thumbnail_bucket.as_deref()
    }

    /// Bucket receiving evacuated work; falls back to the default bucket.
    pub fn evacuation_bucket(&self) -> &str {
        let storage = &self.as_worker().storage;
        storage
            .evacuation_bucket
            .as_deref()
            .unwrap_or(&storage.bucket)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn with_trailing_slash(prefix: String) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix
    } else {
        format!("{}/", prefix)
    }
}

impl WorkerConfig {
    /// Build the configuration from a variable lookup.
    ///
    /// `from_env` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let log_format = match non_empty(lookup("LOG_FORMAT")) {
            Some(v) => v.parse()?,
            None => LogFormat::default(),
        };

        let region = non_empty(lookup("AWS_REGION"))
            .or_else(|| non_empty(lookup("AWS_DEFAULT_REGION")))
            .unwrap_or_else(|| AWS_REGION.to_string());

        let queue = QueueSettings {
            queue_url: lookup("SQS_QUEUE_URL").unwrap_or_default(),
            region: region.clone(),
            max_messages: parse_or(lookup("SQS_MAX_MESSAGES"), SQS_MAX_MESSAGES).clamp(1, 10),
            wait_time_seconds: parse_or(lookup("SQS_WAIT_TIME"), SQS_WAIT_TIME_SECS).clamp(0, 20),
            visibility_timeout_seconds: parse_or(
                lookup("SQS_VISIBILITY_TIMEOUT"),
                SQS_VISIBILITY_TIMEOUT_SECS,
            ),
            max_receive_count: parse_or(lookup("SQS_MAX_RECEIVE_COUNT"), SQS_MAX_RECEIVE_COUNT),
        };

        let backend = match non_empty(lookup("STORAGE_BACKEND")) {
            Some(v) => v.parse()?,
            None => StorageBackend::S3,
        };

        let storage = StorageSettings {
            backend,
            bucket: lookup("S3_BUCKET").unwrap_or_default(),
            region: non_empty(lookup("S3_REGION")).unwrap_or(region),
            endpoint: non_empty(lookup("S3_ENDPOINT")),
            local_path: non_empty(lookup("LOCAL_STORAGE_PATH")),
            thumbnail_bucket: non_empty(lookup("THUMBNAIL_BUCKET")),
            thumbnail_prefix: with_trailing_slash(
                lookup("THUMBNAIL_PREFIX").unwrap_or_else(|| THUMBNAIL_PREFIX.to_string()),
            ),
            evacuation_bucket: non_empty(lookup("EVACUATION_BUCKET")),
            evacuation_prefix: with_trailing_slash(
                lookup("EVACUATION_PREFIX").unwrap_or_else(|| EVACUATION_PREFIX.to_string()),
            ),
        };

        let index = IndexSettings {
            endpoint: non_empty(lookup("OPENSEARCH_ENDPOINT")),
            index_name: non_empty(lookup("OPENSEARCH_INDEX"))
                .unwrap_or_else(|| OPENSEARCH_INDEX.to_string()),
            timeout: Duration::from_secs(parse_or(
                lookup("OPENSEARCH_TIMEOUT_SECONDS"),
                OPENSEARCH_TIMEOUT_SECS,
            )),
        };

        let malformed_message_policy = match non_empty(lookup("MALFORMED_MESSAGE_POLICY")) {
            Some(v) => v.parse()?,
            None => MalformedMessagePolicy::default(),
        };
        let index_unavailable_policy = match non_empty(lookup("INDEX_UNAVAILABLE_POLICY")) {
            Some(v) => v.parse()?,
            None => IndexUnavailablePolicy::default(),
        };

        let processing = ProcessingSettings {
            max_workers: parse_or(lookup("MAX_WORKERS"), MAX_WORKERS),
            temp_dir: PathBuf::from(
                non_empty(lookup("TEMP_DIR")).unwrap_or_else(|| TEMP_DIR.to_string()),
            ),
            max_file_size_bytes: parse_or(lookup("MAX_FILE_SIZE_MB"), MAX_FILE_SIZE_MB)
                * 1024
                * 1024,
            thumbnail: ThumbnailSettings {
                width: parse_or(lookup("THUMBNAIL_WIDTH"), THUMBNAIL_SIZE),
                height: parse_or(lookup("THUMBNAIL_HEIGHT"), THUMBNAIL_SIZE),
                quality: parse_or(lookup("THUMBNAIL_QUALITY"), THUMBNAIL_QUALITY).clamp(1, 100),
            },
            malformed_message_policy,
            index_unavailable_policy,
        };

        let shutdown = ShutdownSettings {
            budget: Duration::from_secs(parse_or(
                lookup("INTERRUPTION_BUDGET_SECONDS"),
                INTERRUPTION_BUDGET_SECS,
            )),
            drain_timeout: Duration::from_secs(parse_or(
                lookup("DRAIN_TIMEOUT_SECONDS"),
                DRAIN_TIMEOUT_SECS,
            )),
            evacuation_timeout: Duration::from_secs(parse_or(
                lookup("EVACUATION_TIMEOUT_SECONDS"),
                EVACUATION_TIMEOUT_SECS,
            )),
            evacuation_upload_timeout: Duration::from_secs(parse_or(
                lookup("EVACUATION_UPLOAD_TIMEOUT_SECONDS"),
                EVACUATION_UPLOAD_TIMEOUT_SECS,
            )),
            visibility_extension_seconds: parse_or(
                lookup("INTERRUPTION_VISIBILITY_SECONDS"),
                INTERRUPTION_VISIBILITY_SECS,
            ),
            visibility_call_timeout: Duration::from_secs(parse_or(
                lookup("VISIBILITY_CALL_TIMEOUT_SECONDS"),
                VISIBILITY_CALL_TIMEOUT_SECS,
            )),
        };

        let preemption = PreemptionSettings {
            enabled: lookup("PREEMPTION_NOTICE_ENABLED")
                .map(|v| v.trim().to_lowercase())
                .map(|v| v == "true" || v == "1" || v == "yes")
                .unwrap_or(true),
            endpoint: non_empty(lookup("PREEMPTION_NOTICE_ENDPOINT"))
                .unwrap_or_else(|| PREEMPTION_NOTICE_ENDPOINT.to_string()),
            interval: Duration::from_secs(parse_or(
                lookup("PREEMPTION_NOTICE_INTERVAL_SECONDS"),
                PREEMPTION_NOTICE_INTERVAL_SECS,
            )),
            lifecycle_hook_url: non_empty(lookup("LIFECYCLE_HOOK_URL")),
        };

        Ok(WorkerConfig {
            environment,
            log_format,
            queue,
            storage,
            index,
            processing,
            shutdown,
            preemption,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.queue.queue_url.trim().is_empty() {
            return Err(anyhow::anyhow!("SQS_QUEUE_URL must be set"));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "S3_BUCKET must be set (default bucket for direct messages)"
            ));
        }

        if self.storage.backend == StorageBackend::Local && self.storage.local_path.is_none() {
            return Err(anyhow::anyhow!(
                "STORAGE_BACKEND=local requires LOCAL_STORAGE_PATH to be set"
            ));
        }

        if self.processing.max_workers == 0 {
            return Err(anyhow::anyhow!("MAX_WORKERS must be at least 1"));
        }

        if self.queue.visibility_timeout_seconds <= 0 {
            return Err(anyhow::anyhow!("SQS_VISIBILITY_TIMEOUT must be positive"));
        }

        let shutdown = &self.shutdown;
        if shutdown.drain_timeout + shutdown.evacuation_timeout >= shutdown.budget {
            return Err(anyhow::anyhow!(
                "DRAIN_TIMEOUT_SECONDS + EVACUATION_TIMEOUT_SECONDS must be below INTERRUPTION_BUDGET_SECONDS ({}s)",
                shutdown.budget.as_secs()
            ));
        }

        if shutdown.evacuation_upload_timeout > shutdown.evacuation_timeout {
            return Err(anyhow::anyhow!(
                "EVACUATION_UPLOAD_TIMEOUT_SECONDS must not exceed EVACUATION_TIMEOUT_SECONDS"
            ));
        }

        if shutdown.visibility_extension_seconds < 0 {
            return Err(anyhow::anyhow!(
                "INTERRUPTION_VISIBILITY_SECONDS must not be negative"
            ));
        }

        Ok(())
    }
}
