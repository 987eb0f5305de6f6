//! Error types module
//!
//! `PipelineError` is the taxonomy surfaced per queue message. Every variant
//! self-describes how the consumer must treat the message through
//! [`ErrorMetadata`]: delete it, leave it for redelivery, or continue in a
//! degraded mode.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected conditions
    Debug,
    /// Info level - for terminal outcomes that are not failures
    Info,
    /// Warning level - for degraded or recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// What the consumer does with the message after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The message can never succeed; delete it.
    Terminal,
    /// Leave the message undeleted so the queue redelivers it.
    Retryable,
    /// Log and keep going; the message is still acknowledged.
    Degraded,
}

/// Metadata describing how an error should be handled and reported
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "DOWNLOAD_FAILED")
    fn error_code(&self) -> &'static str;

    /// Default handling of the message that produced this error
    fn disposition(&self) -> Disposition;

    /// Whether this error is recoverable by redelivery
    fn is_recoverable(&self) -> bool {
        self.disposition() == Disposition::Retryable
    }

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Object not found: s3://{bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Thumbnail upload failed: {0}")]
    ThumbnailUploadFailed(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Index write failed: {0}")]
    IndexWriteFailed(String),

    #[error("Acknowledge failed: {0}")]
    AcknowledgeFailed(String),
}

impl ErrorMetadata for PipelineError {
    fn error_code(&self) -> &'static str {
        match self {
            PipelineError::MalformedMessage(_) => "MALFORMED_MESSAGE",
            PipelineError::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            PipelineError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            PipelineError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            PipelineError::DownloadFailed(_) => "DOWNLOAD_FAILED",
            PipelineError::ExtractionFailed(_) => "EXTRACTION_FAILED",
            PipelineError::ThumbnailUploadFailed(_) => "THUMBNAIL_UPLOAD_FAILED",
            PipelineError::IndexUnavailable(_) => "INDEX_UNAVAILABLE",
            PipelineError::IndexWriteFailed(_) => "INDEX_WRITE_FAILED",
            PipelineError::AcknowledgeFailed(_) => "ACKNOWLEDGE_FAILED",
        }
    }

    fn disposition(&self) -> Disposition {
        match self {
            PipelineError::MalformedMessage(_)
            | PipelineError::UnsupportedType(_)
            | PipelineError::ObjectNotFound { .. }
            | PipelineError::FileTooLarge { .. } => Disposition::Terminal,
            PipelineError::DownloadFailed(_)
            | PipelineError::ExtractionFailed(_)
            | PipelineError::IndexWriteFailed(_)
            | PipelineError::AcknowledgeFailed(_) => Disposition::Retryable,
            PipelineError::ThumbnailUploadFailed(_) | PipelineError::IndexUnavailable(_) => {
                Disposition::Degraded
            }
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            PipelineError::UnsupportedType(_) => LogLevel::Info,
            PipelineError::ObjectNotFound { .. } | PipelineError::FileTooLarge { .. } => {
                LogLevel::Warn
            }
            PipelineError::ThumbnailUploadFailed(_) | PipelineError::IndexUnavailable(_) => {
                LogLevel::Warn
            }
            PipelineError::MalformedMessage(_)
            | PipelineError::DownloadFailed(_)
            | PipelineError::ExtractionFailed(_)
            | PipelineError::IndexWriteFailed(_)
            | PipelineError::AcknowledgeFailed(_) => LogLevel::Error,
        }
    }
}
