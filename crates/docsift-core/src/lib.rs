//! docsift core library
//!
//! Configuration, the per-message error taxonomy and the domain models shared by
//! every docsift crate: queue messages, file events, processing results and the
//! index document.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    Config, IndexSettings, IndexUnavailablePolicy, LogFormat, MalformedMessagePolicy,
    PreemptionSettings, ProcessingSettings, QueueSettings, ShutdownSettings, StorageSettings,
    ThumbnailSettings, WorkerConfig,
};
pub use error::{Disposition, ErrorMetadata, LogLevel, PipelineError};
pub use models::{
    document_id, parse_file_events, Document, ExtractedContent, FileEvent, ProcessingResult,
    QueueMessage,
};
pub use storage_types::StorageBackend;
