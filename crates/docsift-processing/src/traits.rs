//! Extraction capability trait

use async_trait::async_trait;
use docsift_core::ExtractedContent;
use std::path::Path;
use thiserror::Error;

/// Extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Extraction failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Extraction task aborted: {0}")]
    TaskAborted(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// A capability turning a local file into text, metadata and an optional thumbnail.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Name recorded on the index document (`processor_name`).
    fn name(&self) -> &'static str;

    /// Lowercased extensions, without the dot.
    fn supported_extensions(&self) -> &[&'static str];

    /// Extract content from the file at `path`.
    ///
    /// CPU-heavy work runs on the blocking pool so worker tasks stay responsive.
    async fn extract(&self, path: &Path) -> ExtractionResult<ExtractedContent>;
}

/// Run blocking extraction work off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> ExtractionResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ExtractionResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractionError::TaskAborted(e.to_string()))?
}
