//! Per-message processing state machine.
//!
//! `Received → Validated → Downloaded → Routed → Extracted → (ThumbnailUploaded)
//! → Indexed → Acknowledged`. Every exit is a [`MessageOutcome`]; only
//! `Success`, `Skipped` and `Dropped` delete the message. Cancellation is
//! observed at stage boundaries, never in the middle of a transfer.

use crate::context::WorkerContext;
use crate::state::TaskHandle;
use docsift_core::{
    parse_file_events, Document, ErrorMetadata, FileEvent, IndexUnavailablePolicy, LogLevel,
    MalformedMessagePolicy, PipelineError, ProcessingResult, QueueMessage,
};
use docsift_processing::{mime_type_for_extension, ExtractionError};
use docsift_storage::keys::thumbnail_key;
use docsift_storage::ObjectMetadata;
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Instant;
use tempfile::TempPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Validated,
    Downloaded,
    Routed,
    Extracted,
    ThumbnailUploaded,
    Indexed,
    Acknowledged,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Downloaded => "downloaded",
            Stage::Routed => "routed",
            Stage::Extracted => "extracted",
            Stage::ThumbnailUploaded => "thumbnail_uploaded",
            Stage::Indexed => "indexed",
            Stage::Acknowledged => "acknowledged",
        };
        f.write_str(name)
    }
}

/// Result of processing one queue message.
#[derive(Debug, Clone)]
pub enum MessageOutcome {
    /// All records processed. `indexed` is false when indexing was skipped in degraded mode.
    Success { indexed: bool },
    /// Nothing to do, ever (unsupported type, missing or oversized object).
    Skipped(String),
    /// Leave the message for redelivery.
    Retry(PipelineError),
    /// Delete without processing (malformed message under the delete policy).
    Dropped(PipelineError),
    /// Interrupted at a checkpoint; the message is left for another consumer.
    Cancelled(Stage),
}

impl MessageOutcome {
    pub fn deletes_message(&self) -> bool {
        matches!(
            self,
            MessageOutcome::Success { .. } | MessageOutcome::Skipped(_) | MessageOutcome::Dropped(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            MessageOutcome::Success { .. } => "success",
            MessageOutcome::Skipped(_) => "skipped",
            MessageOutcome::Retry(_) => "retry",
            MessageOutcome::Dropped(_) => "dropped",
            MessageOutcome::Cancelled(_) => "cancelled",
        }
    }
}

/// How a single record of a message ended, short of success.
enum RecordExit {
    Skip(PipelineError),
    Fail(PipelineError),
    Cancelled(Stage),
}

fn log_pipeline_error(error: &PipelineError, event: &FileEvent) {
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, code, bucket = %event.bucket, key = %event.key, "Record not processed")
        }
        LogLevel::Info => {
            tracing::info!(error = %error, code, bucket = %event.bucket, key = %event.key, "Record not processed")
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, code, bucket = %event.bucket, key = %event.key, "Record not processed")
        }
        LogLevel::Error => {
            tracing::error!(error = %error, code, bucket = %event.bucket, key = %event.key, "Record not processed")
        }
    }
}

fn checkpoint(task: &TaskHandle, stage: Stage) -> Result<(), RecordExit> {
    task.reach(stage);
    if task.is_cancelled() {
        return Err(RecordExit::Cancelled(stage));
    }
    Ok(())
}

/// Checkpoint while owning the local file. A cancelled task hands the file to
/// the pool state for evacuation instead of deleting it.
fn checkpoint_holding(task: &TaskHandle, stage: Stage, file: TempPath) -> Result<TempPath, RecordExit> {
    task.reach(stage);
    if task.is_cancelled() {
        task.hand_over(file);
        return Err(RecordExit::Cancelled(stage));
    }
    Ok(file)
}

/// Run one message through the pipeline and acknowledge it when the outcome allows.
#[tracing::instrument(
    skip(ctx, message, task),
    fields(
        message_id = %message.message_id,
        receive_count = message.approximate_receive_count,
        task_id = %task.id()
    )
)]
pub async fn process_message(
    ctx: &WorkerContext,
    message: &QueueMessage,
    task: &TaskHandle,
) -> MessageOutcome {
    let started = Instant::now();
    task.reach(Stage::Received);
    let outcome = evaluate(ctx, message, task).await;

    // Completed work is acknowledged even after cancellation.
    if outcome.deletes_message() {
        match ctx.queue.delete_message(&message.receipt_handle).await {
            Ok(()) => {
                task.mark_acknowledged();
                task.reach(Stage::Acknowledged);
            }
            Err(e) => {
                let error = PipelineError::AcknowledgeFailed(e.to_string());
                tracing::error!(
                    error = %error,
                    outcome = outcome.label(),
                    "Message not deleted; it will be redelivered"
                );
            }
        }
    }

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    match &outcome {
        MessageOutcome::Success { indexed } => {
            tracing::info!(indexed, duration_ms, "Message processed")
        }
        MessageOutcome::Skipped(reason) => {
            tracing::info!(reason = %reason, duration_ms, "Message skipped")
        }
        MessageOutcome::Retry(error) => {
            tracing::warn!(error = %error, code = error.error_code(), duration_ms, "Message left for redelivery")
        }
        MessageOutcome::Dropped(error) => {
            tracing::error!(error = %error, code = error.error_code(), duration_ms, "Message dropped")
        }
        MessageOutcome::Cancelled(stage) => {
            tracing::warn!(stage = %stage, duration_ms, "Message processing interrupted")
        }
    }
    outcome
}

async fn evaluate(ctx: &WorkerContext, message: &QueueMessage, task: &TaskHandle) -> MessageOutcome {
    let events = match parse_file_events(&message.body, &ctx.settings.default_bucket) {
        Ok(events) => events,
        Err(error) => {
            return match ctx.settings.malformed_message_policy {
                MalformedMessagePolicy::Delete => MessageOutcome::Dropped(error),
                MalformedMessagePolicy::Retry => MessageOutcome::Retry(error),
            }
        }
    };

    let total = events.len();
    let mut succeeded = 0usize;
    let mut all_indexed = true;
    let mut skipped = Vec::new();
    let mut retry = None;

    for (n, event) in events.iter().enumerate() {
        task.update(|progress| {
            progress.bucket = Some(event.bucket.clone());
            progress.key = Some(event.key.clone());
            progress.marker = Some(format!("record {}/{}", n + 1, total));
            progress.local_path = None;
            progress.partial_text = None;
        });

        match process_record(ctx, event, task).await {
            Ok(indexed) => {
                succeeded += 1;
                all_indexed &= indexed;
            }
            Err(RecordExit::Skip(error)) => {
                log_pipeline_error(&error, event);
                skipped.push(error.to_string());
            }
            Err(RecordExit::Fail(error)) => {
                log_pipeline_error(&error, event);
                retry.get_or_insert(error);
            }
            Err(RecordExit::Cancelled(stage)) => return MessageOutcome::Cancelled(stage),
        }
    }

    if let Some(error) = retry {
        MessageOutcome::Retry(error)
    } else if succeeded > 0 {
        MessageOutcome::Success {
            indexed: all_indexed,
        }
    } else {
        MessageOutcome::Skipped(skipped.join("; "))
    }
}

/// Process one file. `Ok(indexed)` on success.
async fn process_record(
    ctx: &WorkerContext,
    event: &FileEvent,
    task: &TaskHandle,
) -> Result<bool, RecordExit> {
    let extension = event.extension().unwrap_or_default();
    if !ctx.router.is_supported(&extension) {
        let shown = if extension.is_empty() { "(none)" } else { extension.as_str() };
        return Err(RecordExit::Skip(PipelineError::UnsupportedType(shown.to_string())));
    }

    let file_size = match ctx.storage.content_length(&event.bucket, &event.key).await {
        Ok(size) => size,
        Err(e) if e.is_not_found() => return Err(RecordExit::Skip(not_found(event))),
        Err(e) => return Err(RecordExit::Fail(PipelineError::DownloadFailed(e.to_string()))),
    };
    let limit = ctx.settings.max_file_size_bytes;
    if file_size > limit {
        return Err(RecordExit::Skip(PipelineError::FileTooLarge {
            size: file_size,
            limit,
        }));
    }
    checkpoint(task, Stage::Validated)?;

    let local = download(ctx, event, &extension).await?;
    task.update(|progress| progress.local_path = Some(local.to_path_buf()));
    let local = checkpoint_holding(task, Stage::Downloaded, local)?;

    let Some(extractor) = ctx.router.route(&extension) else {
        return Err(RecordExit::Skip(PipelineError::UnsupportedType(extension)));
    };
    let local = checkpoint_holding(task, Stage::Routed, local)?;

    let started = Instant::now();
    let content = match extractor.extract(&local).await {
        Ok(content) => content,
        Err(ExtractionError::UnsupportedType(detail)) => {
            return Err(RecordExit::Skip(PipelineError::UnsupportedType(detail)))
        }
        Err(e) => return Err(RecordExit::Fail(PipelineError::ExtractionFailed(e.to_string()))),
    };
    let result = ProcessingResult::from_content(extractor.name(), content, started.elapsed());
    task.update(|progress| progress.partial_text = Some(result.extracted_text.clone()));
    let local = checkpoint_holding(task, Stage::Extracted, local)?;
    drop(local);
    task.update(|progress| progress.local_path = None);

    tracing::debug!(
        key = %event.key,
        processor = %result.processor_name,
        chars = result.char_count,
        duration_ms = result.processing_duration.as_secs_f64() * 1000.0,
        "Content extracted"
    );

    let mut thumbnail_url = None;
    if let Some(bytes) = result.thumbnail_bytes.clone() {
        thumbnail_url = upload_thumbnail(ctx, event, bytes).await;
        if thumbnail_url.is_some() {
            checkpoint(task, Stage::ThumbnailUploaded)?;
        }
    }

    let document = Document::new(
        event,
        file_size,
        mime_type_for_extension(&extension),
        &result,
        thumbnail_url,
    );

    if !ctx.index.is_connected().await {
        let error = PipelineError::IndexUnavailable(ctx.index.index_name().to_string());
        return match ctx.settings.index_unavailable_policy {
            IndexUnavailablePolicy::Skip => {
                log_pipeline_error(&error, event);
                Ok(false)
            }
            IndexUnavailablePolicy::Fail => Err(RecordExit::Fail(error)),
        };
    }

    ctx.index
        .upsert(&document.id, &document)
        .await
        .map_err(|e| RecordExit::Fail(PipelineError::IndexWriteFailed(e.to_string())))?;
    task.reach(Stage::Indexed);
    tracing::debug!(document_id = %document.id, key = %event.key, "Document indexed");
    Ok(true)
}

fn not_found(event: &FileEvent) -> PipelineError {
    PipelineError::ObjectNotFound {
        bucket: event.bucket.clone(),
        key: event.key.clone(),
    }
}

/// Download into a uniquely named file under the temp dir. The returned path is
/// deleted when dropped, so every exit path cleans up.
async fn download(
    ctx: &WorkerContext,
    event: &FileEvent,
    extension: &str,
) -> Result<TempPath, RecordExit> {
    let temp_dir = &ctx.settings.temp_dir;
    tokio::fs::create_dir_all(temp_dir)
        .await
        .map_err(|e| RecordExit::Fail(PipelineError::DownloadFailed(e.to_string())))?;

    let suffix = format!(".{}", extension);
    let path = tempfile::Builder::new()
        .prefix("docsift-")
        .suffix(&suffix)
        .tempfile_in(temp_dir)
        .map_err(|e| RecordExit::Fail(PipelineError::DownloadFailed(e.to_string())))?
        .into_temp_path();

    match ctx.storage.download_to(&event.bucket, &event.key, &path).await {
        Ok(bytes) => {
            tracing::debug!(key = %event.key, bytes, "Object downloaded");
            Ok(path)
        }
        Err(e) if e.is_not_found() => Err(RecordExit::Skip(not_found(event))),
        Err(e) => Err(RecordExit::Fail(PipelineError::DownloadFailed(e.to_string()))),
    }
}

/// Best effort: a failed upload is logged and the document is indexed without a thumbnail.
async fn upload_thumbnail(ctx: &WorkerContext, event: &FileEvent, bytes: Vec<u8>) -> Option<String> {
    let bucket = ctx
        .settings
        .thumbnail_bucket
        .as_deref()
        .unwrap_or(&event.bucket);
    let key = thumbnail_key(&ctx.settings.thumbnail_prefix, &event.key);
    let mut metadata = ObjectMetadata::new();
    metadata.insert("original-key".to_string(), event.key.clone());

    match ctx
        .storage
        .upload(bucket, &key, bytes, "image/jpeg", &metadata)
        .await
    {
        Ok(url) => Some(url),
        Err(e) => {
            log_pipeline_error(&PipelineError::ThumbnailUploadFailed(e.to_string()), event);
            None
        }
    }
}
