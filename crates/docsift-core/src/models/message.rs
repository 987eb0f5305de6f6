//! Queue messages and the file events carried in their bodies.
//!
//! Three body shapes are accepted:
//!
//! - an S3 event notification: `{"Records": [{"s3": {"bucket": {"name"}, "object": {"key"}}}]}`
//! - an EventBridge S3 event: `{"detail-type": "...", "detail": {"bucket": {"name"}, "object": {"key"}}}`
//! - a direct record: `{"bucket": "...", "key": "..."}`, where `bucket` falls back to
//!   the configured default bucket.
//!
//! Object keys inside S3 notifications are URL-encoded (`+` for space);
//! EventBridge events and direct records carry them verbatim.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A single delivery received from the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    /// Ownership token for this delivery. Changes on every redelivery.
    pub receipt_handle: String,
    pub body: String,
    pub approximate_receive_count: u32,
    pub received_at: DateTime<Utc>,
}

/// A storage object referenced by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub bucket: String,
    pub key: String,
    /// e.g. `ObjectCreated:Put`; absent for direct records
    pub event_name: Option<String>,
}

impl FileEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            event_name: None,
        }
    }

    /// Last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Lowercased extension without the dot, if the file name has one.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(pos) if pos > 0 && pos + 1 < name.len() => Some(name[pos + 1..].to_lowercase()),
            _ => None,
        }
    }

    /// Key prefix up to the file name, without a trailing slash.
    pub fn folder(&self) -> &str {
        match self.key.rfind('/') {
            Some(pos) => &self.key[..pos],
            None => "",
        }
    }

    pub fn source_url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Deserialize)]
struct S3Notification {
    #[serde(rename = "Records")]
    records: Vec<S3Record>,
}

#[derive(Deserialize)]
struct S3Record {
    #[serde(rename = "eventName")]
    event_name: Option<String>,
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Deserialize)]
struct S3Object {
    key: String,
}

#[derive(Deserialize)]
struct EventBridgeEvent {
    #[serde(rename = "detail-type")]
    detail_type: Option<String>,
    detail: S3Entity,
}

#[derive(Deserialize)]
struct DirectRecord {
    bucket: Option<String>,
    key: String,
}

fn decode_event_key(raw: &str) -> Result<String, PipelineError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|e| PipelineError::MalformedMessage(format!("object key is not UTF-8: {}", e)))
}

/// Parse a message body into the file events it references.
///
/// Returns at least one event, or `MalformedMessage`.
pub fn parse_file_events(body: &str, default_bucket: &str) -> Result<Vec<FileEvent>, PipelineError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::MalformedMessage(format!("invalid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(PipelineError::MalformedMessage(
            "message body is not a JSON object".to_string(),
        ));
    }

    let events = if value.get("Records").is_some() {
        let notification: S3Notification = serde_json::from_value(value).map_err(|e| {
            PipelineError::MalformedMessage(format!("invalid S3 event notification: {}", e))
        })?;
        notification
            .records
            .into_iter()
            .map(|record| {
                Ok(FileEvent {
                    bucket: record.s3.bucket.name,
                    key: decode_event_key(&record.s3.object.key)?,
                    event_name: record.event_name,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?
    } else if value.get("detail").is_some() {
        let event: EventBridgeEvent = serde_json::from_value(value).map_err(|e| {
            PipelineError::MalformedMessage(format!("invalid EventBridge event: {}", e))
        })?;
        vec![FileEvent {
            bucket: event.detail.bucket.name,
            key: event.detail.object.key,
            event_name: event.detail_type,
        }]
    } else {
        let record: DirectRecord = serde_json::from_value(value).map_err(|e| {
            PipelineError::MalformedMessage(format!("invalid direct record: {}", e))
        })?;
        let bucket = record
            .bucket
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| default_bucket.to_string());
        vec![FileEvent::new(bucket, record.key)]
    };

    if events.is_empty() {
        return Err(PipelineError::MalformedMessage(
            "notification contains no records".to_string(),
        ));
    }

    for event in &events {
        if event.bucket.is_empty() || event.key.is_empty() {
            return Err(PipelineError::MalformedMessage(
                "record has an empty bucket or key".to_string(),
            ));
        }
    }

    Ok(events)
}
