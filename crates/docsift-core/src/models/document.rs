//! Processing results and the search index document.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::message::FileEvent;

/// Stable document ID: lowercase hex SHA-256 of `"{bucket}/{key}"`.
///
/// Re-processing the same object always targets the same index record.
pub fn document_id(bucket: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bucket.as_bytes());
    hasher.update(b"/");
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Output of a content extraction capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    pub text: String,
    pub page_count: Option<u32>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Encoded JPEG thumbnail, for capabilities that render one.
    pub thumbnail: Option<Vec<u8>>,
}

/// Result of processing one file. Consumed by the indexing step and then dropped.
#[derive(Debug, Clone, Default)]
pub struct ProcessingResult {
    pub extracted_text: String,
    pub char_count: usize,
    pub word_count: usize,
    pub page_count: Option<u32>,
    pub thumbnail_bytes: Option<Vec<u8>>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub processor_name: String,
    pub processing_duration: Duration,
}

impl ProcessingResult {
    pub fn from_content(
        processor_name: &str,
        content: ExtractedContent,
        processing_duration: Duration,
    ) -> Self {
        Self {
            char_count: content.text.chars().count(),
            word_count: content.text.split_whitespace().count(),
            extracted_text: content.text,
            page_count: content.page_count,
            thumbnail_bytes: content.thumbnail,
            metadata: content.metadata,
            processor_name: processor_name.to_string(),
            processing_duration,
        }
    }
}

/// Index record. Upserted by [`Document::id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub bucket: String,
    pub key: String,
    pub source_url: String,
    pub file_name: String,
    pub file_type: String,
    pub mime_type: String,
    pub file_size: u64,
    pub folder: String,
    pub extracted_text: String,
    pub char_count: usize,
    pub word_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub processor_name: String,
    pub processing_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        event: &FileEvent,
        file_size: u64,
        mime_type: &str,
        result: &ProcessingResult,
        thumbnail_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: document_id(&event.bucket, &event.key),
            bucket: event.bucket.clone(),
            key: event.key.clone(),
            source_url: event.source_url(),
            file_name: event.file_name().to_string(),
            file_type: event.extension().unwrap_or_default(),
            mime_type: mime_type.to_string(),
            file_size,
            folder: event.folder().to_string(),
            extracted_text: result.extracted_text.clone(),
            char_count: result.char_count,
            word_count: result.word_count,
            page_count: result.page_count,
            metadata: result.metadata.clone(),
            processor_name: result.processor_name.clone(),
            processing_time_seconds: result.processing_duration.as_secs_f64(),
            thumbnail_url,
            processed_at: now,
            indexed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_pure_function_of_bucket_and_key() {
        let a = document_id("docs", "a/b.pdf");
        assert_eq!(a, document_id("docs", "a/b.pdf"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, document_id("docs", "a/c.pdf"));
        assert_ne!(a, document_id("other", "a/b.pdf"));
        // the separator keeps "ab"+"c" distinct from "a"+"bc"
        assert_ne!(document_id("ab", "c"), document_id("a", "bc"));
    }

    #[test]
    fn result_counts_text() {
        let content = ExtractedContent {
            text: "hello  wörld\nagain".to_string(),
            ..Default::default()
        };
        let result = ProcessingResult::from_content("text", content, Duration::from_millis(5));
        assert_eq!(result.char_count, 18);
        assert_eq!(result.word_count, 3);
    }

    #[test]
    fn document_carries_source_fields() {
        let event = FileEvent::new("docs", "team/notes.txt");
        let result = ProcessingResult::from_content(
            "text",
            ExtractedContent {
                text: "abc".to_string(),
                ..Default::default()
            },
            Duration::from_secs(1),
        );
        let doc = Document::new(&event, 3, "text/plain", &result, None);
        assert_eq!(doc.id, document_id("docs", "team/notes.txt"));
        assert_eq!(doc.source_url, "s3://docs/team/notes.txt");
        assert_eq!(doc.file_type, "txt");
        assert_eq!(doc.folder, "team");

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("thumbnail_url").is_none());
        assert_eq!(json["char_count"], 3);
    }
}
