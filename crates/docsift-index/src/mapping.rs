//! Index settings and field mappings for [`docsift_core::Document`].

use serde_json::{json, Value};

/// Body of the create-index request.
pub fn index_definition() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "bucket": { "type": "keyword" },
                "key": { "type": "keyword" },
                "source_url": { "type": "keyword" },
                "file_name": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword", "ignore_above": 512 } }
                },
                "file_type": { "type": "keyword" },
                "mime_type": { "type": "keyword" },
                "file_size": { "type": "long" },
                "folder": { "type": "keyword" },
                "extracted_text": { "type": "text" },
                "char_count": { "type": "integer" },
                "word_count": { "type": "integer" },
                "page_count": { "type": "integer" },
                "metadata": { "type": "object", "enabled": false },
                "processor_name": { "type": "keyword" },
                "processing_time_seconds": { "type": "float" },
                "thumbnail_url": { "type": "keyword", "index": false },
                "processed_at": { "type": "date" },
                "indexed_at": { "type": "date" }
            }
        }
    })
}
