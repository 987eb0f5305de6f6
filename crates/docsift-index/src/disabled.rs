//! Index used when no endpoint is configured. Always reports "not connected".

use crate::traits::{DocumentIndex, IndexError, IndexResult};
use async_trait::async_trait;
use docsift_core::Document;

pub struct DisabledIndex {
    name: String,
}

impl DisabledIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl DocumentIndex for DisabledIndex {
    async fn upsert(&self, _id: &str, _document: &Document) -> IndexResult<()> {
        Err(IndexError::Unavailable(
            "no index endpoint configured".to_string(),
        ))
    }

    async fn is_connected(&self) -> bool {
        false
    }

    async fn create_index_if_missing(&self) -> IndexResult<bool> {
        Err(IndexError::ConfigError(
            "OPENSEARCH_ENDPOINT not configured".to_string(),
        ))
    }

    fn index_name(&self) -> &str {
        &self.name
    }
}
