use crate::{DisabledIndex, DocumentIndex, IndexResult, OpenSearchIndex};
use docsift_core::Config;
use std::sync::Arc;

/// Create an index client based on configuration
///
/// Without `OPENSEARCH_ENDPOINT` the returned index is never connected, so the
/// configured index-unavailable policy applies to every message.
pub fn create_index(config: &Config) -> IndexResult<Arc<dyn DocumentIndex>> {
    let settings = config.index();
    match settings.endpoint.as_deref() {
        Some(endpoint) => Ok(Arc::new(OpenSearchIndex::new(
            endpoint,
            &settings.index_name,
            settings.timeout,
        )?)),
        None => {
            tracing::warn!("OPENSEARCH_ENDPOINT not set, indexing disabled");
            Ok(Arc::new(DisabledIndex::new(settings.index_name.clone())))
        }
    }
}
