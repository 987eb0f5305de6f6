//! Shared collaborators handed to every worker task.

use crate::settings::PipelineSettings;
use docsift_index::DocumentIndex;
use docsift_processing::ContentRouter;
use docsift_queue::MessageQueue;
use docsift_storage::Storage;
use std::sync::Arc;

/// Clients and settings used by the per-message pipeline.
///
/// The clients are stateless request/response wrappers and are shared between
/// workers without locking.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<dyn MessageQueue>,
    pub storage: Arc<dyn Storage>,
    pub index: Arc<dyn DocumentIndex>,
    pub router: Arc<ContentRouter>,
    pub settings: Arc<PipelineSettings>,
}

impl WorkerContext {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        storage: Arc<dyn Storage>,
        index: Arc<dyn DocumentIndex>,
        router: ContentRouter,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            queue,
            storage,
            index,
            router: Arc::new(router),
            settings: Arc::new(settings),
        }
    }
}
