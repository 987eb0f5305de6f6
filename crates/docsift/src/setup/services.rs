//! Backend wiring
//!
//! Builds the queue, storage and index clients from configuration and bundles
//! them with the content router into the shared worker context.

use anyhow::{Context, Result};
use docsift_core::Config;
use docsift_index::{create_index as create_index_client, DocumentIndex};
use docsift_processing::ContentRouter;
use docsift_queue::{create_queue, MessageQueue};
use docsift_storage::{create_storage, Storage};
use docsift_worker::{PipelineSettings, WorkerContext};
use std::sync::Arc;

/// Clients shared by the scheduler, the pipeline and the interruption handler
pub struct Services {
    pub queue: Arc<dyn MessageQueue>,
    pub storage: Arc<dyn Storage>,
    pub index: Arc<dyn DocumentIndex>,
    pub ctx: WorkerContext,
}

pub async fn initialize_services(config: &Config) -> Result<Services> {
    tracing::info!("Initializing storage abstraction...");
    let storage = create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(backend = %storage.backend_type(), "Storage initialized");

    let queue = create_queue(config)
        .await
        .context("Failed to initialize queue client")?;

    let index = create_index_client(config).context("Failed to initialize index client")?;
    if index.is_connected().await {
        tracing::info!(index = %config.index().index_name, "Search index reachable");
    } else {
        tracing::warn!(
            index = %config.index().index_name,
            policy = %config.processing().index_unavailable_policy,
            "Search index not reachable at startup"
        );
    }

    let router = ContentRouter::with_defaults(config.processing().thumbnail);
    tracing::info!(
        extensions = ?router.supported_extensions(),
        "Content router initialized"
    );

    let ctx = WorkerContext::new(
        queue.clone(),
        storage.clone(),
        index.clone(),
        router,
        PipelineSettings::from_config(config),
    );

    Ok(Services {
        queue,
        storage,
        index,
        ctx,
    })
}

/// Create the search index with its mapping unless it already exists
pub async fn create_index(index: &dyn DocumentIndex) -> Result<()> {
    if !index.is_connected().await {
        return Err(anyhow::anyhow!(
            "Search index is not reachable - check OPENSEARCH_ENDPOINT"
        ));
    }

    let created = index
        .create_index_if_missing()
        .await
        .context("Failed to create search index")?;

    if created {
        tracing::info!(index = %index.index_name(), "Search index created");
    } else {
        tracing::info!(index = %index.index_name(), "Search index already exists");
    }
    Ok(())
}
