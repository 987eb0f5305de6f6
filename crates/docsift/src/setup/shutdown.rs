//! Interruption triggers
//!
//! A process signal or a spot interruption notice starts the interruption
//! protocol. Neither trigger does any work itself; they only resolve a future
//! or cancel a token that the runner is waiting on.

use anyhow::{Context, Result};
use docsift_core::Config;
use docsift_infra::{
    watch_for_preemption, HttpLifecycleHook, InstanceMetadataClient, LifecycleHook,
    NoopLifecycleHook, PreemptionNotice, PreemptionSource,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const LIFECYCLE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves on Ctrl+C (SIGINT) or SIGTERM with the signal's name.
///
/// A handler that cannot be installed is logged and never fires, so the
/// other one keeps working.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
            "SIGINT"
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
            "SIGTERM"
        },
    }
}

/// Start polling instance metadata for a spot interruption notice.
///
/// `trigger` is cancelled when a notice arrives. Returns `None` when the
/// watcher is disabled by configuration.
pub fn spawn_preemption_watcher(
    config: &Config,
    stop: CancellationToken,
    trigger: CancellationToken,
) -> Result<Option<JoinHandle<Option<PreemptionNotice>>>> {
    let settings = config.preemption();
    if !settings.enabled {
        tracing::info!("Preemption watcher disabled");
        return Ok(None);
    }

    let source: Arc<dyn PreemptionSource> = Arc::new(
        InstanceMetadataClient::new(&settings.endpoint)
            .context("Failed to create instance metadata client")?,
    );

    Ok(Some(tokio::spawn(watch_for_preemption(
        source,
        settings.interval,
        stop,
        trigger,
    ))))
}

/// Lifecycle acknowledgment target for the final step of the protocol
pub fn lifecycle_hook(config: &Config) -> Result<Arc<dyn LifecycleHook>> {
    match config.preemption().lifecycle_hook_url.as_deref() {
        Some(url) => {
            tracing::info!(url = %url, "Lifecycle hook configured");
            let hook = HttpLifecycleHook::new(url, LIFECYCLE_REQUEST_TIMEOUT)
                .context("Failed to create lifecycle hook client")?;
            Ok(Arc::new(hook))
        }
        None => Ok(Arc::new(NoopLifecycleHook)),
    }
}
