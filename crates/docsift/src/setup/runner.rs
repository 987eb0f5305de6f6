//! Worker main loop
//!
//! Runs the queue consumer until an interruption trigger fires, then hands
//! control to the interruption protocol and reports final statistics.

use super::services::Services;
use super::shutdown;
use anyhow::{Context, Result};
use docsift_core::Config;
use docsift_infra::host_identity;
use docsift_worker::{
    InterruptionHandler, Scheduler, SchedulerConfig, ShutdownConfig, WorkerPoolState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Added to the long-poll wait when waiting for the consumer to return.
const CONSUMER_STOP_GRACE: Duration = Duration::from_secs(5);

pub async fn run_worker(config: &Config, services: Services) -> Result<()> {
    let lifecycle = shutdown::lifecycle_hook(config)?;
    let state = Arc::new(WorkerPoolState::new());
    let scheduler_config = SchedulerConfig::from_config(config);
    let poll_wait =
        Duration::from_secs(u64::try_from(scheduler_config.wait_time_seconds).unwrap_or(0));

    let scheduler = Scheduler::new(services.ctx.clone(), state.clone(), scheduler_config);
    let mut consumer = tokio::spawn(scheduler.run());

    let stop_watcher = CancellationToken::new();
    let preempted = CancellationToken::new();
    let watcher =
        shutdown::spawn_preemption_watcher(config, stop_watcher.clone(), preempted.clone())?;

    tracing::info!(host = %host_identity(), "docsift worker running");

    let reason = tokio::select! {
        signal = shutdown::shutdown_signal() => format!("received {}", signal),
        _ = preempted.cancelled() => "spot interruption notice".to_string(),
        result = &mut consumer => {
            stop_watcher.cancel();
            let dispatched = result.context("Queue consumer task failed")?;
            return Err(anyhow::anyhow!(
                "Queue consumer stopped unexpectedly after dispatching {} messages",
                dispatched
            ));
        }
    };
    stop_watcher.cancel();

    let handler = InterruptionHandler::new(
        state.clone(),
        services.queue.clone(),
        services.storage.clone(),
        lifecycle,
        ShutdownConfig::from_config(config, host_identity()),
        config.processing().temp_dir.clone(),
    );
    let report = handler.run(&reason).await;
    tracing::info!(
        reason = %report.reason,
        evacuated = report.evacuated,
        visibility_extended = report.visibility_extended,
        elapsed_seconds = report.elapsed_seconds,
        "Instance vacated"
    );

    // Admission is closed; the consumer returns once its current receive completes
    match tokio::time::timeout(poll_wait + CONSUMER_STOP_GRACE, &mut consumer).await {
        Ok(Ok(dispatched)) => tracing::info!(dispatched, "Queue consumer stopped"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Queue consumer task failed"),
        Err(_) => {
            tracing::warn!("Queue consumer did not stop in time, aborting");
            consumer.abort();
        }
    }
    if let Some(watcher) = watcher {
        watcher.abort();
    }

    tracing::info!("Final report");
    state.statistics().log_report();
    docsift_infra::shutdown_telemetry().await;

    Ok(())
}
