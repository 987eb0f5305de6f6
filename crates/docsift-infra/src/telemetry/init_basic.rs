use docsift_core::LogFormat;
use std::io::Write;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "docsift=info,docsift_worker=info,aws_config=warn,aws_smithy_runtime=warn";

/// Initialize tracing for the process
pub fn init_telemetry(
    format: LogFormat,
    service_name: &str,
    environment: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
    }

    tracing::info!(
        service = %service_name,
        environment = %environment,
        "Tracing initialized"
    );
    Ok(())
}

/// Flush buffered log output. Called from the interruption protocol so the
/// shutdown trail is on disk before the instance disappears.
pub fn flush_telemetry() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
    flush_telemetry();
}
