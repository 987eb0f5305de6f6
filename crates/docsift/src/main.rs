mod setup;

use clap::Parser;
use docsift_core::Config;

// Use mimalloc as the global allocator for lower fragmentation under many
// concurrent downloads, especially on musl-based container images.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "docsift")]
#[command(about = "Ingest documents announced on a queue into a search index", long_about = None)]
struct Cli {
    /// Check the configuration and exit
    #[arg(long)]
    validate_only: bool,

    /// Create the search index if it does not exist and exit
    #[arg(long, conflicts_with = "validate_only")]
    create_index: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    // Validate and start tracing before anything touches the network
    crate::setup::initialize(&config)?;

    if cli.validate_only {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    let services = crate::setup::services::initialize_services(&config).await?;

    if cli.create_index {
        crate::setup::services::create_index(services.index.as_ref()).await?;
        docsift_infra::shutdown_telemetry().await;
        return Ok(());
    }

    crate::setup::runner::run_worker(&config, services).await?;

    Ok(())
}
