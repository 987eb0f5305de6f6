//! Application setup and initialization
//!
//! Configuration checks, tracing, backend wiring and the long-running worker
//! loop, kept out of main.rs so each step can fail with its own context.

pub mod runner;
pub mod services;
pub mod shutdown;
pub mod validation;

use anyhow::{Context, Result};
use docsift_core::Config;

/// Service name reported in the tracing initialization line
const SERVICE_NAME: &str = "docsift";

/// Validate configuration, then initialize tracing
pub fn initialize(config: &Config) -> Result<()> {
    // Validate configuration first - fail fast on misconfiguration
    validation::validate_config(config).context("Configuration validation failed")?;

    docsift_infra::init_telemetry(config.log_format(), SERVICE_NAME, config.environment())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!("Configuration loaded and validated successfully");
    validation::log_config_summary(config);

    Ok(())
}
