//! Tracing initialization
//!
//! Plain or JSON formatted output through `tracing-subscriber`, filtered by
//! `RUST_LOG` (default `docsift=info`).

mod init_basic;

pub use init_basic::{flush_telemetry, init_telemetry, shutdown_telemetry};
