//! docsift worker library
//!
//! The queue-driven processing pipeline and its interruption-safe shutdown:
//!
//! - [`Scheduler`]: long-poll loop feeding a bounded worker pool
//! - [`process_message`]: the per-message state machine
//! - [`WorkerPoolState`]: admission flag, in-flight set and statistics
//! - [`InterruptionHandler`]: drains, evacuates and hands work back to the queue
//!   within a hard deadline
//!
//! Every step of message processing is safe to re-run; the queue's visibility
//! timeout is the only recovery mechanism.

pub mod context;
pub mod interruption;
pub mod pipeline;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod stats;

pub use context::WorkerContext;
pub use interruption::{InterruptionHandler, InterruptionPhase, InterruptionReport};
pub use pipeline::{process_message, MessageOutcome, Stage};
pub use scheduler::Scheduler;
pub use settings::{PipelineSettings, SchedulerConfig, ShutdownConfig};
pub use state::{TaskHandle, TaskProgress, TaskSnapshot, WorkerPoolState};
pub use stats::{Statistics, StatsSnapshot};
