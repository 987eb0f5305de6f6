//! docsift infrastructure library
//!
//! Process-level concerns around the pipeline: tracing setup and flushing,
//! the instance-metadata preemption watcher, and the orchestration lifecycle
//! acknowledgment sent once the instance has vacated.

pub mod host;
#[cfg(feature = "lifecycle")]
pub mod lifecycle;
#[cfg(feature = "preemption")]
pub mod preemption;
pub mod telemetry;

pub use host::host_identity;
#[cfg(feature = "lifecycle")]
pub use lifecycle::{HttpLifecycleHook, LifecycleHook, NoopLifecycleHook};
#[cfg(feature = "preemption")]
pub use preemption::{
    watch_for_preemption, InstanceMetadataClient, PreemptionNotice, PreemptionSource,
};
pub use telemetry::{flush_telemetry, init_telemetry, shutdown_telemetry};
