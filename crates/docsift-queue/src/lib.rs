//! docsift queue library
//!
//! The work queue is the only recovery mechanism of the pipeline: a message
//! that is neither deleted nor has its visibility extended becomes visible again
//! once its visibility timeout elapses, and the queue's redrive policy moves it
//! to a dead-letter queue after too many deliveries.
//!
//! Backends implement [`MessageQueue`]; `create_queue` picks one from the queue URL
//! (`memory://` selects [`MemoryQueue`]).

pub mod factory;
pub mod memory;
#[cfg(feature = "queue-sqs")]
pub mod sqs;
pub mod traits;

pub use factory::create_queue;
pub use memory::MemoryQueue;
#[cfg(feature = "queue-sqs")]
pub use sqs::SqsQueue;
pub use traits::{MessageQueue, QueueError, QueueResult};
