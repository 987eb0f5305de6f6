//! docsift storage library
//!
//! Object store clients addressed by bucket and key. Backends implement the
//! [`Storage`] trait; `create_storage` picks one from configuration.
//!
//! # Errors
//!
//! Callers must be able to tell a missing object from a transient failure:
//! [`StorageError::NotFound`] is permanent, every other download error may be
//! retried.
//!
//! # Derived keys
//!
//! Thumbnails and evacuated work are written under fixed prefixes. Key
//! generation is centralized in the `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use docsift_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectMetadata, Storage, StorageError, StorageResult};
