//! docsift index library
//!
//! Search index clients. Documents are upserted by their stable ID, so writing
//! the same object twice replaces the record instead of adding a second one.

pub mod disabled;
pub mod factory;
pub mod mapping;
pub mod memory;
pub mod opensearch;
pub mod traits;

pub use disabled::DisabledIndex;
pub use factory::create_index;
pub use memory::MemoryIndex;
pub use opensearch::OpenSearchIndex;
pub use traits::{DocumentIndex, IndexError, IndexResult};
