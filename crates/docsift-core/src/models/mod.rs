//! Domain models

pub mod document;
pub mod message;

pub use document::{document_id, Document, ExtractedContent, ProcessingResult};
pub use message::{parse_file_events, FileEvent, QueueMessage};
