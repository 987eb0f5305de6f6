//! docsift processing library
//!
//! Extraction capabilities selected by file extension. The [`ContentRouter`]
//! maps a lowercased extension to a [`ContentExtractor`]; unknown extensions
//! are unsupported and the message carrying them is skipped.
//!
//! Capabilities:
//!
//! - plain text (`txt`, `csv`, `tsv`, `log`, `md`, `rst`, `json`, `xml`)
//! - PDF text (`pdf`, feature `document`)
//! - images with a JPEG thumbnail (feature `image`)

#[cfg(feature = "image")]
pub mod image;
pub mod mime;
#[cfg(feature = "document")]
pub mod pdf;
pub mod router;
pub mod text;
pub mod traits;

#[cfg(feature = "image")]
pub use crate::image::ImageExtractor;
pub use mime::mime_type_for_extension;
#[cfg(feature = "document")]
pub use pdf::PdfExtractor;
pub use router::ContentRouter;
pub use text::TextExtractor;
pub use traits::{ContentExtractor, ExtractionError, ExtractionResult};
