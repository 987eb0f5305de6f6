//! Content router: extension to capability lookup.

use crate::traits::ContentExtractor;
use docsift_core::ThumbnailSettings;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of extraction capabilities keyed by lowercased extension.
///
/// Built once at startup and shared read-only between workers.
pub struct ContentRouter {
    by_extension: HashMap<String, Arc<dyn ContentExtractor>>,
}

impl ContentRouter {
    /// Create an empty router. Every extension is unsupported.
    pub fn new() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Router with every capability compiled into this build.
    pub fn with_defaults(thumbnail: ThumbnailSettings) -> Self {
        let mut router = Self::new();
        router.register(crate::TextExtractor);
        #[cfg(feature = "document")]
        router.register(crate::PdfExtractor);
        #[cfg(feature = "image")]
        router.register(crate::ImageExtractor::new(thumbnail));
        #[cfg(not(feature = "image"))]
        let _ = thumbnail;
        router
    }

    /// Register a capability for all of its extensions, replacing earlier ones.
    pub fn register<E: ContentExtractor + 'static>(&mut self, extractor: E) {
        let extractor: Arc<dyn ContentExtractor> = Arc::new(extractor);
        for ext in extractor.supported_extensions() {
            if let Some(previous) = self
                .by_extension
                .insert(ext.to_lowercase(), extractor.clone())
            {
                tracing::debug!(
                    extension = %ext,
                    previous = previous.name(),
                    replacement = extractor.name(),
                    "Extractor replaced"
                );
            }
        }
    }

    /// Capability for an extension (with or without the leading dot, any case).
    pub fn route(&self, extension: &str) -> Option<Arc<dyn ContentExtractor>> {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.by_extension.get(&ext).cloned()
    }

    pub fn is_supported(&self, extension: &str) -> bool {
        self.route(extension).is_some()
    }

    /// Sorted list of supported extensions.
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.by_extension.keys().cloned().collect();
        exts.sort();
        exts
    }
}

impl Default for ContentRouter {
    fn default() -> Self {
        Self::with_defaults(ThumbnailSettings::default())
    }
}
