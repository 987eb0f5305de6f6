//! PDF text capability, backed by `pdf-extract`.

use crate::traits::{run_blocking, ContentExtractor, ExtractionError, ExtractionResult};
use async_trait::async_trait;
use docsift_core::ExtractedContent;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

/// Count page objects (`/Type /Page`, not `/Type /Pages`) in the raw file.
fn count_pages(bytes: &[u8]) -> Option<u32> {
    let mut pages = 0u32;
    for pattern in [&b"/Type /Page"[..], &b"/Type/Page"[..]] {
        let mut offset = 0;
        while let Some(pos) = find(&bytes[offset..], pattern) {
            let end = offset + pos + pattern.len();
            if bytes.get(end) != Some(&b's') {
                pages += 1;
            }
            offset = end;
        }
    }
    (pages > 0).then_some(pages)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[async_trait]
impl ContentExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    async fn extract(&self, path: &Path) -> ExtractionResult<ExtractedContent> {
        let bytes = tokio::fs::read(path).await?;
        if !bytes.starts_with(b"%PDF") {
            return Err(ExtractionError::Failed(
                "file does not start with a PDF header".to_string(),
            ));
        }

        run_blocking(move || {
            let text = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| ExtractionError::Failed(e.to_string()))?;
            Ok(ExtractedContent {
                text: text.trim().to_string(),
                page_count: count_pages(&bytes),
                ..Default::default()
            })
        })
        .await
    }
}
