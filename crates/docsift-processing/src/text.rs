//! Plain text capability.

use crate::traits::{ContentExtractor, ExtractionResult};
use async_trait::async_trait;
use docsift_core::ExtractedContent;
use std::path::Path;

const TEXT_EXTENSIONS: &[&str] = &["txt", "csv", "tsv", "log", "md", "rst", "json", "xml"];

/// Reads the file as UTF-8, replacing invalid sequences.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

#[async_trait]
impl ContentExtractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        TEXT_EXTENSIONS
    }

    async fn extract(&self, path: &Path) -> ExtractionResult<ExtractedContent> {
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8_lossy(&bytes);
        // strip a UTF-8 byte order mark
        let text = text
            .strip_prefix('\u{feff}')
            .unwrap_or(text.as_ref())
            .to_string();

        let mut content = ExtractedContent {
            text,
            ..Default::default()
        };
        content.metadata.insert(
            "line_count".to_string(),
            serde_json::json!(content.text.lines().count()),
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_text_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"\xef\xbb\xbfline one\nline \xff two\n").unwrap();

        let content = TextExtractor.extract(&path).await.unwrap();
        assert!(content.text.starts_with("line one"));
        assert!(content.text.contains('\u{fffd}'));
        assert_eq!(content.metadata["line_count"], 2);
        assert!(content.thumbnail.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = TextExtractor
            .extract(Path::new("/nonexistent/docsift/file.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::ExtractionError::Io(_)));
    }
}
