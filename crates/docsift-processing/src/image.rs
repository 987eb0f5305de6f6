//! Image capability: dimensions, format and a JPEG thumbnail.

use crate::traits::{run_blocking, ContentExtractor, ExtractionError, ExtractionResult};
use ::image::codecs::jpeg::JpegEncoder;
use ::image::{DynamicImage, GenericImageView, ImageReader};
use async_trait::async_trait;
use docsift_core::{ExtractedContent, ThumbnailSettings};
use std::io::Cursor;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"];

#[derive(Debug, Clone, Copy)]
pub struct ImageExtractor {
    thumbnail: ThumbnailSettings,
}

impl ImageExtractor {
    pub fn new(thumbnail: ThumbnailSettings) -> Self {
        Self { thumbnail }
    }
}

impl Default for ImageExtractor {
    fn default() -> Self {
        Self::new(ThumbnailSettings::default())
    }
}

/// Fit `img` inside the thumbnail box (aspect preserved) and encode as JPEG.
pub fn render_thumbnail(img: &DynamicImage, settings: ThumbnailSettings) -> ExtractionResult<Vec<u8>> {
    let thumb = img.thumbnail(settings.width, settings.height).to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, settings.quality)
        .encode_image(&thumb)
        .map_err(|e| ExtractionError::Failed(format!("thumbnail encoding failed: {}", e)))?;
    Ok(buf)
}

#[async_trait]
impl ContentExtractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        IMAGE_EXTENSIONS
    }

    async fn extract(&self, path: &Path) -> ExtractionResult<ExtractedContent> {
        let data = tokio::fs::read(path).await?;
        let settings = self.thumbnail;

        run_blocking(move || {
            let reader = ImageReader::new(Cursor::new(data.as_slice()))
                .with_guessed_format()
                .map_err(ExtractionError::Io)?;
            let format = reader
                .format()
                .map(|f| format!("{:?}", f).to_lowercase())
                .unwrap_or_else(|| "unknown".to_string());
            let img = reader
                .decode()
                .map_err(|e| ExtractionError::Failed(format!("image decode failed: {}", e)))?;
            let (width, height) = img.dimensions();

            let mut content = ExtractedContent {
                thumbnail: Some(render_thumbnail(&img, settings)?),
                ..Default::default()
            };
            content
                .metadata
                .insert("width".to_string(), serde_json::json!(width));
            content
                .metadata
                .insert("height".to_string(), serde_json::json!(height));
            content
                .metadata
                .insert("format".to_string(), serde_json::json!(format));
            Ok(content)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{ImageFormat, RgbImage};

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            ::image::Rgb([(x % 255) as u8, (y % 255) as u8, 128])
        });
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[tokio::test]
    async fn extracts_dimensions_and_bounded_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        write_png(&path, 800, 400);

        let content = ImageExtractor::default().extract(&path).await.unwrap();
        assert_eq!(content.metadata["width"], 800);
        assert_eq!(content.metadata["height"], 400);
        assert_eq!(content.metadata["format"], "png");
        assert!(content.text.is_empty());

        let thumb = content.thumbnail.unwrap();
        let decoded = ::image::load_from_memory(&thumb).unwrap();
        assert_eq!(
            ::image::guess_format(&thumb).unwrap(),
            ImageFormat::Jpeg
        );
        assert_eq!(decoded.dimensions(), (200, 100));
    }

    #[tokio::test]
    async fn corrupt_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"\xff\xd8\xff\xe0 not really a jpeg").unwrap();
        assert!(ImageExtractor::default().extract(&path).await.is_err());
    }
}
