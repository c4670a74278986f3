//! Image preprocessing for the pipeline.
//!
//! The raw submission is validated, downscaled to a bounded size suitable
//! for OCR, and re-encoded as JPEG. Thumbnails are a smaller variant of
//! the same transform, returned base64-encoded for embedding in the job
//! record.

use std::io::Cursor;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;

use crate::config::{PreprocessConfig, ThumbnailConfig};
use crate::error::MediaError;

/// Checks that the bytes are a decodable image in a supported format.
pub fn validate_image(data: &[u8]) -> Result<(), MediaError> {
    image::guess_format(data).map_err(|_| MediaError::UnsupportedFormat)?;
    image::load_from_memory(data).map_err(|e| MediaError::Decode(e.to_string()))?;
    Ok(())
}

/// Downscales the image so its longest side fits `max_dimension` and
/// re-encodes it as JPEG at the configured quality.
pub fn preprocess(data: &[u8], config: &PreprocessConfig) -> Result<Vec<u8>, MediaError> {
    let _span = tracing::info_span!("media.preprocess").entered();

    let img = image::load_from_memory(data).map_err(|e| MediaError::Decode(e.to_string()))?;
    let img = bounded(img, config.max_dimension);

    encode_jpeg(&img, config.jpeg_quality)
}

/// Produces a base64-encoded JPEG thumbnail.
pub fn make_thumbnail(data: &[u8], config: &ThumbnailConfig) -> Result<String, MediaError> {
    let _span = tracing::info_span!("media.thumbnail").entered();

    let img = image::load_from_memory(data).map_err(|e| MediaError::Decode(e.to_string()))?;
    let thumb = img.thumbnail(config.max_dimension, config.max_dimension);

    let jpeg = encode_jpeg(&thumb, 80)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
}

/// Resizes the image down (never up) so that max(width, height) <= bound,
/// preserving aspect ratio.
fn bounded(img: image::DynamicImage, bound: u32) -> image::DynamicImage {
    let (width, height) = img.dimensions();
    if width <= bound && height <= bound {
        return img;
    }
    img.resize(bound, bound, image::imageops::FilterType::Triangle)
}

fn encode_jpeg(img: &image::DynamicImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    // JPEG has no alpha channel; flatten to RGB first.
    let rgb = img.to_rgb8();

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| MediaError::Encode(e.to_string()))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encodes a solid-color PNG of the given size.
    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 180, 40]));
        let mut buffer = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn test_preprocess_config() -> PreprocessConfig {
        PreprocessConfig {
            max_dimension: 64,
            jpeg_quality: 85,
        }
    }

    #[test]
    fn test_validate_accepts_png() {
        assert!(validate_image(&sample_png(8, 8)).is_ok());
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let result = validate_image(b"definitely not an image");
        assert!(matches!(result, Err(MediaError::UnsupportedFormat)));
    }

    #[test]
    fn test_validate_rejects_truncated_image() {
        let mut data = sample_png(32, 32);
        data.truncate(20);
        assert!(validate_image(&data).is_err());
    }

    #[test]
    fn test_preprocess_downscales_large_image() {
        let jpeg = preprocess(&sample_png(200, 100), &test_preprocess_config()).unwrap();

        let img = image::load_from_memory(&jpeg).unwrap();
        let (width, height) = img.dimensions();
        assert!(width <= 64 && height <= 64);
        // Aspect ratio is preserved.
        assert_eq!(width, 64);
        assert_eq!(height, 32);
    }

    #[test]
    fn test_preprocess_keeps_small_image_size() {
        let jpeg = preprocess(&sample_png(20, 10), &test_preprocess_config()).unwrap();

        let img = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(img.dimensions(), (20, 10));
    }

    #[test]
    fn test_preprocess_outputs_jpeg() {
        let jpeg = preprocess(&sample_png(20, 10), &test_preprocess_config()).unwrap();
        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_thumbnail_is_base64_jpeg() {
        let thumb = make_thumbnail(&sample_png(100, 100), &ThumbnailConfig { max_dimension: 32 })
            .unwrap();

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(thumb)
            .unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert!(img.dimensions().0 <= 32);
    }

    #[test]
    fn test_preprocess_fails_on_invalid_data() {
        let result = preprocess(b"nope", &test_preprocess_config());
        assert!(matches!(result, Err(MediaError::Decode(_))));
    }
}
