//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff format | `image::guess_format` |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory_with_format` |
//! | Resize | `DynamicImage::resize` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with quality |
//! | Encode → PNG/TIFF/WebP | `DynamicImage::write_to` (lossless) |
//!
//! Re-encoding drops EXIF/IPTC/XMP blocks, so every variant is metadata-free.

use super::backend::{BackendError, ImageBackend};
use super::calculations::fit_within;
use super::params::VariantParams;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageFormat};
use std::io::Cursor;

/// Content types the backend can decode and re-encode.
///
/// GIF (animation) and SVG (vector) are always copied verbatim.
const VARIABLE_CONTENT_TYPES: &[(&str, ImageFormat)] = &[
    ("image/jpeg", ImageFormat::Jpeg),
    ("image/jpg", ImageFormat::Jpeg),
    ("image/png", ImageFormat::Png),
    ("image/tiff", ImageFormat::Tiff),
    ("image/webp", ImageFormat::WebP),
];

/// Whether assets of this content type get a reduced variant.
pub fn supports_variants(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    VARIABLE_CONTENT_TYPES
        .iter()
        .any(|(t, fmt)| *t == ct && fmt.reading_enabled())
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn sniff(bytes: &[u8]) -> Result<ImageFormat, BackendError> {
    let format = image::guess_format(bytes)
        .map_err(|e| BackendError::Unsupported(format!("unrecognized image data: {e}")))?;
    if VARIABLE_CONTENT_TYPES.iter().any(|(_, f)| *f == format) {
        Ok(format)
    } else {
        Err(BackendError::Unsupported(format!("{format:?}")))
    }
}

fn decode(bytes: &[u8], format: ImageFormat) -> Result<DynamicImage, BackendError> {
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode image: {e}")))
}

/// Encode in the same container the source used.
fn encode(img: &DynamicImage, format: ImageFormat, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100) as u8)
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")))?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut out), other).map_err(|e| {
                BackendError::ProcessingFailed(format!("{other:?} encode failed: {e}"))
            })?;
        }
    }
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn reduce(&self, bytes: &[u8], params: &VariantParams) -> Result<Vec<u8>, BackendError> {
        let format = sniff(bytes)?;
        let img = decode(bytes, format)?;
        let img = match fit_within(
            (img.width(), img.height()),
            (params.max_width, params.max_height),
        ) {
            Some((w, h)) => img.resize(w, h, FilterType::Lanczos3),
            None => img,
        };
        encode(&img, format, params.quality.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use image::RgbImage;

    /// Encode a small valid JPEG with the given dimensions.
    fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Vec::new();
        JpegEncoder::new(&mut out)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    fn dims(bytes: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(bytes).unwrap();
        (img.width(), img.height())
    }

    fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([10, 20, 30, 128]),
        ));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn supports_variants_for_raster_formats_only() {
        assert!(supports_variants("image/jpeg"));
        assert!(supports_variants("IMAGE/PNG"));
        assert!(supports_variants("image/webp"));
        assert!(!supports_variants("image/gif"));
        assert!(!supports_variants("image/svg+xml"));
        assert!(!supports_variants("application/pdf"));
    }

    #[test]
    fn reduce_garbage_errors() {
        let backend = RustBackend::new();
        let err = backend
            .reduce(b"definitely not an image", &VariantParams::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::Unsupported(_)));
    }

    #[test]
    fn reduce_gif_is_unsupported() {
        let backend = RustBackend::new();
        let err = backend
            .reduce(b"GIF89a\x01\x00\x01\x00", &VariantParams::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::Unsupported(_)));
    }

    #[test]
    fn reduce_downscales_oversized_jpeg() {
        let backend = RustBackend::new();
        let params = VariantParams {
            max_width: 120,
            max_height: 120,
            quality: Quality::new(80),
        };
        let out = backend.reduce(&create_test_jpeg(400, 200), &params).unwrap();

        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
        assert_eq!(dims(&out), (120, 60));
    }

    #[test]
    fn reduce_keeps_small_image_dimensions() {
        let backend = RustBackend::new();
        let out = backend
            .reduce(&create_test_jpeg(64, 48), &VariantParams::default())
            .unwrap();
        assert_eq!(dims(&out), (64, 48));
    }

    #[test]
    fn reduce_png_stays_png() {
        let backend = RustBackend::new();
        let params = VariantParams {
            max_width: 50,
            max_height: 50,
            quality: Quality::default(),
        };
        let out = backend.reduce(&create_test_png(100, 100), &params).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
        assert_eq!(dims(&out), (50, 50));
    }

    #[test]
    fn reduce_truncated_jpeg_errors() {
        let backend = RustBackend::new();
        let mut bytes = create_test_jpeg(100, 100);
        bytes.truncate(40);
        assert!(backend.reduce(&bytes, &VariantParams::default()).is_err());
    }
}
