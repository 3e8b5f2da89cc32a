//! Local image transforms: probing and size-budget recompression.
//!
//! The extraction request carries every photo inline, and vision APIs cap the
//! size of each image part. Upscaled photos routinely exceed that, so each one
//! is re-encoded as JPEG at falling quality until it fits. The budget is soft:
//! if even the lowest quality step is too large the image is sent anyway and a
//! warning is logged.

use crate::error::ItemError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::{debug, warn};

/// First quality tried when an image is over budget.
pub const START_QUALITY: u8 = 90;
/// Quality decrement between attempts.
pub const QUALITY_STEP: u8 = 10;
/// The loop stops once the next quality would be at or below this value.
pub const MIN_QUALITY: u8 = 10;

/// Width, height and detected format of an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageFormat>,
}

impl ImageInfo {
    /// Mime type used when the image is sent inline.
    pub fn mime_type(&self) -> &'static str {
        match self.format {
            Some(ImageFormat::Png) => "image/png",
            _ => "image/jpeg",
        }
    }
}

/// Read the dimensions from the image header without decoding pixels.
pub fn probe(bytes: &[u8]) -> Result<ImageInfo, ItemError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image_error)?;
    let format = reader.format();
    let (width, height) = reader.into_dimensions().map_err(image_error)?;
    Ok(ImageInfo {
        width,
        height,
        format,
    })
}

/// Outcome of [`compress_to_budget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    /// Quality of the last re-encode; `None` when the input already fitted.
    pub quality: Option<u8>,
    /// Number of re-encodes performed.
    pub attempts: usize,
}

impl Compressed {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Re-encode `bytes` with `encode(quality)` until they fit under `max_bytes`.
///
/// Qualities tried: 90, 80, …, 20 — at most eight attempts. Input that
/// already fits is returned untouched. The encoder is a parameter so the
/// loop can be driven without real image data.
pub fn compress_to_budget<F>(bytes: Vec<u8>, max_bytes: usize, mut encode: F) -> Result<Compressed, ItemError>
where
    F: FnMut(u8) -> Result<Vec<u8>, ItemError>,
{
    let mut current = bytes;
    let mut quality = START_QUALITY;
    let mut last_quality = None;
    let mut attempts = 0;

    while current.len() > max_bytes && quality > MIN_QUALITY {
        current = encode(quality)?;
        attempts += 1;
        last_quality = Some(quality);
        debug!(
            "Re-encoded at quality {}: {:.2} MB",
            quality,
            current.len() as f64 / 1024.0 / 1024.0
        );
        quality -= QUALITY_STEP;
    }

    if current.len() > max_bytes {
        warn!(
            "Could not compress below {:.2} MB; sending {:.2} MB",
            max_bytes as f64 / 1024.0 / 1024.0,
            current.len() as f64 / 1024.0 / 1024.0
        );
    }

    Ok(Compressed {
        bytes: current,
        quality: last_quality,
        attempts,
    })
}

/// Decode once and JPEG-encode at falling quality until under `max_bytes`.
///
/// CPU-bound: call from `spawn_blocking` (see [`compress_image`]).
pub fn compress_image_blocking(bytes: Vec<u8>, max_bytes: usize) -> Result<Compressed, ItemError> {
    if bytes.len() <= max_bytes {
        return Ok(Compressed {
            bytes,
            quality: None,
            attempts: 0,
        });
    }

    let rgb = image::load_from_memory(&bytes).map_err(image_error)?.to_rgb8();
    compress_to_budget(bytes, max_bytes, |quality| {
        let mut out = Vec::new();
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
            .map_err(image_error)?;
        Ok(out)
    })
}

/// Async wrapper running [`compress_image_blocking`] off the async workers.
pub async fn compress_image(bytes: Vec<u8>, max_bytes: usize) -> Result<Compressed, ItemError> {
    tokio::task::spawn_blocking(move || compress_image_blocking(bytes, max_bytes))
        .await
        .map_err(|e| ItemError::Image {
            detail: format!("compression task panicked: {e}"),
        })?
}

fn image_error(e: impl std::fmt::Display) -> ItemError {
    ItemError::Image {
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    const MIB: usize = 1024 * 1024;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 30, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode should succeed");
        buf
    }

    #[test]
    fn probe_reads_dimensions_and_format() {
        let info = probe(&png_bytes(12, 7)).unwrap();
        assert_eq!((info.width, info.height), (12, 7));
        assert_eq!(info.format, Some(ImageFormat::Png));
        assert_eq!(info.mime_type(), "image/png");
    }

    #[test]
    fn probe_rejects_garbage() {
        assert!(matches!(probe(b"not an image"), Err(ItemError::Image { .. })));
    }

    #[test]
    fn under_budget_is_untouched() {
        let input = vec![7u8; 100];
        let out = compress_to_budget(input.clone(), 1000, |_| panic!("must not encode")).unwrap();
        assert_eq!(out.bytes, input);
        assert_eq!(out.attempts, 0);
        assert_eq!(out.quality, None);
    }

    #[test]
    fn stops_as_soon_as_under_budget() {
        let mut seen = Vec::new();
        let out = compress_to_budget(vec![0; 8 * MIB], 5 * MIB, |q| {
            seen.push(q);
            // 80 is the first quality that fits.
            Ok(vec![0; if q > 80 { 6 * MIB } else { 4 * MIB }])
        })
        .unwrap();
        assert_eq!(seen, vec![90, 80]);
        assert_eq!(out.quality, Some(80));
        assert_eq!(out.bytes.len(), 4 * MIB);
    }

    #[test]
    fn gives_up_after_eight_attempts() {
        let mut seen = Vec::new();
        let out = compress_to_budget(vec![0; 8 * MIB], 5 * MIB, |q| {
            seen.push(q);
            Ok(vec![0; 8 * MIB])
        })
        .unwrap();
        assert_eq!(seen, vec![90, 80, 70, 60, 50, 40, 30, 20]);
        assert_eq!(out.attempts, 8);
        // Soft budget: the oversized payload is still returned.
        assert_eq!(out.bytes.len(), 8 * MIB);
    }

    #[test]
    fn encoder_errors_propagate() {
        let err = compress_to_budget(vec![0; 10], 5, |_| {
            Err(ItemError::Image {
                detail: "boom".into(),
            })
        })
        .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn real_image_is_reencoded_as_jpeg() {
        let png = png_bytes(64, 64);
        let budget = png.len() - 1;
        let out = compress_image_blocking(png, budget).unwrap();
        assert!(out.attempts >= 1);
        assert_eq!(out.quality.map(|q| q % 10), Some(0));
        let info = probe(&out.bytes).unwrap();
        assert_eq!(info.format, Some(ImageFormat::Jpeg));
        assert_eq!((info.width, info.height), (64, 64));
    }

    #[tokio::test]
    async fn async_wrapper_passes_small_images_through() {
        let png = png_bytes(8, 8);
        let out = compress_image(png.clone(), MIB).await.unwrap();
        assert_eq!(out.bytes, png);
        assert!(out.to_base64().starts_with("iVBORw0KGgo"));
    }
}
