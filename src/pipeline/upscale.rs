//! Upscale sizing policy and the per-image upscale step.
//!
//! OCR quality on phone photos of menus improves sharply with resolution, so
//! each photo is upscaled by an integer factor that brings its longest edge
//! to at least the target size. Photos that are already large enough skip the
//! remote call entirely and keep their original reference.

use crate::error::ItemError;
use crate::menu::{ImageItem, UpscaledImage};
use crate::pipeline::{encode, input};
use crate::remote::Upscaler;
use tracing::{debug, info};

/// Integer factor bringing the longest edge to at least `target`.
///
/// `ceil(target / max(width, height))`; a degenerate 0×0 image is treated as
/// 1 px so the division is defined.
pub fn scale_factor(width: u32, height: u32, target: u32) -> u32 {
    let longest = width.max(height).max(1);
    target.div_ceil(longest)
}

/// Upscale one photo, or return its own reference when no upscaling is needed.
pub async fn upscale_item(
    upscaler: &dyn Upscaler,
    item: &ImageItem,
    target: u32,
    download_timeout_secs: u64,
) -> Result<UpscaledImage, ItemError> {
    let source = item.source();
    let bytes = input::fetch_bytes(&source, download_timeout_secs).await?;
    let info = encode::probe(&bytes)?;
    let factor = scale_factor(info.width, info.height, target);
    debug!(
        "{}: {}x{}, scale factor {}",
        item.file_name, info.width, info.height, factor
    );

    if factor <= 1 {
        info!("{}: already at target resolution, skipping upscale", item.file_name);
        return Ok(UpscaledImage { url: source });
    }

    let data_uri = input::to_data_uri(&bytes, info.mime_type());
    let outputs = upscaler.upscale(&data_uri, factor).await?;
    let url = outputs
        .into_iter()
        .next()
        .ok_or_else(|| ItemError::EmptyOutput {
            capability: "upscale".into(),
        })?;
    Ok(UpscaledImage { url })
}
