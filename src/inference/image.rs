//! Image preprocessing before upload: RGB, bounded size, JPEG, base64.
use std::path::Path;

use base64::{Engine as _, engine::general_purpose};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use super::InferenceError;

/// Target dimensions with the longer edge at most `max_edge`, aspect
/// ratio preserved. Returns `None` when no resize is needed.
pub fn scaled_dimensions(width: u32, height: u32, max_edge: u32) -> Option<(u32, u32)> {
    let long = width.max(height);
    if long <= max_edge || long == 0 {
        return None;
    }
    let scale = |d: u32| {
        let scaled = (u64::from(d) * u64::from(max_edge) + u64::from(long) / 2) / u64::from(long);
        (scaled as u32).clamp(1, max_edge)
    };
    Some((scale(width), scale(height)))
}

/// Decode `path`, downscale, re-encode as JPEG and return it base64-encoded.
pub fn encode_image(path: &Path, max_edge: u32, quality: u8) -> Result<String, InferenceError> {
    let image_err = |source| InferenceError::Image {
        path: path.display().to_string(),
        source,
    };

    let decoded = image::open(path).map_err(image_err)?;
    let mut rgb = decoded.to_rgb8();

    if let Some((w, h)) = scaled_dimensions(rgb.width(), rgb.height(), max_edge) {
        tracing::debug!(
            "Resizing {} from {}x{} to {w}x{h}",
            path.display(),
            rgb.width(),
            rgb.height()
        );
        rgb = image::imageops::resize(&rgb, w, h, FilterType::Lanczos3);
    }

    let mut jpeg = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
        encoder.encode_image(&rgb).map_err(image_err)?;
    }

    Ok(general_purpose::STANDARD.encode(&jpeg))
}
