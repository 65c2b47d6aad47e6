//! Image encoding helpers shared by the compositor, the frame source and the
//! RPC boundary.
//!
//! Images cross process boundaries as `data:` URLs, exactly like the
//! extension's messaging layer carries them.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, RgbaImage};

use crate::types::capture::OutputFormat;
use crate::types::errors::StitchError;

/// Encode bytes to base64 string.
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode base64 string to bytes.
pub fn base64_decode(input: &str) -> Result<Vec<u8>, String> {
    BASE64
        .decode(input.trim())
        .map_err(|e| format!("base64 decode error: {}", e))
}

/// Wraps encoded image bytes in a `data:<mime>;base64,` URL.
pub fn encode_data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, base64_encode(bytes))
}

/// Splits a base64 `data:` URL into its MIME type and payload bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), String> {
    let rest = url
        .trim()
        .strip_prefix("data:")
        .ok_or("not a data url")?;
    let (header, payload) = rest.split_once(',').ok_or("data url has no payload")?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or("data url is not base64 encoded")?;
    let bytes = base64_decode(payload)?;
    Ok((mime.to_string(), bytes))
}

/// Maps a `0.0..=1.0` quality to a JPEG quality in `1..=100`.
pub fn jpeg_quality(quality: f32) -> u8 {
    let q = if quality.is_finite() { quality.clamp(0.0, 1.0) } else { 0.92 };
    ((q * 100.0).round() as u8).max(1)
}

/// Decodes any supported encoded image into RGBA pixels.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, StitchError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| StitchError::Decode(e.to_string()))
}

/// Encodes an RGBA surface. JPEG output drops the alpha channel.
pub fn encode_rgba(
    surface: &RgbaImage,
    format: OutputFormat,
    quality: f32,
) -> Result<Vec<u8>, StitchError> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        OutputFormat::Png => {
            surface
                .write_with_encoder(PngEncoder::new(&mut buffer))
                .map_err(|e| StitchError::Encode(e.to_string()))?;
        }
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(surface.clone()).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(quality));
            rgb.write_with_encoder(encoder)
                .map_err(|e| StitchError::Encode(e.to_string()))?;
        }
    }
    Ok(buffer.into_inner())
}
