//! Where viewport screenshots come from.
//!
//! The coordinator only knows the [`ViewportCapturer`] seam. The host shell
//! feeds [`PresentedFrames`] with the latest rendered frame of each window.

use std::collections::HashMap;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::sync::RwLock;

use crate::services::image_codec;
use crate::types::capture::OutputFormat;
use crate::types::errors::{CaptureError, StitchError};

/// Requested encoding for one viewport screenshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScreenshotFormat {
    Png,
    /// JPEG with quality in `1..=100`.
    Jpeg(u8),
}

/// Captures the visible viewport of a browser window.
#[async_trait]
pub trait ViewportCapturer: Send + Sync {
    async fn capture_visible(&self, window_id: i64, format: ScreenshotFormat) -> Result<Vec<u8>, CaptureError>;
}

/// Latest presented frame per window.
pub struct PresentedFrames {
    frames: RwLock<HashMap<i64, RgbaImage>>,
}

impl PresentedFrames {
    pub fn new() -> Self {
        Self {
            frames: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the visible frame of `window_id`.
    pub async fn present(&self, window_id: i64, frame: RgbaImage) {
        self.frames.write().await.insert(window_id, frame);
    }

    /// Decodes an encoded frame (PNG, JPEG, ...) and presents it.
    pub async fn present_encoded(&self, window_id: i64, bytes: &[u8]) -> Result<(), CaptureError> {
        let frame = image_codec::decode_rgba(bytes).map_err(|e| CaptureError::Screenshot(e.to_string()))?;
        self.present(window_id, frame).await;
        Ok(())
    }

    pub async fn forget(&self, window_id: i64) {
        self.frames.write().await.remove(&window_id);
    }
}

impl Default for PresentedFrames {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ViewportCapturer for PresentedFrames {
    async fn capture_visible(&self, window_id: i64, format: ScreenshotFormat) -> Result<Vec<u8>, CaptureError> {
        let frames = self.frames.read().await;
        let frame = frames
            .get(&window_id)
            .ok_or_else(|| CaptureError::Screenshot("No screenshot data returned.".to_string()))?;
        let encoded = match format {
            ScreenshotFormat::Png => image_codec::encode_rgba(frame, OutputFormat::Png, 1.0),
            ScreenshotFormat::Jpeg(q) => {
                image_codec::encode_rgba(frame, OutputFormat::Jpeg, q as f32 / 100.0)
            }
        };
        encoded.map_err(|e: StitchError| CaptureError::Screenshot(e.to_string()))
    }
}
