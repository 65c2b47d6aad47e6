//! Background-side capture coordinator.
//!
//! Bridges page requests to the compositor: owns the session registry,
//! takes viewport screenshots, enforces policy and tab affinity, and
//! publishes [`CaptureEvent`]s for the UI.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use image::imageops;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::managers::session_registry::{SessionRegistry, SessionRegistryTrait};
use crate::services::frame_source::{ScreenshotFormat, ViewportCapturer};
use crate::services::image_codec;
use crate::services::policy_gate::PolicyGate;
use crate::services::stitch_worker::StitcherHandle;
use crate::types::capture::{
    CaptureEvent, CaptureMeta, CaptureProgress, CapturedImage, CssRect, MessageSender, OutputFormat,
    TileRequest,
};
use crate::types::errors::{CaptureError, SessionError};
use crate::types::policy::ActionKind;
use crate::types::settings::CaptureSettings;

const EVENT_CAPACITY: usize = 64;

/// Encoding and deadline parameters used by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub tile_quality: u8,
    pub output_format: OutputFormat,
    pub output_quality: f32,
    pub step_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&CaptureSettings::default())
    }
}

impl From<&CaptureSettings> for CoordinatorConfig {
    fn from(s: &CaptureSettings) -> Self {
        Self {
            tile_quality: s.tile_quality.clamp(1, 100),
            output_format: s.output_format,
            output_quality: s.output_quality,
            step_timeout: s.step_timeout(),
        }
    }
}

/// Coordinates full-page and region captures for every tab.
pub struct CaptureCoordinator {
    registry: Mutex<SessionRegistry>,
    stitcher: StitcherHandle,
    capturer: Arc<dyn ViewportCapturer>,
    policy: Arc<PolicyGate>,
    config: RwLock<CoordinatorConfig>,
    events: broadcast::Sender<CaptureEvent>,
}

impl CaptureCoordinator {
    pub fn new(
        stitcher: StitcherHandle,
        capturer: Arc<dyn ViewportCapturer>,
        policy: Arc<PolicyGate>,
        config: CoordinatorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry: Mutex::new(SessionRegistry::new()),
            stitcher,
            capturer,
            policy,
            config: RwLock::new(config),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    /// Publishes an event; having no listener is fine.
    pub fn publish(&self, event: CaptureEvent) {
        let _ = self.events.send(event);
    }

    pub async fn config(&self) -> CoordinatorConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: CoordinatorConfig) {
        *self.config.write().await = config;
    }

    pub async fn open_sessions(&self) -> usize {
        self.registry.lock().await.session_count()
    }

    async fn authorize(&self, sender: &MessageSender) -> Result<(), CaptureError> {
        let url = sender.url.as_deref().unwrap_or("");
        self.policy
            .check_action(url, &ActionKind::Screenshot)
            .await
            .map_err(CaptureError::from)
    }

    async fn with_deadline<T, E>(
        &self,
        step: &str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, CaptureError>
    where
        E: Into<CaptureError>,
    {
        let deadline = self.config.read().await.step_timeout;
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(CaptureError::Timeout(step.to_string())),
        }
    }

    /// Opens a session for the sender's tab and starts a canvas for it.
    pub async fn init(&self, sender: &MessageSender, meta: CaptureMeta) -> Result<String, CaptureError> {
        self.authorize(sender).await?;
        let (tab_id, window_id) = match (sender.tab_id, sender.window_id) {
            (Some(tab), Some(window)) => (tab, window),
            _ => return Err(SessionError::MissingTab.into()),
        };

        let session_id = self.registry.lock().await.open(tab_id, window_id, meta)?;

        self.publish(CaptureEvent::CaptureStarted);
        self.publish(CaptureEvent::CaptureHint {
            text: "Capturing full page… (scrolling briefly)".to_string(),
        });

        if let Err(e) = self
            .with_deadline("stitch begin", self.stitcher.begin(&session_id, meta))
            .await
        {
            self.registry.lock().await.close(&session_id);
            self.stitcher.abort(&session_id).await;
            return Err(e);
        }

        info!(%session_id, tab_id, window_id, "full-page capture session opened");
        Ok(session_id)
    }

    /// Captures the sender's viewport and appends it at `scroll_y_css`.
    pub async fn grab(&self, sender: &MessageSender, req: &TileRequest) -> Result<(), CaptureError> {
        self.authorize(sender).await?;
        let tab_id = sender.tab_id.ok_or(SessionError::MissingTab)?;
        let window_id = {
            let registry = self.registry.lock().await;
            registry.validate(&req.session_id, tab_id)?.window_id
        };
        if !req.scroll_y_css.is_finite() || req.scroll_y_css < 0.0 {
            return Err(CaptureError::InvalidInput(format!(
                "scrollYCss must be a non-negative number, got {}",
                req.scroll_y_css
            )));
        }

        if req.total > 0 {
            self.publish(CaptureEvent::CaptureHint {
                text: CaptureProgress {
                    index: req.index,
                    total: req.total,
                }
                .hint(),
            });
        }

        let quality = self.config.read().await.tile_quality;
        let tile = self
            .with_deadline(
                "viewport capture",
                self.capturer
                    .capture_visible(window_id, ScreenshotFormat::Jpeg(quality)),
            )
            .await?;
        self.with_deadline(
            "stitch append",
            self.stitcher.append(&req.session_id, tile, req.scroll_y_css),
        )
        .await?;

        debug!(session_id = %req.session_id, index = req.index, total = req.total, "tile appended");
        Ok(())
    }

    /// Finishes the canvas and closes the session.
    ///
    /// The session stays registered when finishing fails; the page follows
    /// up with [`CaptureCoordinator::abort`].
    pub async fn complete(&self, sender: &MessageSender, session_id: &str) -> Result<CapturedImage, CaptureError> {
        self.authorize(sender).await?;
        let tab_id = sender.tab_id.ok_or(SessionError::MissingTab)?;
        self.registry.lock().await.validate(session_id, tab_id)?;

        let config = self.config().await;
        let result = self
            .with_deadline(
                "stitch finish",
                self.stitcher
                    .finish(session_id, config.output_format, config.output_quality),
            )
            .await
            .and_then(|image| {
                if image.bytes.is_empty() {
                    Err(CaptureError::NoImage)
                } else {
                    Ok(image)
                }
            });

        match result {
            Ok(image) => {
                self.registry.lock().await.close(session_id);
                info!(session_id, width = image.width, height = image.height, "full-page capture complete");
                self.publish(CaptureEvent::CaptureDone {
                    image_data_url: image_codec::encode_data_url(&image.bytes, image.format.mime()),
                    width: image.width,
                    height: image.height,
                });
                Ok(image)
            }
            Err(e) => {
                warn!(session_id, error = %e, "full-page stitch failed");
                self.publish(CaptureEvent::AnalysisError { text: e.to_string() });
                Err(e)
            }
        }
    }

    /// Releases a session and its canvas. Never fails.
    pub async fn abort(&self, session_id: Option<&str>, reason: &str) {
        if let Some(id) = session_id.filter(|id| !id.trim().is_empty()) {
            self.registry.lock().await.close(id);
            let deadline = self.config.read().await.step_timeout;
            if tokio::time::timeout(deadline, self.stitcher.abort(id)).await.is_err() {
                warn!(session_id = id, "stitch abort timed out");
            }
        }
        let reason = if reason.trim().is_empty() {
            "Full page capture aborted."
        } else {
            reason
        };
        warn!(session_id = session_id.unwrap_or(""), reason, "full-page capture aborted");
        self.publish(CaptureEvent::AnalysisError {
            text: reason.to_string(),
        });
    }

    /// Drops whatever session a closed tab left behind.
    pub async fn release_tab(&self, tab_id: i64) -> bool {
        let released = self.registry.lock().await.close_for_tab(tab_id);
        match released {
            Some(session) => {
                self.stitcher.abort(&session.session_id).await;
                info!(tab_id, session_id = %session.session_id, "capture session released with tab");
                true
            }
            None => false,
        }
    }

    /// Captures the visible viewport and crops it to a user-selected region.
    pub async fn capture_region(
        &self,
        sender: &MessageSender,
        rect: CssRect,
        device_pixel_ratio: f64,
    ) -> Result<CapturedImage, CaptureError> {
        self.authorize(sender).await?;
        let window_id = match (sender.tab_id, sender.window_id) {
            (Some(_), Some(window)) => window,
            _ => return Err(SessionError::MissingTab.into()),
        };
        validate_rect(&rect)?;

        self.publish(CaptureEvent::CaptureStarted);
        let screenshot = self
            .with_deadline(
                "viewport capture",
                self.capturer.capture_visible(window_id, ScreenshotFormat::Png),
            )
            .await?;
        let image = crop_region(&screenshot, &rect, device_pixel_ratio)?;
        self.publish(CaptureEvent::CaptureDone {
            image_data_url: image_codec::encode_data_url(&image.bytes, image.format.mime()),
            width: image.width,
            height: image.height,
        });
        Ok(image)
    }
}

fn validate_rect(rect: &CssRect) -> Result<(), CaptureError> {
    let finite = [rect.x, rect.y, rect.width, rect.height]
        .iter()
        .all(|v| v.is_finite());
    if !finite || rect.width <= 0.0 || rect.height <= 0.0 {
        return Err(CaptureError::InvalidRect(format!(
            "{}x{} at ({}, {})",
            rect.width, rect.height, rect.x, rect.y
        )));
    }
    Ok(())
}

/// Crops `rect` (CSS pixels) out of an encoded screenshot and returns a PNG.
///
/// The rectangle is scaled by `device_pixel_ratio` (non-positive ratios are
/// treated as 1) and clipped to the screenshot.
pub fn crop_region(
    screenshot: &[u8],
    rect: &CssRect,
    device_pixel_ratio: f64,
) -> Result<CapturedImage, CaptureError> {
    validate_rect(rect)?;
    let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
        device_pixel_ratio
    } else {
        1.0
    };
    let source = image_codec::decode_rgba(screenshot).map_err(|e| CaptureError::Screenshot(e.to_string()))?;
    let (src_w, src_h) = source.dimensions();

    let sx = (rect.x * dpr).round().max(0.0);
    let sy = (rect.y * dpr).round().max(0.0);
    let ex = ((rect.x + rect.width) * dpr).round().min(src_w as f64);
    let ey = ((rect.y + rect.height) * dpr).round().min(src_h as f64);
    if ex - sx < 1.0 || ey - sy < 1.0 {
        return Err(CaptureError::InvalidRect(
            "selection lies outside the captured viewport".to_string(),
        ));
    }

    let (x, y, w, h) = (sx as u32, sy as u32, (ex - sx) as u32, (ey - sy) as u32);
    let cropped = imageops::crop_imm(&source, x, y, w, h).to_image();
    let bytes = image_codec::encode_rgba(&cropped, OutputFormat::Png, 1.0)?;
    Ok(CapturedImage {
        bytes,
        format: OutputFormat::Png,
        width: w,
        height: h,
    })
}
