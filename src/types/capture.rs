use serde::{Deserialize, Serialize};

/// Tallest document a full-page capture accepts, in CSS pixels.
pub const MAX_FULL_HEIGHT_CSS: f64 = 131_072.0;
/// Widest or tallest viewport accepted, in CSS pixels.
pub const MAX_VIEWPORT_CSS: f64 = 16_384.0;

/// CSS-pixel page geometry, measured once when a full-page capture starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMeta {
    pub full_height_css: f64,
    pub viewport_width_css: f64,
    pub viewport_height_css: f64,
}

impl CaptureMeta {
    pub fn new(full_height_css: f64, viewport_width_css: f64, viewport_height_css: f64) -> Self {
        Self {
            full_height_css,
            viewport_width_css,
            viewport_height_css,
        }
    }

    /// Checks that all three dimensions are finite, strictly positive and
    /// within [`MAX_FULL_HEIGHT_CSS`] / [`MAX_VIEWPORT_CSS`].
    pub fn validate(&self) -> Result<(), String> {
        let dims = [
            ("fullHeightCss", self.full_height_css, MAX_FULL_HEIGHT_CSS),
            ("viewportWidthCss", self.viewport_width_css, MAX_VIEWPORT_CSS),
            ("viewportHeightCss", self.viewport_height_css, MAX_VIEWPORT_CSS),
        ];
        for (name, value, max) in dims {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{} must be a positive number, got {}", name, value));
            }
            if value > max {
                return Err(format!("{} of {} exceeds the limit of {}", name, value, max));
            }
        }
        Ok(())
    }
}

/// One tile grab request issued by the page while scrolling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TileRequest {
    pub session_id: String,
    pub scroll_y_css: f64,
    pub index: u32,
    pub total: u32,
}

/// Progress of a running capture, for UI hints only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureProgress {
    pub index: u32,
    pub total: u32,
}

impl CaptureProgress {
    /// Human-readable hint, 1-based.
    pub fn hint(&self) -> String {
        format!("Capturing full page… {}/{}", self.index + 1, self.total)
    }
}

/// Encodings the compositor and the region cropper can produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    #[default]
    Jpeg,
}

impl OutputFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    /// Accepts short names (`png`, `jpg`, `jpeg`) and MIME types.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "png" | "image/png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" | "image/jpeg" | "image/jpg" => Some(OutputFormat::Jpeg),
            _ => None,
        }
    }
}

/// An encoded image leaving the capture pipeline.
#[derive(Clone, PartialEq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// A user-selected rectangle in CSS pixels, relative to the viewport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CssRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Identifies where a coordinator request came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    pub tab_id: Option<i64>,
    pub window_id: Option<i64>,
    pub url: Option<String>,
}

impl MessageSender {
    pub fn tab(tab_id: i64, window_id: i64, url: &str) -> Self {
        Self {
            tab_id: Some(tab_id),
            window_id: Some(window_id),
            url: Some(url.to_string()),
        }
    }
}

/// Which capture flow produced a stored image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    FullPage,
    Region,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::FullPage => "full_page",
            CaptureKind::Region => "region",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "region" => CaptureKind::Region,
            _ => CaptureKind::FullPage,
        }
    }
}

/// Notifications published by the coordinator for whatever UI is listening.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureEvent {
    CaptureStarted,
    CaptureHint {
        text: String,
    },
    CaptureDone {
        #[serde(rename = "imageDataUrl")]
        image_data_url: String,
        width: u32,
        height: u32,
    },
    AnalysisResult {
        text: String,
    },
    AnalysisError {
        text: String,
    },
}

/// How a page-side full-page capture ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Every tile was captured and the composed image came back.
    Completed(CapturedImage),
    /// Another capture was already running on this orchestrator.
    AlreadyActive,
    /// Policy refused the capture before any session was opened.
    Denied { reason: String },
    /// The capture started but was aborted.
    Aborted { reason: String },
}

impl CaptureOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CaptureOutcome::Completed(_))
    }
}

/// One row of the capture history, without the image bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub id: i64,
    pub kind: CaptureKind,
    pub tab_id: Option<i64>,
    pub url: Option<String>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// UNIX seconds.
    pub captured_at: i64,
    pub analysis: Option<String>,
    pub analysis_error: Option<String>,
}
