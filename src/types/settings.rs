use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::capture::OutputFormat;
use super::policy::Policy;

/// Top-level settings container, persisted as `settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppSettings {
    pub capture: CaptureSettings,
    pub policy: Policy,
    pub runtime: RuntimeSettings,
}

/// Timing and encoding knobs for the capture pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureSettings {
    /// Wait after scrolling back to the top, before the first tile.
    pub initial_settle_ms: u64,
    /// Wait after each scroll step, for layout and paint.
    pub tile_settle_ms: u64,
    /// Deadline for each round-trip between page, coordinator and compositor.
    pub step_timeout_ms: u64,
    /// JPEG quality (1-100) used for viewport tiles.
    pub tile_quality: u8,
    pub output_format: OutputFormat,
    /// Output quality in `0.0..=1.0`; ignored for PNG.
    pub output_quality: f32,
    /// Captures kept in the history; older rows are pruned on insert.
    pub history_limit: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            initial_settle_ms: 200,
            tile_settle_ms: 220,
            step_timeout_ms: 15_000,
            tile_quality: 92,
            output_format: OutputFormat::Jpeg,
            output_quality: 0.92,
            history_limit: 50,
        }
    }
}

impl CaptureSettings {
    pub fn initial_settle(&self) -> Duration {
        Duration::from_millis(self.initial_settle_ms)
    }

    pub fn tile_settle(&self) -> Duration {
        Duration::from_millis(self.tile_settle_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

/// Remote runtime used for post-capture vision analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RuntimeSettings {
    pub base_url: String,
    pub api_key: String,
    pub analyze_after_capture: bool,
}

impl RuntimeSettings {
    /// Base URL without trailing slashes or a pasted `/runtime` suffix.
    pub fn normalized_base_url(&self) -> String {
        let mut base = self.base_url.trim().trim_end_matches('/').to_string();
        if let Some(stripped) = base.strip_suffix("/runtime") {
            base = stripped.trim_end_matches('/').to_string();
        }
        base
    }
}
