//! Post-capture vision analysis against the Glazyr runtime.
//!
//! The runtime exposes a combined analyze endpoint (caption, labels, objects
//! and OCR in one call) under one of several base paths depending on the
//! deployment, plus an OCR-only endpoint used as a fallback.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::types::errors::VisionError;
use crate::types::settings::RuntimeSettings;

pub const ANALYZE_PATHS: [&str; 4] = [
    "/runtime/vision/analyze",
    "/vision/analyze",
    "/api/vision/analyze",
    "/api/runtime/vision/analyze",
];
pub const OCR_PATH: &str = "/runtime/vision/ocr";
pub const API_KEY_HEADER: &str = "x-glazyr-api-key";

const MAX_LIST_ITEMS: usize = 24;
const MAX_CAPTION_CHARS: usize = 1600;
const MAX_TEXT_CHARS: usize = 8000;
const MAX_DETAIL_CHARS: usize = 300;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Fields pulled out of an analyze response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionReport {
    pub caption: String,
    pub labels: Vec<String>,
    pub objects: Vec<String>,
    pub text: String,
}

impl VisionReport {
    /// Accepts both the runtime's own field names and raw Cloud Vision ones
    /// (`labelAnnotations`, `localizedObjectAnnotations`). A bare string
    /// body is taken as the caption.
    pub fn from_response(data: &Value) -> Self {
        if let Some(caption) = data.as_str() {
            return Self {
                caption: caption.to_string(),
                ..Self::default()
            };
        }
        let str_field = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or("").to_string();
        let list_field = |primary: &str, fallback: &str| {
            data.get(primary)
                .filter(|v| v.is_array())
                .or_else(|| data.get(fallback).filter(|v| v.is_array()))
                .cloned()
                .unwrap_or(Value::Null)
        };
        Self {
            caption: str_field("caption"),
            labels: name_list(&list_field("labels", "labelAnnotations"), &["description", "name"]),
            objects: name_list(&list_field("objects", "localizedObjectAnnotations"), &["name", "description"]),
            text: str_field("text"),
        }
    }

    /// Renders the report as `Caption: / Labels: / Objects: / Text:` lines.
    pub fn render(&self) -> String {
        let labels = self.labels.join(", ");
        let objects = self.objects.join(", ");

        let mut caption = self.caption.trim().to_string();
        if !caption.is_empty() {
            let lower = caption.to_lowercase();
            let looks_like_labels = lower.starts_with("labels:") || lower.starts_with("label:");
            let repeats_labels = !labels.is_empty() && lower.contains(&labels.to_lowercase());
            if looks_like_labels || repeats_labels {
                caption.clear();
            }
        }
        let text = self.text.trim();

        let mut parts = Vec::new();
        if !caption.is_empty() {
            parts.push(format!("Caption: {}", truncate_chars(&caption, MAX_CAPTION_CHARS)));
        }
        if !labels.is_empty() {
            parts.push(format!("Labels: {}", labels));
        }
        if !objects.is_empty() {
            parts.push(format!("Objects: {}", objects));
        }
        if !text.is_empty() {
            parts.push(format!("Text: {}", truncate_chars(text, MAX_TEXT_CHARS)));
        }

        if parts.is_empty() {
            "No visual signals detected.".to_string()
        } else {
            parts.join("\n")
        }
    }
}

/// Names from a list of strings or annotation objects, or from a
/// comma-separated string. Case-insensitively deduplicated, capped at 24.
pub fn name_list(value: &Value, keys: &[&str]) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => keys
                    .iter()
                    .find_map(|k| other.get(*k).and_then(Value::as_str))
                    .unwrap_or("")
                    .to_string(),
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in raw {
        let name = name.trim();
        if name.is_empty() || !seen.insert(name.to_lowercase()) {
            continue;
        }
        out.push(name.to_string());
        if out.len() >= MAX_LIST_ITEMS {
            break;
        }
    }
    out
}

/// OCR-only fallback text, with a note on why the analyze call was skipped.
pub fn render_ocr_fallback(ocr_text: &str, tried: &[String], cause: &str) -> String {
    let trimmed = ocr_text.trim();
    let base = if trimmed.is_empty() {
        "No text detected.".to_string()
    } else {
        format!("Text:\n{}", truncate_chars(trimmed, MAX_TEXT_CHARS))
    };
    format!(
        "{}\n\nNote: Vision analyze endpoint unavailable, showing OCR-only.\nTried: {}\nDetails: {}",
        base,
        tried.join(", "),
        truncate_chars(cause, MAX_DETAIL_CHARS)
    )
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// HTTP client for the runtime's vision endpoints.
pub struct VisionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl VisionClient {
    /// Fails with [`VisionError::NotConfigured`] when no base URL is set.
    pub fn from_settings(runtime: &RuntimeSettings) -> Result<Self, VisionError> {
        let base_url = runtime.normalized_base_url();
        if base_url.is_empty() {
            return Err(VisionError::NotConfigured);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VisionError::NetworkError(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key: runtime.api_key.trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, VisionError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.post(&url).json(body);
        if !self.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, &self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VisionError::NetworkError(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await.unwrap_or_default();
        let data = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if !status.is_success() {
            let message = data
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Runtime request failed ({})", status.as_u16()));
            return Err(VisionError::RuntimeError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(data)
    }

    /// Tries each analyze path in order; returns the first success or the
    /// last error together with every path tried.
    async fn analyze_first_ok(&self, body: &Value) -> Result<Value, (VisionError, Vec<String>)> {
        let mut tried = Vec::new();
        let mut last_error = VisionError::NotConfigured;
        for path in ANALYZE_PATHS {
            tried.push(path.to_string());
            match self.post_json(path, body).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    debug!(path, error = %e, "vision analyze path failed");
                    last_error = e;
                }
            }
        }
        Err((last_error, tried))
    }

    /// OCR-only call; returns the recognised text (possibly empty).
    pub async fn ocr(&self, image_data_url: &str) -> Result<String, VisionError> {
        let data = self
            .post_json(OCR_PATH, &json!({ "imageDataUrl": image_data_url }))
            .await?;
        Ok(data.get("text").and_then(Value::as_str).unwrap_or("").to_string())
    }

    /// Analyzes a captured image and returns text ready to show the user.
    ///
    /// Falls back to OCR when no analyze path answers; fails only when the
    /// OCR endpoint fails too.
    pub async fn analyze(&self, image_data_url: &str) -> Result<String, VisionError> {
        let body = json!({
            "imageDataUrl": image_data_url,
            "features": { "ocr": true, "labels": true, "objects": true },
        });
        match self.analyze_first_ok(&body).await {
            Ok(data) => Ok(VisionReport::from_response(&data).render()),
            Err((cause, tried)) => {
                warn!(error = %cause, "vision analyze unavailable, falling back to OCR");
                let text = self.ocr(image_data_url).await?;
                Ok(render_ocr_fallback(&text, &tried, &cause.to_string()))
            }
        }
    }
}
