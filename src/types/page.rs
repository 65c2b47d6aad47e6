use serde::{Deserialize, Serialize};

/// Scroll position within a web page, in CSS pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

/// Visible viewport size, in CSS pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

/// Inline styles of the assistant widget that capture temporarily overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WidgetVisibility {
    pub visibility: String,
    pub pointer_events: String,
}

impl WidgetVisibility {
    /// Styles that keep the widget out of screenshots and out of the way.
    pub fn hidden() -> Self {
        Self {
            visibility: "hidden".to_string(),
            pointer_events: "none".to_string(),
        }
    }
}
