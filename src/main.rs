//! Glazyr console demo.
//!
//! Captures a synthetic striped page end to end (orchestrator, coordinator,
//! compositor), crops a region out of its first screen, records both in an
//! in-memory capture history and writes the stitched image to disk.
//!
//! Usage: `glazyr [output-path] [page-height-css]`

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use glazyr::database::Database;
use glazyr::managers::capture_store::{CaptureStore, CaptureStoreTrait};
use glazyr::services::capture_coordinator::{CaptureCoordinator, CoordinatorConfig};
use glazyr::services::capture_orchestrator::{
    CaptureOrchestrator, LocalTransport, OrchestratorSettings, PageSurface,
};
use glazyr::services::frame_source::{ScreenshotFormat, ViewportCapturer};
use glazyr::services::image_codec;
use glazyr::services::policy_gate::PolicyGate;
use glazyr::services::stitch_worker::StitcherHandle;
use glazyr::types::capture::{CaptureKind, CaptureOutcome, CssRect, MessageSender, OutputFormat};
use glazyr::types::errors::{CaptureError, PageError};
use glazyr::types::page::{ScrollPosition, ViewportSize, WidgetVisibility};
use glazyr::types::policy::Policy;
use glazyr::types::settings::CaptureSettings;

const VIEWPORT_WIDTH: u32 = 1200;
const VIEWPORT_HEIGHT: u32 = 1000;
const STRIPE_CSS: u32 = 100;
const TAB_ID: i64 = 1;
const WINDOW_ID: i64 = 1;

/// A page made of 100px horizontal stripes, rendered on demand.
struct SyntheticPage {
    full_height: f64,
    scroll: Mutex<ScrollPosition>,
    widget: Mutex<WidgetVisibility>,
    scroll_behavior: Mutex<String>,
}

impl SyntheticPage {
    fn new(full_height: f64) -> Self {
        Self {
            full_height,
            scroll: Mutex::new(ScrollPosition::default()),
            widget: Mutex::new(WidgetVisibility {
                visibility: "visible".to_string(),
                pointer_events: "auto".to_string(),
            }),
            scroll_behavior: Mutex::new("smooth".to_string()),
        }
    }

    fn stripe_color(doc_row: u32) -> Rgba<u8> {
        let band = doc_row / STRIPE_CSS;
        let shade = (band * 37 % 200) as u8 + 40;
        Rgba([shade, 255 - shade, (band * 11 % 255) as u8, 255])
    }

    fn render_viewport(&self) -> RgbaImage {
        let top = self.scroll.lock().unwrap_or_else(PoisonError::into_inner).y.round() as u32;
        RgbaImage::from_fn(VIEWPORT_WIDTH, VIEWPORT_HEIGHT, |_, y| Self::stripe_color(top + y))
    }
}

impl PageSurface for SyntheticPage {
    fn hostname(&self) -> String {
        "demo.glazyr.local".to_string()
    }

    fn policy(&self) -> Policy {
        Policy::default()
    }

    fn scroll_position(&self) -> ScrollPosition {
        *self.scroll.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scroll_to(&self, x: f64, y: f64) -> Result<(), PageError> {
        let max_y = (self.full_height - VIEWPORT_HEIGHT as f64).max(0.0);
        *self.scroll.lock().unwrap_or_else(PoisonError::into_inner) = ScrollPosition {
            x,
            y: y.clamp(0.0, max_y),
        };
        Ok(())
    }

    fn document_height(&self) -> f64 {
        self.full_height
    }

    fn viewport_size(&self) -> ViewportSize {
        ViewportSize {
            width: VIEWPORT_WIDTH as f64,
            height: VIEWPORT_HEIGHT as f64,
        }
    }

    fn widget_visibility(&self) -> Option<WidgetVisibility> {
        Some(self.widget.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn set_widget_visibility(&self, visibility: &WidgetVisibility) -> Result<(), PageError> {
        *self.widget.lock().unwrap_or_else(PoisonError::into_inner) = visibility.clone();
        Ok(())
    }

    fn scroll_behavior(&self) -> String {
        self.scroll_behavior.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_scroll_behavior(&self, value: &str) -> Result<(), PageError> {
        *self.scroll_behavior.lock().unwrap_or_else(PoisonError::into_inner) = value.to_string();
        Ok(())
    }

    fn notify_user(&self, message: &str) {
        println!("  ⚠️  {}", message);
    }
}

#[async_trait]
impl ViewportCapturer for SyntheticPage {
    async fn capture_visible(&self, _window_id: i64, format: ScreenshotFormat) -> Result<Vec<u8>, CaptureError> {
        let frame = self.render_viewport();
        let encoded = match format {
            ScreenshotFormat::Png => image_codec::encode_rgba(&frame, OutputFormat::Png, 1.0),
            ScreenshotFormat::Jpeg(q) => image_codec::encode_rgba(&frame, OutputFormat::Jpeg, q as f32 / 100.0),
        };
        encoded.map_err(|e| CaptureError::Screenshot(e.to_string()))
    }
}

fn section(name: &str) {
    println!("───────────────────────────────────────────────────────────────");
    println!("  📦 {}", name);
    println!("───────────────────────────────────────────────────────────────");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let output = args.next().unwrap_or_else(|| "glazyr-fullpage.jpg".to_string());
    let full_height: f64 = match args.next() {
        Some(h) => h.parse()?,
        None => 3000.0,
    };

    println!();
    println!("  Glazyr v{} full-page capture demo", env!("CARGO_PKG_VERSION"));
    println!();

    let settings = CaptureSettings {
        initial_settle_ms: 20,
        tile_settle_ms: 20,
        ..CaptureSettings::default()
    };
    let page = Arc::new(SyntheticPage::new(full_height));
    let coordinator = Arc::new(CaptureCoordinator::new(
        StitcherHandle::spawn(),
        page.clone(),
        Arc::new(PolicyGate::default()),
        CoordinatorConfig::from(&settings),
    ));
    let sender = MessageSender::tab(TAB_ID, WINDOW_ID, "https://demo.glazyr.local/article");
    let mut store = CaptureStore::new(Database::open_in_memory()?);

    section("Full-page capture");
    let orchestrator = CaptureOrchestrator::new(
        page.clone(),
        LocalTransport::new(coordinator.clone(), sender.clone()),
        OrchestratorSettings::from(&settings),
    )
    .with_progress(|p| println!("  {}", p.hint()));

    match orchestrator.capture_full_page().await {
        CaptureOutcome::Completed(image) => {
            std::fs::write(&output, &image.bytes)?;
            let id = store.record(CaptureKind::FullPage, &sender, &image)?;
            println!("  ✅ {}x{} {} written to {} (history #{})", image.width, image.height, image.format.mime(), output, id);
        }
        other => println!("  ❌ capture did not complete: {:?}", other),
    }
    let restored = page.scroll_position();
    println!("  Page restored to scroll ({}, {}), scroll-behavior {}", restored.x, restored.y, page.scroll_behavior());

    section("Region capture");
    let rect = CssRect { x: 100.0, y: 50.0, width: 400.0, height: 250.0 };
    let region = coordinator.capture_region(&sender, rect, 1.0).await?;
    let id = store.record(CaptureKind::Region, &sender, &region)?;
    println!("  ✅ {}x{} PNG region (history #{})", region.width, region.height, id);

    section("Capture history");
    for record in store.list_recent(10)? {
        println!("  #{} {:?} {}x{} {}", record.id, record.kind, record.width, record.height, record.mime_type);
    }

    info!(open_sessions = coordinator.open_sessions().await, "demo finished");
    Ok(())
}
