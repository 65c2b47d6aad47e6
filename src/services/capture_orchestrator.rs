//! Page-side driver of the scroll-and-capture loop.
//!
//! The orchestrator measures the page, opens a session with the coordinator,
//! scrolls through the document one viewport at a time asking for a tile at
//! each stop, and finally asks for the composed image. Whatever happens, the
//! page gets its scroll position, widget styles and scroll behavior back.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::services::capture_coordinator::CaptureCoordinator;
use crate::services::policy_gate;
use crate::types::capture::{
    CaptureMeta, CaptureOutcome, CaptureProgress, CapturedImage, MessageSender, TileRequest,
};
use crate::types::errors::{CaptureError, PageError};
use crate::types::page::{ScrollPosition, ViewportSize, WidgetVisibility};
use crate::types::policy::Policy;
use crate::types::settings::CaptureSettings;

/// The document being captured.
pub trait PageSurface: Send + Sync {
    fn hostname(&self) -> String;
    /// Policy snapshot pushed into the page by the extension.
    fn policy(&self) -> Policy;
    fn scroll_position(&self) -> ScrollPosition;
    fn scroll_to(&self, x: f64, y: f64) -> Result<(), PageError>;
    /// Full document height in CSS pixels.
    fn document_height(&self) -> f64;
    fn viewport_size(&self) -> ViewportSize;
    /// Current widget styles, or `None` when the widget is not on the page.
    fn widget_visibility(&self) -> Option<WidgetVisibility>;
    fn set_widget_visibility(&self, visibility: &WidgetVisibility) -> Result<(), PageError>;
    fn scroll_behavior(&self) -> String;
    fn set_scroll_behavior(&self, value: &str) -> Result<(), PageError>;
    fn notify_user(&self, message: &str);
}

impl<P: PageSurface + ?Sized> PageSurface for Arc<P> {
    fn hostname(&self) -> String {
        (**self).hostname()
    }
    fn policy(&self) -> Policy {
        (**self).policy()
    }
    fn scroll_position(&self) -> ScrollPosition {
        (**self).scroll_position()
    }
    fn scroll_to(&self, x: f64, y: f64) -> Result<(), PageError> {
        (**self).scroll_to(x, y)
    }
    fn document_height(&self) -> f64 {
        (**self).document_height()
    }
    fn viewport_size(&self) -> ViewportSize {
        (**self).viewport_size()
    }
    fn widget_visibility(&self) -> Option<WidgetVisibility> {
        (**self).widget_visibility()
    }
    fn set_widget_visibility(&self, visibility: &WidgetVisibility) -> Result<(), PageError> {
        (**self).set_widget_visibility(visibility)
    }
    fn scroll_behavior(&self) -> String {
        (**self).scroll_behavior()
    }
    fn set_scroll_behavior(&self, value: &str) -> Result<(), PageError> {
        (**self).set_scroll_behavior(value)
    }
    fn notify_user(&self, message: &str) {
        (**self).notify_user(message)
    }
}

/// Typed calls from the page to the coordinator.
#[async_trait]
pub trait CaptureTransport: Send + Sync {
    async fn init(&self, meta: CaptureMeta) -> Result<String, CaptureError>;
    async fn grab(&self, request: TileRequest) -> Result<(), CaptureError>;
    async fn complete(&self, session_id: &str) -> Result<CapturedImage, CaptureError>;
    /// Best-effort; the coordinator must release whatever it holds.
    async fn abort(&self, session_id: Option<&str>, reason: &str);
}

/// In-process transport bound to one tab.
pub struct LocalTransport {
    coordinator: Arc<CaptureCoordinator>,
    sender: MessageSender,
}

impl LocalTransport {
    pub fn new(coordinator: Arc<CaptureCoordinator>, sender: MessageSender) -> Self {
        Self { coordinator, sender }
    }
}

#[async_trait]
impl CaptureTransport for LocalTransport {
    async fn init(&self, meta: CaptureMeta) -> Result<String, CaptureError> {
        self.coordinator.init(&self.sender, meta).await
    }

    async fn grab(&self, request: TileRequest) -> Result<(), CaptureError> {
        self.coordinator.grab(&self.sender, &request).await
    }

    async fn complete(&self, session_id: &str) -> Result<CapturedImage, CaptureError> {
        self.coordinator.complete(&self.sender, session_id).await
    }

    async fn abort(&self, session_id: Option<&str>, reason: &str) {
        self.coordinator.abort(session_id, reason).await
    }
}

/// Most tiles a single full-page capture may take.
pub const MAX_TILES: usize = 1024;

/// Scroll offsets (CSS pixels) of every tile for a page of `full_height`
/// seen through a viewport of `viewport_height`.
///
/// There are `ceil(full / viewport)` tiles (at least one); the last one is
/// clamped so it ends exactly at the bottom of the document. Returns an
/// empty plan for non-positive dimensions or more than [`MAX_TILES`] tiles.
pub fn scroll_offsets(full_height: f64, viewport_height: f64) -> Vec<f64> {
    if !(full_height > 0.0 && viewport_height > 0.0) {
        return Vec::new();
    }
    let ratio = (full_height / viewport_height).ceil();
    if !ratio.is_finite() || ratio > MAX_TILES as f64 {
        return Vec::new();
    }
    let total = (ratio as usize).max(1);
    let max_offset = (full_height - viewport_height).max(0.0);
    (0..total)
        .map(|i| (i as f64 * viewport_height).min(max_offset))
        .collect()
}

/// Whether the orchestrator is currently running a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Capturing,
}

/// Delays and deadlines for one orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub initial_settle: Duration,
    pub tile_settle: Duration,
    pub step_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&CaptureSettings::default())
    }
}

impl From<&CaptureSettings> for OrchestratorSettings {
    fn from(s: &CaptureSettings) -> Self {
        Self {
            initial_settle: s.initial_settle(),
            tile_settle: s.tile_settle(),
            step_timeout: s.step_timeout(),
        }
    }
}

type ProgressFn = Box<dyn Fn(CaptureProgress) + Send + Sync>;

/// Page state captured before the loop starts and restored afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedPageState {
    pub scroll: ScrollPosition,
    pub widget: Option<WidgetVisibility>,
    pub scroll_behavior: String,
}

impl SavedPageState {
    fn snapshot<P: PageSurface>(page: &P) -> Self {
        Self {
            scroll: page.scroll_position(),
            widget: page.widget_visibility(),
            scroll_behavior: page.scroll_behavior(),
        }
    }
}

/// Restores the page and clears the busy state when dropped, which also
/// covers early returns, panics and a cancelled capture future.
struct RestoreGuard<'a, P: PageSurface> {
    page: &'a P,
    saved: SavedPageState,
    state: &'a Mutex<OrchestratorState>,
}

impl<P: PageSurface> Drop for RestoreGuard<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.page.set_scroll_behavior(&self.saved.scroll_behavior) {
            warn!(error = %e, "failed to restore scroll behavior");
        }
        if let Err(e) = self.page.scroll_to(self.saved.scroll.x, self.saved.scroll.y) {
            warn!(error = %e, "failed to restore scroll position");
        }
        if let Some(widget) = &self.saved.widget {
            if let Err(e) = self.page.set_widget_visibility(widget) {
                warn!(error = %e, "failed to restore widget visibility");
            }
        }
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = OrchestratorState::Idle;
    }
}

/// Drives one page's full-page captures.
pub struct CaptureOrchestrator<P: PageSurface, T: CaptureTransport> {
    page: P,
    transport: T,
    settings: OrchestratorSettings,
    state: Mutex<OrchestratorState>,
    progress: Option<ProgressFn>,
}

impl<P: PageSurface, T: CaptureTransport> CaptureOrchestrator<P, T> {
    pub fn new(page: P, transport: T, settings: OrchestratorSettings) -> Self {
        Self {
            page,
            transport,
            settings,
            state: Mutex::new(OrchestratorState::Idle),
            progress: None,
        }
    }

    /// Registers a callback receiving `(index, total)` before each tile.
    pub fn with_progress(mut self, f: impl Fn(CaptureProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn try_enter(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == OrchestratorState::Capturing {
            return false;
        }
        *state = OrchestratorState::Capturing;
        true
    }

    fn leave(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = OrchestratorState::Idle;
    }

    /// Captures the whole document.
    ///
    /// Returns [`CaptureOutcome::AlreadyActive`] immediately when a capture
    /// is already running on this orchestrator.
    pub async fn capture_full_page(&self) -> CaptureOutcome {
        if !self.try_enter() {
            debug!("full-page capture already running");
            return CaptureOutcome::AlreadyActive;
        }

        let decision = policy_gate::allows_capture(&self.page.policy(), &self.page.hostname());
        if !decision.allowed {
            self.leave();
            self.page
                .notify_user(&format!("Glazyr blocked capture: {}", decision.reason));
            info!(reason = %decision.reason, "full-page capture denied by policy");
            return CaptureOutcome::Denied {
                reason: decision.reason,
            };
        }

        let _guard = RestoreGuard {
            page: &self.page,
            saved: SavedPageState::snapshot(&self.page),
            state: &self.state,
        };
        self.run_capture().await
    }

    async fn run_capture(&self) -> CaptureOutcome {
        if let Err(e) = self.prepare_page() {
            return self.abort(None, &e.to_string()).await;
        }

        let viewport = self.page.viewport_size();
        let meta = CaptureMeta::new(self.page.document_height(), viewport.width, viewport.height);
        if meta.validate().is_err() {
            return self.abort(None, "Page dimensions unavailable.").await;
        }
        let offsets = scroll_offsets(meta.full_height_css, meta.viewport_height_css);
        if offsets.is_empty() {
            return self.abort(None, "Page is too tall to capture.").await;
        }

        let session_id = match self.step("capture init", self.transport.init(meta)).await {
            Ok(id) if !id.trim().is_empty() => id,
            Ok(_) => return self.abort(None, "Failed to init capture session.").await,
            Err(e) => return self.abort(None, &e.to_string()).await,
        };

        if let Err(e) = self.page.scroll_to(0.0, 0.0) {
            return self.abort(Some(&session_id), &e.to_string()).await;
        }
        tokio::time::sleep(self.settings.initial_settle).await;

        let total = offsets.len() as u32;
        for (i, y) in offsets.into_iter().enumerate() {
            if let Err(e) = self.page.scroll_to(0.0, y) {
                return self.abort(Some(&session_id), &e.to_string()).await;
            }
            tokio::time::sleep(self.settings.tile_settle).await;

            let progress = CaptureProgress {
                index: i as u32,
                total,
            };
            if let Some(report) = &self.progress {
                report(progress);
            }

            let request = TileRequest {
                session_id: session_id.clone(),
                scroll_y_css: y,
                index: progress.index,
                total,
            };
            if let Err(e) = self.step("tile grab", self.transport.grab(request)).await {
                return self.abort(Some(&session_id), &e.to_string()).await;
            }
        }

        match self
            .step("capture complete", self.transport.complete(&session_id))
            .await
        {
            Ok(image) => {
                info!(%session_id, tiles = total, "full-page capture finished");
                CaptureOutcome::Completed(image)
            }
            Err(e) => self.abort(Some(&session_id), &e.to_string()).await,
        }
    }

    fn prepare_page(&self) -> Result<(), PageError> {
        if self.page.widget_visibility().is_some() {
            self.page.set_widget_visibility(&WidgetVisibility::hidden())?;
        }
        self.page.set_scroll_behavior("auto")
    }

    async fn step<R>(
        &self,
        name: &str,
        fut: impl Future<Output = Result<R, CaptureError>>,
    ) -> Result<R, CaptureError> {
        match tokio::time::timeout(self.settings.step_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Timeout(name.to_string())),
        }
    }

    async fn abort(&self, session_id: Option<&str>, reason: &str) -> CaptureOutcome {
        warn!(session_id = session_id.unwrap_or(""), reason, "aborting full-page capture");
        if tokio::time::timeout(self.settings.step_timeout, self.transport.abort(session_id, reason))
            .await
            .is_err()
        {
            warn!("capture abort was not acknowledged in time");
        }
        CaptureOutcome::Aborted {
            reason: reason.to_string(),
        }
    }
}
