//! App core for Glazyr.
//!
//! Owns the settings, the shared policy, the capture coordinator with its
//! compositor and frame source, and the capture history.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::database::connection::Database;
use crate::managers::capture_store::{CaptureStore, CaptureStoreTrait};
use crate::services::capture_coordinator::{CaptureCoordinator, CoordinatorConfig};
use crate::services::frame_source::PresentedFrames;
use crate::services::policy_gate::PolicyGate;
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::services::stitch_worker::StitcherHandle;
use crate::types::capture::{CaptureKind, CapturedImage, MessageSender};
use crate::types::settings::AppSettings;

/// Central application struct shared by the RPC handler and the demo.
pub struct App {
    pub settings_engine: Mutex<SettingsEngine>,
    pub policy: Arc<PolicyGate>,
    pub frames: Arc<PresentedFrames>,
    pub coordinator: Arc<CaptureCoordinator>,
    pub store: Arc<Mutex<CaptureStore>>,
}

impl App {
    /// Opens the capture database at `db_path` and loads settings from
    /// `settings_path` (platform default when `None`).
    ///
    /// Must run inside a tokio runtime: the compositor task is spawned here.
    pub fn new(db_path: &str, settings_path: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Database::open(db_path)?;
        Ok(Self::with_database(db, settings_path))
    }

    /// Same as [`App::new`] with an in-memory database.
    pub fn in_memory(settings_path: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(db, settings_path))
    }

    fn with_database(db: Database, settings_path: Option<String>) -> Self {
        let mut settings_engine = SettingsEngine::new(settings_path);
        let settings = settings_engine.load().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to default settings");
            AppSettings::default()
        });

        let policy = Arc::new(PolicyGate::new(settings.policy.clone()));
        let frames = Arc::new(PresentedFrames::new());
        let coordinator = Arc::new(CaptureCoordinator::new(
            StitcherHandle::spawn(),
            frames.clone(),
            policy.clone(),
            CoordinatorConfig::from(&settings.capture),
        ));

        let store = CaptureStore::with_retention(db, settings.capture.history_limit as usize);

        info!(config = settings_engine.get_config_path(), "glazyr app initialised");
        Self {
            settings_engine: Mutex::new(settings_engine),
            policy,
            frames,
            coordinator,
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub async fn settings(&self) -> AppSettings {
        self.settings_engine.lock().await.get_settings().clone()
    }

    /// Pushes policy and capture settings to the running services.
    pub async fn apply_settings(&self, settings: &AppSettings) {
        self.policy.replace(settings.policy.clone()).await;
        self.coordinator
            .set_config(CoordinatorConfig::from(&settings.capture))
            .await;
        let retention = settings.capture.history_limit as usize;
        if let Err(e) = self.store.lock().await.set_retention(retention) {
            warn!(error = %e, "failed to prune capture history");
        }
    }

    /// Records a finished capture and, when configured, starts vision
    /// analysis in the background. Returns the history row id.
    ///
    /// A failure to persist is logged and never fails the capture.
    pub async fn capture_finished(
        &self,
        kind: CaptureKind,
        sender: &MessageSender,
        image: &CapturedImage,
    ) -> Option<i64> {
        let id = match self.store.lock().await.record(kind, sender, image) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to record capture");
                return None;
            }
        };

        let runtime = self.settings().await.runtime;
        if runtime.analyze_after_capture && !runtime.normalized_base_url().is_empty() {
            self.spawn_analysis(id, image, runtime);
        }
        Some(id)
    }

    #[cfg(feature = "vision")]
    fn spawn_analysis(&self, id: i64, image: &CapturedImage, runtime: crate::types::settings::RuntimeSettings) {
        use crate::services::vision_client::VisionClient;
        use crate::types::capture::CaptureEvent;

        let data_url = crate::services::image_codec::encode_data_url(&image.bytes, image.format.mime());
        let coordinator = self.coordinator.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let result = match VisionClient::from_settings(&runtime) {
                Ok(client) => client.analyze(&data_url).await,
                Err(e) => Err(e),
            };
            let saved = match &result {
                Ok(text) => {
                    coordinator.publish(CaptureEvent::AnalysisResult { text: text.clone() });
                    store.lock().await.set_analysis(id, Some(text), None)
                }
                Err(e) => {
                    let text = format!("Vision/OCR error: {}", e);
                    coordinator.publish(CaptureEvent::AnalysisError { text: text.clone() });
                    store.lock().await.set_analysis(id, None, Some(&text))
                }
            };
            if let Err(e) = saved {
                warn!(id, error = %e, "failed to store vision analysis");
            }
        });
    }

    #[cfg(not(feature = "vision"))]
    fn spawn_analysis(&self, id: i64, _image: &CapturedImage, _runtime: crate::types::settings::RuntimeSettings) {
        warn!(id, "vision analysis requested but the `vision` feature is disabled");
    }
}
