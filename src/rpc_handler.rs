//! RPC method handler for the Glazyr JSON protocol.
//!
//! Kept apart from `rpc_server.rs` so it can be unit-tested. `handle_method`
//! dispatches one call to the coordinator, the policy gate, the settings
//! engine or the capture history held by [`App`].

use serde_json::{json, Value};

use crate::app::App;
use crate::managers::capture_store::CaptureStoreTrait;
use crate::services::image_codec;
use crate::services::settings_engine::SettingsEngineTrait;
use crate::types::capture::{
    CaptureKind, CaptureMeta, CaptureRecord, CapturedImage, CssRect, MessageSender, TileRequest,
};
use crate::types::policy::Policy;
use crate::types::settings::AppSettings;

const DEFAULT_HISTORY_LIMIT: usize = 20;

fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn f64_param(params: &Value, key: &str) -> Result<f64, String> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| format!("missing {}", key))
}

fn i64_param(params: &Value, key: &str) -> Result<i64, String> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| format!("missing {}", key))
}

/// Optional non-negative integer that must fit in a `u32`; absent means 0.
fn u32_param(params: &Value, key: &str) -> Result<u32, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| format!("invalid {}: {}", key, v)),
    }
}

/// `params.sender = {tabId, windowId, url}`; absent means "no tab".
fn sender_param(params: &Value) -> Result<MessageSender, String> {
    match params.get("sender") {
        None | Some(Value::Null) => Ok(MessageSender::default()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| format!("invalid sender: {}", e)),
    }
}

fn image_json(image: &CapturedImage) -> Value {
    json!({
        "ok": true,
        "imageDataUrl": image_codec::encode_data_url(&image.bytes, image.format.mime()),
        "width": image.width,
        "height": image.height,
    })
}

fn record_json(record: &CaptureRecord) -> Result<Value, String> {
    serde_json::to_value(record).map_err(|e| e.to_string())
}

async fn settings_applied(app: &App, settings: AppSettings) -> Result<Value, String> {
    app.apply_settings(&settings).await;
    serde_json::to_value(&settings).map_err(|e| e.to_string())
}

/// Dispatches one RPC call.
///
/// Returns `Ok(Value)` on success or `Err(String)` with a user-facing message.
pub async fn handle_method(app: &App, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true})),

        // ─── Frame source ───
        "viewport.present" => {
            let window_id = i64_param(params, "windowId")?;
            let data_url = str_param(params, "dataUrl").ok_or("missing dataUrl")?;
            let (_, bytes) = image_codec::decode_data_url(data_url)?;
            app.frames
                .present_encoded(window_id, &bytes)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        // ─── Full-page capture ───
        "capture.init" => {
            let sender = sender_param(params)?;
            let meta: CaptureMeta = params
                .get("meta")
                .cloned()
                .ok_or("missing meta")
                .and_then(|v| serde_json::from_value(v).map_err(|_| "Invalid capture metadata."))?;
            let session_id = app
                .coordinator
                .init(&sender, meta)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "sessionId": session_id}))
        }
        "capture.grab" => {
            let sender = sender_param(params)?;
            let request = TileRequest {
                session_id: str_param(params, "sessionId").unwrap_or("").to_string(),
                scroll_y_css: f64_param(params, "scrollYCss")?,
                index: u32_param(params, "index")?,
                total: u32_param(params, "total")?,
            };
            app.coordinator
                .grab(&sender, &request)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "capture.complete" => {
            let sender = sender_param(params)?;
            let session_id = str_param(params, "sessionId").unwrap_or("");
            let image = app
                .coordinator
                .complete(&sender, session_id)
                .await
                .map_err(|e| e.to_string())?;
            app.capture_finished(CaptureKind::FullPage, &sender, &image).await;
            Ok(image_json(&image))
        }
        "capture.abort" => {
            let session_id = str_param(params, "sessionId");
            let reason = str_param(params, "error").unwrap_or("");
            app.coordinator.abort(session_id, reason).await;
            Ok(json!({"ok": true}))
        }

        // ─── Region capture ───
        "capture.region" => {
            let sender = sender_param(params)?;
            let rect: CssRect = params
                .get("rect")
                .cloned()
                .ok_or("missing rect")
                .and_then(|v| serde_json::from_value(v).map_err(|_| "Invalid selection rectangle."))?;
            let dpr = params
                .get("devicePixelRatio")
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0);
            let image = app
                .coordinator
                .capture_region(&sender, rect, dpr)
                .await
                .map_err(|e| e.to_string())?;
            app.capture_finished(CaptureKind::Region, &sender, &image).await;
            Ok(image_json(&image))
        }

        // ─── History ───
        "capture.last" => {
            let store = app.store.lock().await;
            match store.last_capture().map_err(|e| e.to_string())? {
                Some(record) => record_json(&record),
                None => Ok(Value::Null),
            }
        }
        "capture.history" => {
            let limit = params
                .get("limit")
                .and_then(|v| v.as_u64())
                .map(|l| l as usize)
                .unwrap_or(DEFAULT_HISTORY_LIMIT);
            let records = app
                .store
                .lock()
                .await
                .list_recent(limit)
                .map_err(|e| e.to_string())?;
            let arr = records
                .iter()
                .map(record_json)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(json!(arr))
        }
        "capture.image" => {
            let id = i64_param(params, "id")?;
            let image = app.store.lock().await.image(id).map_err(|e| e.to_string())?;
            Ok(image_json(&image))
        }
        "capture.clear" => {
            let removed = app.store.lock().await.clear().map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "removed": removed}))
        }

        // ─── Tabs ───
        "tab.closed" => {
            let tab_id = i64_param(params, "tabId")?;
            let released = app.coordinator.release_tab(tab_id).await;
            Ok(json!({"ok": true, "released": released}))
        }

        // ─── Policy ───
        "policy.get" => serde_json::to_value(app.policy.current().await).map_err(|e| e.to_string()),
        "policy.set" => {
            let policy: Policy =
                serde_json::from_value(params.clone()).map_err(|e| format!("invalid policy: {}", e))?;
            let settings = {
                let mut engine = app.settings_engine.lock().await;
                let mut settings = engine.get_settings().clone();
                settings.policy = policy.clone();
                engine.replace(settings.clone()).map_err(|e| e.to_string())?;
                settings
            };
            app.apply_settings(&settings).await;
            serde_json::to_value(&policy).map_err(|e| e.to_string())
        }

        // ─── Settings ───
        "settings.get" => serde_json::to_value(app.settings().await).map_err(|e| e.to_string()),
        "settings.set" => {
            let key = str_param(params, "key").ok_or("missing key")?;
            let value = params.get("value").cloned().ok_or("missing value")?;
            let settings = {
                let mut engine = app.settings_engine.lock().await;
                engine.set_value(key, value).map_err(|e| e.to_string())?;
                engine.get_settings().clone()
            };
            settings_applied(app, settings).await
        }
        "settings.reset" => {
            let settings = {
                let mut engine = app.settings_engine.lock().await;
                engine.reset().map_err(|e| e.to_string())?;
                engine.get_settings().clone()
            };
            settings_applied(app, settings).await
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
