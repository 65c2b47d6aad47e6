//! Tests for the JSON RPC dispatcher, driven through an in-memory App.

use glazyr::app::App;
use glazyr::rpc_handler::handle_method;
use glazyr::services::image_codec;
use glazyr::types::capture::{CaptureEvent, OutputFormat};
use image::{Rgba, RgbaImage};
use serde_json::{json, Value};
use tempfile::TempDir;

fn new_app(dir: &TempDir) -> App {
    let settings = dir.path().join("settings.json").to_string_lossy().to_string();
    App::in_memory(Some(settings)).unwrap()
}

fn sender(tab: i64) -> Value {
    json!({"tabId": tab, "windowId": 1, "url": "https://example.com/page"})
}

fn frame_data_url(color: [u8; 3]) -> String {
    let frame = RgbaImage::from_pixel(100, 100, Rgba([color[0], color[1], color[2], 255]));
    let bytes = image_codec::encode_rgba(&frame, OutputFormat::Png, 1.0).unwrap();
    image_codec::encode_data_url(&bytes, "image/png")
}

async fn call(app: &App, method: &str, params: Value) -> Result<Value, String> {
    handle_method(app, method, &params).await
}

#[tokio::test]
async fn test_ping() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    assert_eq!(call(&app, "ping", json!({})).await.unwrap(), json!({"pong": true}));
}

#[tokio::test]
async fn test_unknown_method() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    assert_eq!(
        call(&app, "capture.teleport", json!({})).await.unwrap_err(),
        "unknown method: capture.teleport"
    );
}

#[tokio::test]
async fn test_full_page_flow_records_history() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    let mut events = app.coordinator.subscribe();

    call(&app, "settings.set", json!({"key": "capture.output_format", "value": "png"}))
        .await
        .unwrap();

    let init = call(
        &app,
        "capture.init",
        json!({
            "sender": sender(1),
            "meta": {"fullHeightCss": 200.0, "viewportWidthCss": 100.0, "viewportHeightCss": 100.0}
        }),
    )
    .await
    .unwrap();
    let session_id = init["sessionId"].as_str().unwrap().to_string();

    for (i, color) in [[255, 0, 0], [0, 0, 255]].iter().enumerate() {
        call(&app, "viewport.present", json!({"windowId": 1, "dataUrl": frame_data_url(*color)}))
            .await
            .unwrap();
        call(
            &app,
            "capture.grab",
            json!({
                "sender": sender(1),
                "sessionId": session_id,
                "scrollYCss": i as f64 * 100.0,
                "index": i,
                "total": 2
            }),
        )
        .await
        .unwrap();
    }

    let done = call(&app, "capture.complete", json!({"sender": sender(1), "sessionId": session_id}))
        .await
        .unwrap();
    assert_eq!(done["ok"], true);
    assert_eq!(done["width"], 100);
    assert_eq!(done["height"], 200);
    let data_url = done["imageDataUrl"].as_str().unwrap();
    assert!(data_url.starts_with("data:image/png;base64,"));

    let (_, bytes) = image_codec::decode_data_url(data_url).unwrap();
    let img = image_codec::decode_rgba(&bytes).unwrap();
    assert!(img.get_pixel(50, 10)[0] > 200);
    assert!(img.get_pixel(50, 190)[2] > 200);

    let last = call(&app, "capture.last", json!({})).await.unwrap();
    assert_eq!(last["kind"], "full_page");
    assert_eq!(last["tabId"], 1);
    assert_eq!(last["mimeType"], "image/png");
    assert_eq!(last["height"], 200);

    let mut saw_done = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CaptureEvent::CaptureDone { width: 100, height: 200, .. }) {
            saw_done = true;
        }
    }
    assert!(saw_done);
}

#[tokio::test]
async fn test_grab_with_foreign_tab_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    let init = call(
        &app,
        "capture.init",
        json!({
            "sender": sender(1),
            "meta": {"fullHeightCss": 200.0, "viewportWidthCss": 100.0, "viewportHeightCss": 100.0}
        }),
    )
    .await
    .unwrap();

    let err = call(
        &app,
        "capture.grab",
        json!({"sender": sender(2), "sessionId": init["sessionId"], "scrollYCss": 0.0}),
    )
    .await
    .unwrap_err();
    assert_eq!(err, "Session/tab mismatch.");

    let released = call(&app, "tab.closed", json!({"tabId": 1})).await.unwrap();
    assert_eq!(released["released"], true);
}

#[tokio::test]
async fn test_invalid_meta_and_missing_params() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    assert_eq!(
        call(&app, "capture.init", json!({"sender": sender(1), "meta": "tall"}))
            .await
            .unwrap_err(),
        "Invalid capture metadata."
    );
    assert_eq!(
        call(&app, "capture.init", json!({"sender": sender(1)})).await.unwrap_err(),
        "missing meta"
    );
    assert_eq!(
        call(&app, "viewport.present", json!({"windowId": 1})).await.unwrap_err(),
        "missing dataUrl"
    );
}

#[tokio::test]
async fn test_region_capture() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    call(&app, "viewport.present", json!({"windowId": 1, "dataUrl": frame_data_url([0, 255, 0])}))
        .await
        .unwrap();

    let result = call(
        &app,
        "capture.region",
        json!({
            "sender": sender(1),
            "rect": {"x": 10.0, "y": 10.0, "width": 30.0, "height": 20.0},
            "devicePixelRatio": 2.0
        }),
    )
    .await
    .unwrap();
    assert_eq!(result["width"], 60);
    assert_eq!(result["height"], 40);

    let history = call(&app, "capture.history", json!({"limit": 5})).await.unwrap();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["kind"], "region");
}

#[tokio::test]
async fn test_policy_set_blocks_and_persists() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);

    call(&app, "policy.set", json!({"killSwitchEngaged": true})).await.unwrap();
    let policy = call(&app, "policy.get", json!({})).await.unwrap();
    assert_eq!(policy["kill_switch_engaged"], true);

    let err = call(
        &app,
        "capture.init",
        json!({
            "sender": sender(1),
            "meta": {"fullHeightCss": 200.0, "viewportWidthCss": 100.0, "viewportHeightCss": 100.0}
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err, "Blocked by policy: kill switch is engaged.");

    let saved = std::fs::read_to_string(dir.path().join("settings.json")).unwrap();
    let saved: Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(saved["policy"]["kill_switch_engaged"], true);

    // A fresh app picks the policy up from disk.
    let reopened = new_app(&dir);
    assert!(reopened.policy.current().await.kill_switch_engaged);
}

#[tokio::test]
async fn test_settings_set_and_reset() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);

    let updated = call(&app, "settings.set", json!({"key": "capture.tile_quality", "value": 70}))
        .await
        .unwrap();
    assert_eq!(updated["capture"]["tile_quality"], 70);
    assert_eq!(app.coordinator.config().await.tile_quality, 70);

    assert!(call(&app, "settings.set", json!({"key": "capture.nope", "value": 1}))
        .await
        .is_err());
    assert!(call(&app, "settings.set", json!({"key": "capture.tile_quality"}))
        .await
        .is_err());

    let reset = call(&app, "settings.reset", json!({})).await.unwrap();
    assert_eq!(reset["capture"]["tile_quality"], 92);
    assert_eq!(app.coordinator.config().await.tile_quality, 92);
    assert_eq!(call(&app, "settings.get", json!({})).await.unwrap(), reset);
}

#[tokio::test]
async fn test_abort_always_succeeds() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    assert_eq!(
        call(&app, "capture.abort", json!({"sessionId": "ghost", "error": "gone"}))
            .await
            .unwrap(),
        json!({"ok": true})
    );
    assert_eq!(call(&app, "capture.last", json!({})).await.unwrap(), Value::Null);
}

async fn capture_region(app: &App) -> Value {
    call(app, "viewport.present", json!({"windowId": 1, "dataUrl": frame_data_url([0, 0, 255])}))
        .await
        .unwrap();
    call(
        app,
        "capture.region",
        json!({
            "sender": sender(1),
            "rect": {"x": 0.0, "y": 0.0, "width": 20.0, "height": 10.0},
            "devicePixelRatio": 1.0
        }),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_capture_image_and_clear() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    capture_region(&app).await;
    capture_region(&app).await;

    let last = call(&app, "capture.last", json!({})).await.unwrap();
    let image = call(&app, "capture.image", json!({"id": last["id"]})).await.unwrap();
    assert_eq!(image["width"], 20);
    assert_eq!(image["height"], 10);
    assert!(image["imageDataUrl"].as_str().unwrap().starts_with("data:image/"));

    assert_eq!(call(&app, "capture.image", json!({})).await.unwrap_err(), "missing id");
    assert!(call(&app, "capture.image", json!({"id": 9999})).await.is_err());

    let cleared = call(&app, "capture.clear", json!({})).await.unwrap();
    assert_eq!(cleared, json!({"ok": true, "removed": 2}));
    assert_eq!(call(&app, "capture.last", json!({})).await.unwrap(), Value::Null);
    assert!(call(&app, "capture.image", json!({"id": last["id"]})).await.is_err());
}

#[tokio::test]
async fn test_history_limit_setting_prunes_history() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    for _ in 0..3 {
        capture_region(&app).await;
    }
    assert_eq!(app.store.lock().await.retention(), 50);

    call(&app, "settings.set", json!({"key": "capture.history_limit", "value": 1}))
        .await
        .unwrap();
    let history = call(&app, "capture.history", json!({"limit": 10})).await.unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);

    capture_region(&app).await;
    let history = call(&app, "capture.history", json!({"limit": 10})).await.unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);

    // A fresh app takes the limit from the saved settings.
    let reopened = new_app(&dir);
    assert_eq!(reopened.store.lock().await.retention(), 1);
}

#[tokio::test]
async fn test_grab_rejects_out_of_range_index() {
    let dir = TempDir::new().unwrap();
    let app = new_app(&dir);
    let init = call(
        &app,
        "capture.init",
        json!({
            "sender": sender(1),
            "meta": {"fullHeightCss": 200.0, "viewportWidthCss": 100.0, "viewportHeightCss": 100.0}
        }),
    )
    .await
    .unwrap();
    let session_id = init["sessionId"].clone();

    for (index, total) in [(json!(4_294_967_296u64), json!(2)), (json!(-1), json!(2)), (json!(0), json!(1.5))] {
        let err = call(
            &app,
            "capture.grab",
            json!({
                "sender": sender(1),
                "sessionId": session_id,
                "scrollYCss": 0.0,
                "index": index,
                "total": total
            }),
        )
        .await
        .unwrap_err();
        assert!(err.starts_with("invalid "), "{}", err);
    }

    assert_eq!(
        call(&app, "capture.grab", json!({"sender": sender(1), "sessionId": "x", "scrollYCss": 0.0, "index": "two"}))
            .await
            .unwrap_err(),
        "invalid index: \"two\""
    );
}
