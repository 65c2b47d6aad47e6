//! Glazyr RPC server: newline-delimited JSON over stdin/stdout.
//!
//! Request:  {"id":1, "method":"capture.init", "params":{"sender":{...},"meta":{...}}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Events:   {"event":{"type":"CAPTURE_HINT","text":"..."}}
//!
//! Logs go to stderr so stdout stays a clean protocol stream.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glazyr::app::App;
use glazyr::platform;
use glazyr::rpc_handler::handle_method;
use glazyr::types::capture::CaptureEvent;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_REQUESTS_PER_SECOND: u32 = 200;

/// Fixed one-second window request counter.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

fn db_path() -> PathBuf {
    let dir = platform::get_data_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(dir = %dir.display(), error = %e, "cannot create data dir, using working directory");
        return PathBuf::from("glazyr.db");
    }
    dir.join("glazyr.db")
}

/// Single writer for stdout; every response and event goes through here.
async fn write_lines(mut rx: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = rx.recv().await {
        if stdout.write_all(line.as_bytes()).await.is_err()
            || stdout.write_all(b"\n").await.is_err()
            || stdout.flush().await.is_err()
        {
            break;
        }
    }
}

async fn forward_events(mut events: broadcast::Receiver<CaptureEvent>, out: mpsc::UnboundedSender<String>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if out.send(json!({ "event": event }).to_string()).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event forwarder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let db_path = db_path();
    let app = match App::new(&db_path.to_string_lossy(), None) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            error!(db = %db_path.display(), error = %e, "failed to initialise glazyr");
            std::process::exit(1);
        }
    };
    info!(db = %db_path.display(), "glazyr-rpc started");

    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(out_rx));
    tokio::spawn(forward_events(app.coordinator.subscribe(), out_tx.clone()));

    let _ = out_tx.send(json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}).to_string());

    let mut rate_limiter = RateLimiter::new(MAX_REQUESTS_PER_SECOND);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let _ = out_tx.send(json!({"id": null, "error": format!("parse error: {}", e)}).to_string());
                continue;
            }
        };
        let id = req.get("id").cloned().unwrap_or(Value::Null);

        if !rate_limiter.check() {
            let _ = out_tx.send(json!({"id": id, "error": "rate limit exceeded"}).to_string());
            continue;
        }

        let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let params = req.get("params").cloned().unwrap_or(json!({}));
        let app = app.clone();
        let out = out_tx.clone();
        tokio::spawn(async move {
            debug!(%method, "rpc request");
            let response = match handle_method(&app, &method, &params).await {
                Ok(val) => json!({"id": id, "result": val}),
                Err(err) => json!({"id": id, "error": err}),
            };
            let _ = out.send(response.to_string());
        });
    }

    info!("stdin closed, shutting down");
    drop(out_tx);
    drop(app);
    let _ = writer.await;
}
