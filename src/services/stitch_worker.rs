//! Typed request/response channel to the compositor.
//!
//! The compositor runs on its own task and owns every canvas. Callers hold a
//! cloneable [`StitcherHandle`]; each call sends one [`StitchCommand`] and
//! awaits its reply, so requests are served strictly in arrival order.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::services::stitcher::{Stitcher, StitcherTrait};
use crate::types::capture::{CaptureMeta, CapturedImage, OutputFormat};
use crate::types::errors::StitchError;

type Reply<T> = oneshot::Sender<Result<T, StitchError>>;

/// Messages understood by the compositor task.
pub enum StitchCommand {
    Begin {
        session_id: String,
        meta: CaptureMeta,
        reply: Reply<()>,
    },
    Append {
        session_id: String,
        tile: Vec<u8>,
        scroll_y_css: f64,
        reply: Reply<()>,
    },
    Finish {
        session_id: String,
        format: OutputFormat,
        quality: f32,
        reply: Reply<CapturedImage>,
    },
    Abort {
        session_id: String,
        reply: oneshot::Sender<()>,
    },
}

/// Client side of the compositor task.
#[derive(Clone)]
pub struct StitcherHandle {
    tx: mpsc::Sender<StitchCommand>,
}

impl StitcherHandle {
    /// Spawns the compositor task on the current Tokio runtime.
    pub fn spawn() -> Self {
        Self::spawn_with(Stitcher::new())
    }

    pub fn spawn_with<S>(stitcher: S) -> Self
    where
        S: StitcherTrait + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(run(stitcher, rx));
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> StitchCommand,
    ) -> Result<T, StitchError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| StitchError::WorkerUnavailable)?;
        rx.await.map_err(|_| StitchError::WorkerUnavailable)?
    }

    pub async fn begin(&self, session_id: &str, meta: CaptureMeta) -> Result<(), StitchError> {
        let session_id = session_id.to_string();
        self.request(|reply| StitchCommand::Begin {
            session_id,
            meta,
            reply,
        })
        .await
    }

    pub async fn append(
        &self,
        session_id: &str,
        tile: Vec<u8>,
        scroll_y_css: f64,
    ) -> Result<(), StitchError> {
        let session_id = session_id.to_string();
        self.request(|reply| StitchCommand::Append {
            session_id,
            tile,
            scroll_y_css,
            reply,
        })
        .await
    }

    pub async fn finish(
        &self,
        session_id: &str,
        format: OutputFormat,
        quality: f32,
    ) -> Result<CapturedImage, StitchError> {
        let session_id = session_id.to_string();
        self.request(|reply| StitchCommand::Finish {
            session_id,
            format,
            quality,
            reply,
        })
        .await
    }

    /// Best-effort discard; never fails, even if the task is gone.
    pub async fn abort(&self, session_id: &str) {
        let (reply, rx) = oneshot::channel();
        let cmd = StitchCommand::Abort {
            session_id: session_id.to_string(),
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            warn!(session_id, "stitch worker gone; abort dropped");
            return;
        }
        let _ = rx.await;
    }
}

async fn run<S: StitcherTrait>(mut stitcher: S, mut rx: mpsc::Receiver<StitchCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StitchCommand::Begin {
                session_id,
                meta,
                reply,
            } => {
                let _ = reply.send(stitcher.begin(&session_id, meta));
            }
            StitchCommand::Append {
                session_id,
                tile,
                scroll_y_css,
                reply,
            } => {
                let _ = reply.send(stitcher.append(&session_id, &tile, scroll_y_css));
            }
            StitchCommand::Finish {
                session_id,
                format,
                quality,
                reply,
            } => {
                let _ = reply.send(stitcher.finish(&session_id, format, quality));
            }
            StitchCommand::Abort { session_id, reply } => {
                stitcher.abort(&session_id);
                let _ = reply.send(());
            }
        }
    }
    debug!("stitch worker stopped");
}
