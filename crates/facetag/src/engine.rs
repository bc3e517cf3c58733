//! Engine thread: owns the capture source and the recognition session and
//! runs the per-frame tick loop.

use crate::overlay;
use facetag_core::{FaceEncoder, MatchResult, RecognitionSession, StoreError};
use facetag_hw::{CameraError, CaptureSource};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::oneshot;

/// Reports buffered between the engine and the output writer.
const REPORT_BUFFER: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Faces labelled in one captured frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub faces: Vec<MatchResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub enabled: bool,
    pub references: usize,
    pub names: Vec<String>,
    pub frames: u64,
    /// Ticks that produced no frame.
    pub skipped: u64,
    pub resize_factor: f64,
    pub tolerance: f32,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub fps: f64,
    /// Managed directory that `add` copies reference images into.
    pub images_dir: PathBuf,
    /// Recognition state at startup.
    pub enabled: bool,
    /// Annotated PNG rewritten after every processed frame.
    pub snapshot: Option<PathBuf>,
}

/// Messages sent from the operator side to the engine thread.
enum EngineRequest {
    SetEnabled(bool),
    AddImage {
        path: PathBuf,
        reply: oneshot::Sender<Result<PathBuf, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Shutdown,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enable recognition from the next tick on.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.send(EngineRequest::SetEnabled(true)).await
    }

    /// Disable recognition from the next tick on.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.send(EngineRequest::SetEnabled(false)).await
    }

    /// Copy an image into the reference directory and register it.
    /// Returns the path of the copy.
    pub async fn add_image(&self, path: PathBuf) -> Result<PathBuf, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::AddImage {
            path,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::Status { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Ask the engine to exit after the current tick. The capture source is
    /// released when the thread returns.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(EngineRequest::Shutdown).await
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(request).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Returns the request handle, the stream of per-frame reports (frames with
/// at least one face) and the thread's join handle. The engine exits on
/// `shutdown` or once every handle is dropped.
pub fn spawn_engine<S, E>(
    source: S,
    session: RecognitionSession<E>,
    options: EngineOptions,
) -> Result<(EngineHandle, mpsc::Receiver<FrameReport>, std::thread::JoinHandle<()>), EngineError>
where
    S: CaptureSource + Send + 'static,
    E: FaceEncoder + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<EngineRequest>(8);
    let (report_tx, report_rx) = mpsc::channel::<FrameReport>(REPORT_BUFFER);

    let engine = Engine {
        enabled: options.enabled,
        frames: 0,
        skipped: 0,
        source,
        session,
        options,
        reports: report_tx,
    };

    let thread = std::thread::Builder::new()
        .name("facetag-engine".into())
        .spawn(move || engine.run(rx))
        .map_err(EngineError::Spawn)?;

    Ok((EngineHandle { tx }, report_rx, thread))
}

struct Engine<S, E> {
    source: S,
    session: RecognitionSession<E>,
    options: EngineOptions,
    enabled: bool,
    frames: u64,
    skipped: u64,
    reports: mpsc::Sender<FrameReport>,
}

impl<S: CaptureSource, E: FaceEncoder> Engine<S, E> {
    fn run(mut self, mut rx: mpsc::Receiver<EngineRequest>) {
        let period = Duration::from_secs_f64(1.0 / self.options.fps);
        tracing::info!(
            fps = self.options.fps,
            enabled = self.enabled,
            references = self.session.store().len(),
            "engine thread started"
        );

        'ticks: loop {
            let tick = Instant::now();

            loop {
                match rx.try_recv() {
                    Ok(EngineRequest::Shutdown) => break 'ticks,
                    Ok(request) => self.handle(request),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'ticks,
                }
            }

            self.tick();

            if let Some(rest) = period.checked_sub(tick.elapsed()) {
                std::thread::sleep(rest);
            }
        }

        tracing::info!(frames = self.frames, "engine thread exiting");
    }

    fn handle(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::SetEnabled(enabled) => {
                if enabled != self.enabled {
                    tracing::info!(enabled, "recognition toggled");
                }
                self.enabled = enabled;
            }
            EngineRequest::AddImage { path, reply } => {
                let result = self
                    .session
                    .add_reference_image(&path, &self.options.images_dir)
                    .map_err(EngineError::from);
                if let Err(err) = &result {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "reference image rejected"
                    );
                }
                let _ = reply.send(result);
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(self.status());
            }
            EngineRequest::Shutdown => {}
        }
    }

    fn status(&self) -> EngineStatus {
        let store = self.session.store();
        EngineStatus {
            enabled: self.enabled,
            references: store.len(),
            names: store.names().into_iter().map(String::from).collect(),
            frames: self.frames,
            skipped: self.skipped,
            resize_factor: self.session.factor().get(),
            tolerance: self.session.tolerance(),
        }
    }

    fn tick(&mut self) {
        let captured = self
            .source
            .next_frame()
            .and_then(|frame| frame.into_image().map_err(CameraError::from));
        let image = match captured {
            Ok(image) => image,
            Err(err) => {
                self.skipped += 1;
                tracing::warn!(error = %err, "frame unavailable, skipping tick");
                return;
            }
        };
        self.frames += 1;

        let faces = match self.session.process(&image, self.enabled) {
            Ok(faces) => faces,
            Err(err) => {
                tracing::warn!(
                    frame = self.frames,
                    error = %err,
                    "recognition failed, skipping frame"
                );
                return;
            }
        };

        if let Some(path) = &self.options.snapshot {
            if let Err(err) = overlay::render(&image, &faces).save(path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to write snapshot");
            }
        }

        if faces.is_empty() {
            return;
        }
        let report = FrameReport {
            frame: self.frames,
            faces,
        };
        match self.reports.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(report)) => {
                tracing::debug!(
                    frame = report.frame,
                    "report consumer lagging, dropping frame report"
                );
            }
            // Nobody is listening; frames are still processed for snapshots.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
