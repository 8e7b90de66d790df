//! Camera session management.
//!
//! [`CameraSessionManager`] owns at most one active [`CameraSource`] and the
//! dedicated thread that reads it. Start and stop requests are serialized
//! by a single lock, so a new session only starts after the previous
//! source has been stopped and its reading loop has exited.
//!
//! The reading loop writes every frame into the [`FrameCache`] and forwards
//! it over a bounded queue to the live-view publisher. End of stream and
//! read errors arrive on the same queue as a terminal [`StreamEvent::Ended`].

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::camera::{
    CameraKind, CameraSource, CaptureError, DeviceSource, Frame, FrameCache, FrameDevice,
    NextFrame, ProcessSettings, ProcessSource, Resolution, SourceError, StillCommand,
};

/// Default depth of the queue between the reading loop and the live view.
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Lifecycle of a camera session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Stopping,
    Error,
}

/// Snapshot of the manager's current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub session_id: u64,
    pub state: SessionState,
    /// Kind of the session, unless idle
    pub kind: Option<CameraKind>,
}

/// Errors returned by [`CameraSessionManager::start_session`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to start camera: {0}")]
    Start(#[from] SourceError),
    #[error("Failed to spawn camera reading thread: {0}")]
    ReaderSpawn(std::io::Error),
}

/// Messages from the reading loop to the live view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Frame(Frame),
    /// Terminal: the session ended, with a human-readable reason
    Ended(String),
}

/// Receiving end of one session's frame sequence.
///
/// Dropping it tells the reading loop the viewer is gone; the loop then
/// stops its source.
#[derive(Debug)]
pub struct LiveFeed {
    session_id: u64,
    rx: mpsc::Receiver<StreamEvent>,
}

impl LiveFeed {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Blocking variant for use outside the async runtime.
    pub fn blocking_recv(&mut self) -> Option<StreamEvent> {
        self.rx.blocking_recv()
    }
}

/// Builds a fresh source for each session.
pub trait SourceFactory: Send + Sync {
    fn create(&self, kind: CameraKind) -> Arc<dyn CameraSource>;
}

/// Factory for the real capture program and capture device.
#[derive(Debug, Clone)]
pub struct SystemSources {
    pub process: ProcessSettings,
    pub device_index: u32,
    pub device_backoff: Duration,
    pub device_resolution: Resolution,
    pub device_framerate: u32,
}

impl SystemSources {
    #[cfg(feature = "v4l2")]
    fn device(&self) -> Box<dyn FrameDevice> {
        Box::new(crate::camera::V4l2Device::new(
            self.device_resolution,
            self.device_framerate,
        ))
    }

    #[cfg(not(feature = "v4l2"))]
    fn device(&self) -> Box<dyn FrameDevice> {
        Box::new(crate::camera::UnsupportedDevice)
    }
}

impl SourceFactory for SystemSources {
    fn create(&self, kind: CameraKind) -> Arc<dyn CameraSource> {
        match kind {
            CameraKind::Process => Arc::new(ProcessSource::new(self.process.clone())),
            CameraKind::Device => Arc::new(DeviceSource::new(
                self.device(),
                self.device_index,
                self.device_backoff,
            )),
        }
    }
}

/// Behaviour of the manager that does not depend on the source kind.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Kind used for still capture when no session is active
    pub default_kind: CameraKind,
    pub queue_depth: usize,
    /// One-shot still command for the process-backed kind
    pub still: Option<StillCommand>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_kind: CameraKind::Process,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            still: None,
        }
    }
}

struct ActiveSession {
    id: u64,
    source: Arc<dyn CameraSource>,
    reader: JoinHandle<()>,
    stop_requested: Arc<AtomicBool>,
}

/// Session status shared with the reading loop.
///
/// Updates are tagged with the session id so a loop that outlives its
/// session cannot overwrite the status of a newer one.
struct StatusCell {
    inner: Mutex<SessionStatus>,
}

impl StatusCell {
    fn new() -> Self {
        Self {
            inner: Mutex::new(SessionStatus {
                session_id: 0,
                state: SessionState::Idle,
                kind: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionStatus> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self) -> SessionStatus {
        *self.lock()
    }

    fn begin(&self, id: u64, kind: CameraKind) {
        *self.lock() = SessionStatus {
            session_id: id,
            state: SessionState::Starting,
            kind: Some(kind),
        };
    }

    fn set_if(&self, id: u64, state: SessionState) {
        let mut status = self.lock();
        if status.session_id == id {
            status.state = state;
            if state == SessionState::Idle {
                status.kind = None;
            }
        }
    }
}

/// Owner of the single active camera session.
pub struct CameraSessionManager {
    factory: Arc<dyn SourceFactory>,
    settings: SessionSettings,
    cache: FrameCache,
    active: Mutex<Option<ActiveSession>>,
    status: Arc<StatusCell>,
    next_id: AtomicU64,
}

impl CameraSessionManager {
    pub fn new(factory: Arc<dyn SourceFactory>, settings: SessionSettings) -> Self {
        Self {
            factory,
            settings,
            cache: FrameCache::new(),
            active: Mutex::new(None),
            status: Arc::new(StatusCell::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// The latest-frame cache written by the active session.
    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn status(&self) -> SessionStatus {
        self.status.get()
    }

    /// Start a session of `kind`, fully stopping any active one first.
    ///
    /// On failure the manager is left idle.
    pub fn start_session(&self, kind: CameraKind) -> Result<LiveFeed, SessionError> {
        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            self.shutdown(previous);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.begin(id, kind);
        self.cache.clear();
        log::info!("Starting {} camera session #{}", kind, id);

        let source = self.factory.create(kind);
        if let Err(e) = source.start() {
            log::error!("Camera session #{} failed to start: {}", id, e);
            self.status.set_if(id, SessionState::Error);
            source.stop();
            self.status.set_if(id, SessionState::Idle);
            return Err(SessionError::Start(e));
        }

        let (tx, rx) = mpsc::channel(self.settings.queue_depth.max(1));
        let stop_requested = Arc::new(AtomicBool::new(false));
        self.status.set_if(id, SessionState::Streaming);

        let reading_loop = ReadingLoop {
            id,
            source: Arc::clone(&source),
            cache: self.cache.clone(),
            status: Arc::clone(&self.status),
            stop_requested: Arc::clone(&stop_requested),
            tx,
        };
        let reader = thread::Builder::new()
            .name(format!("camera-session-{}", id))
            .spawn(move || reading_loop.run());

        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Camera session #{} reading thread failed to spawn: {}", id, e);
                self.status.set_if(id, SessionState::Error);
                source.stop();
                self.status.set_if(id, SessionState::Idle);
                return Err(SessionError::ReaderSpawn(e));
            }
        };

        *active = Some(ActiveSession {
            id,
            source,
            reader,
            stop_requested,
        });

        Ok(LiveFeed {
            session_id: id,
            rx,
        })
    }

    /// Stop the active session, if any. Never fails.
    pub fn stop_session(&self) {
        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            self.shutdown(previous);
        }
    }

    /// Produce a still image.
    ///
    /// For the process-backed kind the one-shot command is tried first; any
    /// failure (including its timeout) falls back to the cached live frame.
    pub fn capture_still(&self) -> Result<Frame, CaptureError> {
        let kind = self.status().kind.unwrap_or(self.settings.default_kind);

        if kind == CameraKind::Process {
            if let Some(still) = &self.settings.still {
                match still.capture() {
                    Ok(frame) => {
                        log::info!("Captured {}-byte still with '{}'", frame.len(), still.program);
                        return Ok(frame);
                    }
                    Err(e) => {
                        log::info!("One-shot capture failed, falling back to live frame: {}", e);
                    }
                }
            }
        }

        self.cache.get().ok_or(CaptureError::NoFrameAvailable)
    }

    fn shutdown(&self, session: ActiveSession) {
        self.status.set_if(session.id, SessionState::Stopping);
        session.stop_requested.store(true, Ordering::SeqCst);
        session.source.stop();
        if session.reader.join().is_err() {
            log::error!("Reading loop of camera session #{} panicked", session.id);
        }
        self.status.set_if(session.id, SessionState::Idle);
        log::info!("Camera session #{} stopped", session.id);
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CameraSessionManager {
    fn drop(&mut self) {
        self.stop_session();
    }
}

/// The per-session producer running on its own thread.
struct ReadingLoop {
    id: u64,
    source: Arc<dyn CameraSource>,
    cache: FrameCache,
    status: Arc<StatusCell>,
    stop_requested: Arc<AtomicBool>,
    tx: mpsc::Sender<StreamEvent>,
}

impl ReadingLoop {
    fn run(self) {
        let reason = loop {
            match self.source.next_frame() {
                Ok(NextFrame::Frame(frame)) => {
                    self.cache.set(frame.clone());
                    match self.tx.try_send(StreamEvent::Frame(frame)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            log::debug!("Live view queue full, dropping frame");
                        }
                        Err(TrySendError::Closed(_)) => {
                            log::info!("Live viewer of camera session #{} disconnected", self.id);
                            break None;
                        }
                    }
                }
                Ok(NextFrame::EndOfStream) => {
                    if self.stop_requested.load(Ordering::SeqCst) {
                        break Some("camera stopped".to_string());
                    }
                    break Some("camera stream ended".to_string());
                }
                Err(e) => {
                    log::warn!("Camera session #{} read failed: {}", self.id, e);
                    break Some(e.to_string());
                }
            }
        };

        self.status.set_if(self.id, SessionState::Stopping);
        self.source.stop();
        if let Some(reason) = reason {
            log::info!("Camera session #{} ended: {}", self.id, reason);
            // A full queue drops this too; the publisher then reports the closed channel.
            let _ = self.tx.try_send(StreamEvent::Ended(reason));
        }
        self.status.set_if(self.id, SessionState::Idle);
    }
}
