//! HTTP routes over the camera core.
//!
//! Only the routes that touch the session manager and the frame cache live
//! here. Blocking manager calls (process spawn, stop with its grace period,
//! the one-shot still command) run on the blocking pool.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinError;

use crate::camera::CameraKind;
use crate::session::{CameraSessionManager, SessionState};
use crate::storage::{PhotoStore, SavedPhoto};
use crate::stream::StreamPublisher;

/// Errors from binding or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared state of all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CameraSessionManager>,
    pub store: Arc<PhotoStore>,
    /// Kind started for each live-view request
    pub kind: CameraKind,
    /// Set by `/start_camera`, cleared by `/stop_camera`
    pub camera_active: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(manager: Arc<CameraSessionManager>, store: PhotoStore, kind: CameraKind) -> Self {
        Self {
            manager,
            store: Arc::new(store),
            kind,
            camera_active: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Body of `/api/camera_status`.
#[derive(Debug, Serialize)]
pub struct CameraStatusBody {
    pub state: SessionState,
    pub session_id: u64,
    pub kind: Option<CameraKind>,
    pub camera_active: bool,
    pub has_frame: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/video_stream", get(video_stream))
        .route("/capture", post(capture))
        .route("/start_camera", get(start_camera))
        .route("/stop_camera", get(stop_camera))
        .route("/api/camera_status", get(camera_status))
        .with_state(state)
}

/// Bind the listening socket.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serve until `shutdown` resolves and all connections have finished.
///
/// Live views only finish once their session stops, so `shutdown` should
/// stop the session before resolving.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)
}

async fn video_stream(State(state): State<AppState>) -> Response {
    let manager = Arc::clone(&state.manager);
    let kind = state.kind;
    let started = tokio::task::spawn_blocking(move || manager.start_session(kind)).await;

    match started {
        Ok(Ok(feed)) => StreamPublisher::new(feed).into_response(),
        Ok(Err(e)) => {
            log::warn!("Live view could not start: {}", e);
            StreamPublisher::failed(e.to_string()).into_response()
        }
        Err(e) => {
            log::error!("Live view start task failed: {}", e);
            StreamPublisher::failed("camera start was interrupted").into_response()
        }
    }
}

async fn capture(State(state): State<AppState>) -> Response {
    let manager = Arc::clone(&state.manager);
    let store = Arc::clone(&state.store);

    let result = tokio::task::spawn_blocking(move || {
        let frame = manager.capture_still().map_err(|e| e.to_string())?;
        store.save(&frame).map_err(|e| e.to_string())
    })
    .await;

    capture_response(result)
}

fn capture_response(result: Result<Result<SavedPhoto, String>, JoinError>) -> Response {
    match result {
        Ok(Ok(saved)) => Json(json!({ "success": true, "filename": saved.filename })).into_response(),
        Ok(Err(error)) => {
            log::warn!("Capture failed: {}", error);
            capture_failure(error)
        }
        Err(e) => {
            log::error!("Capture task failed: {}", e);
            capture_failure("capture was interrupted".to_string())
        }
    }
}

fn capture_failure(error: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": error })),
    )
        .into_response()
}

async fn start_camera(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.camera_active.store(true, Ordering::SeqCst);
    Json(json!({ "status": "camera_started" }))
}

async fn stop_camera(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.camera_active.store(false, Ordering::SeqCst);
    let manager = Arc::clone(&state.manager);
    if let Err(e) = tokio::task::spawn_blocking(move || manager.stop_session()).await {
        log::error!("Camera stop task failed: {}", e);
    }
    Json(json!({ "status": "camera_stopped" }))
}

async fn camera_status(State(state): State<AppState>) -> Json<CameraStatusBody> {
    let status = state.manager.status();
    Json(CameraStatusBody {
        state: status.state,
        session_id: status.session_id,
        kind: status.kind,
        camera_active: state.camera_active.load(Ordering::SeqCst),
        has_frame: state.manager.cache().get().is_some(),
    })
}
