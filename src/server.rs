//! HTTP server for live sessions.
//!
//! This module provides an HTTP server that:
//! - Runs the session lifecycle (schedule, start, end) for faculty dashboards
//! - Accepts per-student frames via POST /sessions/:id/samples
//! - Serves aggregate snapshots and the crash-recovery query for polling
//!
//! # Architecture
//!
//! ```text
//! Capture loop ──→ POST /sessions/:id/samples ──→ SessionHub ──→ aggregate
//!                                                     ↑
//! Dashboard ──→ GET /sessions/:id/snapshot ───────────┘
//!           ──→ GET /groups/:id/current (on reload)
//! ```

use crate::core::{
    AggregateSnapshot, AttendanceSummary, CurrentLive, EndedSession, GroupId, HubConfig,
    ScheduleWindow, SessionError, SessionHub, SessionId, StartedSession,
};
use crate::protocol::{
    ErrorResponse, HealthResponse, ScheduleRequest, ScheduleResponse, ScheduledSessionInfo,
    ScheduledSessionsResponse, StartInstantRequest, SubmitSampleRequest, SubmitSampleResponse,
};
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
    pub hub: HubConfig,
}

impl ServerConfig {
    /// Create a new server configuration bound to localhost
    pub fn new(port: u16, hub: HubConfig) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            hub,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(err: SessionError) -> ApiError {
    let status = match err {
        SessionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::GroupAlreadyLive { .. }
        | SessionError::InvalidTransition { .. }
        | SessionError::SessionStillLive(_) => StatusCode::CONFLICT,
        SessionError::SessionNotLive(_)
        | SessionError::InvalidWindow(_)
        | SessionError::MissingFrame => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /sessions/schedule
async fn schedule_session(
    State(hub): State<Arc<SessionHub>>,
    Json(req): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleResponse>), ApiError> {
    let window = ScheduleWindow::parse(&req.scheduled_start, &req.scheduled_end).map_err(api_error)?;
    let session = hub.schedule_session(req.group_id, req.topic, window).await;
    Ok((
        StatusCode::CREATED,
        Json(ScheduleResponse {
            session_id: session.session_id,
        }),
    ))
}

/// POST /sessions/start_instant
async fn start_instant(
    State(hub): State<Arc<SessionHub>>,
    Json(req): Json<StartInstantRequest>,
) -> Result<(StatusCode, Json<StartedSession>), ApiError> {
    let started = hub
        .start_instant(req.group_id, req.topic)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// POST /sessions/:session_id/start
async fn start_scheduled(
    State(hub): State<Arc<SessionHub>>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<StartedSession> {
    hub.start_scheduled(session_id).await.map(Json).map_err(api_error)
}

/// POST /sessions/:session_id/end
async fn end_session(
    State(hub): State<Arc<SessionHub>>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<EndedSession> {
    hub.end_session(session_id).await.map(Json).map_err(api_error)
}

/// POST /sessions/:session_id/samples
///
/// Classifies the frame and folds the label into the live aggregate. The
/// frame is dropped before this returns.
async fn submit_sample(
    State(hub): State<Arc<SessionHub>>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<SubmitSampleRequest>,
) -> ApiResult<SubmitSampleResponse> {
    let emotion_label = hub
        .submit(req.into_submission(session_id))
        .await
        .map_err(api_error)?;
    Ok(Json(SubmitSampleResponse { emotion_label }))
}

/// GET /sessions/:session_id/snapshot
async fn snapshot(
    State(hub): State<Arc<SessionHub>>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<AggregateSnapshot> {
    hub.snapshot(session_id).await.map(Json).map_err(api_error)
}

/// GET /sessions/:session_id/summary
async fn summary(
    State(hub): State<Arc<SessionHub>>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<AttendanceSummary> {
    hub.summary(session_id).await.map(Json).map_err(api_error)
}

/// GET /groups/:group_id/current
async fn current_live(
    State(hub): State<Arc<SessionHub>>,
    Path(group_id): Path<GroupId>,
) -> Json<CurrentLive> {
    Json(hub.current_live(group_id).await)
}

/// GET /groups/:group_id/scheduled
async fn scheduled_sessions(
    State(hub): State<Arc<SessionHub>>,
    Path(group_id): Path<GroupId>,
) -> Json<ScheduledSessionsResponse> {
    let scheduled_sessions = hub
        .scheduled_sessions(group_id)
        .await
        .iter()
        .map(ScheduledSessionInfo::from)
        .collect();
    Json(ScheduledSessionsResponse { scheduled_sessions })
}

/// Build the application router around a hub.
pub fn router(hub: Arc<SessionHub>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions/schedule", post(schedule_session))
        .route("/sessions/start_instant", post(start_instant))
        .route("/sessions/:session_id/start", post(start_scheduled))
        .route("/sessions/:session_id/end", post(end_session))
        .route("/sessions/:session_id/samples", post(submit_sample))
        .route("/sessions/:session_id/snapshot", get(snapshot))
        .route("/sessions/:session_id/summary", get(summary))
        .route("/groups/:group_id/current", get(current_live))
        .route("/groups/:group_id/scheduled", get(scheduled_sessions))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                    // Dashboard dev server
                    HeaderValue::from_static("http://localhost:3000"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(hub)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    hub: Arc<SessionHub>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(hub);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Session server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
