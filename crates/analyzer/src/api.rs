//! HTTP API: analysis trigger, health checks and Prometheus metrics

use analyzer_lib::{
    health::HealthRegistry,
    models::{Discipline, Session},
    worker::{SubmitError, WorkerPool},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: WorkerPool,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(pool: WorkerPool, health_registry: HealthRegistry) -> Self {
        Self {
            pool,
            health_registry,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub video_url: Option<String>,
    pub session_id: Option<String>,
    pub session_type: Option<String>,
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(json!({ "message": text.into() }))).into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validate a trigger request and queue the run
async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TriggerRequest>, JsonRejection>,
) -> Response {
    let request = payload.map(|Json(r)| r).unwrap_or_default();

    let (Some(video_url), Some(session_id)) =
        (non_empty(request.video_url), non_empty(request.session_id))
    else {
        return message(StatusCode::BAD_REQUEST, "Missing videoUrl or sessionId");
    };

    let discipline = match non_empty(request.session_type) {
        None => Discipline::default(),
        Some(kind) => match kind.parse::<Discipline>() {
            Ok(discipline) => discipline,
            Err(e) => return message(StatusCode::BAD_REQUEST, e),
        },
    };

    let session = Session::new(session_id.clone(), discipline, video_url);
    match state.pool.submit(session) {
        Ok(()) => {
            info!(session_id = %session_id, discipline = %discipline, "Analysis accepted");
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "message": "Analysis started in background",
                    "sessionId": session_id,
                })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Analysis rejected");
            let status = match e {
                SubmitError::Duplicate(_) => StatusCode::CONFLICT,
                SubmitError::QueueFull | SubmitError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            };
            message(status, e.to_string())
        }
    }
}

/// Liveness check
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "AI Service is running" }))
}

/// Readiness with component detail - 200 if ready, 503 otherwise
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let report = state.health_registry.health().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "ready": readiness.ready,
            "reason": readiness.reason,
            "status": report.status,
            "components": report.components,
            "activeSessions": state.pool.active_sessions(),
        })),
    )
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
