//! Dashboard HTTP surface.
//!
//! - `GET /api/feedback-logs`: stored feedback, newest first
//! - `GET /api/status`: liveness check for the dashboard
//! - everything else: static files from the configured directory

use std::path::Path;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use helpdesk_core::domain::feedback::FeedbackRecord;
use helpdesk_db::FeedbackRepository;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{error, info};

#[derive(Clone)]
pub struct ApiState {
    feedback: Arc<dyn FeedbackRepository>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub fn router(feedback: Arc<dyn FeedbackRepository>, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/api/feedback-logs", get(feedback_logs))
        .route("/api/status", get(status))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(ApiState { feedback })
}

pub fn spawn(address: &str, listener: TcpListener, app: Router) {
    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "dashboard server started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            error!(
                event_name = "system.http.error",
                correlation_id = "bootstrap",
                error = %error,
                "dashboard server terminated unexpectedly"
            );
        }
    });
}

pub async fn feedback_logs(
    State(state): State<ApiState>,
) -> Result<Json<Vec<FeedbackRecord>>, (StatusCode, Json<ApiError>)> {
    state.feedback.list_newest_first(None).await.map(Json).map_err(|error| {
        error!(
            event_name = "api.feedback_logs.failed",
            error = %error,
            "failed to load feedback logs"
        );
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError { error: "failed to load feedback logs".to_string() }),
        )
    })
}

pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse { ok: true, message: "Helpdesk dashboard API is running".to_string() })
}
