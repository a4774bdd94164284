//! Request handlers and response bodies

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use courier_common::{SentMessage, tracing};
use courier_delivery::{BatchOutcome, DeliveryError, DeliveryQueryService};
use serde::Serialize;

use crate::controller::ProcessingController;

/// Build and version information reported by `/version` and `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub build_time: String,
    pub git_commit: String,
}

impl VersionInfo {
    /// Version of this build, with build time and commit taken from the
    /// `COURIER_BUILD_TIME` and `COURIER_GIT_COMMIT` compile-time variables
    pub fn from_build() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_time: option_env!("COURIER_BUILD_TIME")
                .unwrap_or("unknown")
                .to_string(),
            git_commit: option_env!("COURIER_GIT_COMMIT")
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// Shared state behind every handler
#[derive(Clone)]
pub struct ControlState {
    pub controller: Arc<dyn ProcessingController>,
    pub sent: Arc<dyn DeliveryQueryService>,
    pub version: VersionInfo,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    #[serde(flatten)]
    pub outcome: BatchOutcome,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct SentMessagesResponse {
    pub messages: Vec<SentMessage>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub processing_status: &'static str,
    pub version: VersionInfo,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: String) -> Response {
    (status, Json(ErrorResponse { error, message })).into_response()
}

/// `POST /api/messaging/start`
pub async fn start_processing(State(state): State<ControlState>) -> Json<ControlResponse> {
    let message = if state.controller.start() {
        tracing::info!("Message processing started via API");
        "Message processing started successfully"
    } else {
        "Message processing already running"
    };

    Json(ControlResponse {
        status: "started",
        message,
    })
}

/// `POST /api/messaging/stop`
///
/// Returns once any in-flight batch has finished.
pub async fn stop_processing(State(state): State<ControlState>) -> Json<ControlResponse> {
    let message = if state.controller.stop().await {
        tracing::info!("Message processing stopped via API");
        "Message processing stopped successfully"
    } else {
        "Message processing already stopped"
    };

    Json(ControlResponse {
        status: "stopped",
        message,
    })
}

/// `GET /api/messaging/status`
pub async fn processing_status(State(state): State<ControlState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: state.controller.is_running(),
    })
}

/// `POST /api/messaging/process`
///
/// Runs one batch immediately, honouring the lock like a scheduled cycle.
pub async fn process_now(State(state): State<ControlState>) -> Response {
    match state.controller.process_once().await {
        Ok(outcome) => Json(ProcessResponse {
            outcome,
            success: outcome.is_success(),
        })
        .into_response(),
        Err(e) if e.is_lock_contended() => error_response(
            StatusCode::CONFLICT,
            "lock_contended",
            "Another instance is processing messages".to_string(),
        ),
        Err(DeliveryError::Timeout(after)) => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "processing_timeout",
            format!("Batch did not finish within {after:?}"),
        ),
        Err(e) => {
            tracing::error!(error = %e, "On-demand batch failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "processing_failed",
                e.to_string(),
            )
        }
    }
}

/// `GET /api/messages/sent`
pub async fn sent_messages(State(state): State<ControlState>) -> Response {
    match state.sent.sent_messages().await {
        Ok(messages) => Json(SentMessagesResponse {
            total: messages.len(),
            messages,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to retrieve sent messages");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "retrieval_failed",
                "Failed to retrieve sent messages".to_string(),
            )
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<ControlState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        processing_status: if state.controller.is_running() {
            "running"
        } else {
            "stopped"
        },
        version: state.version,
    })
}

/// `GET /version`
pub async fn version(State(state): State<ControlState>) -> Json<VersionInfo> {
    Json(state.version)
}
