//! HTTP shell around the orchestrator
//!
//! `GET /make-short?link=&start=&end=` runs one pipeline and answers with
//! the published reference. Failures are deliberately uniform: clients get
//! a fixed message, the stage and error kind go to the log.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::pipeline::{Orchestrator, PipelineRequest};

/// Body sent when a parameter is missing
pub const MISSING_PARAMETERS_MESSAGE: &str = "Missing parameters: 'link', 'start', 'end'";
/// Body sent for every pipeline failure
pub const FAILURE_MESSAGE: &str = "Error downloading or uploading video";
/// Body sent on success
pub const SUCCESS_MESSAGE: &str = "Video downloaded and uploaded successfully";

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    jobs: Arc<Semaphore>,
}

impl AppState {
    /// Allow at most `max_concurrent_jobs` pipeline runs at once (minimum 1).
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent_jobs: usize) -> Self {
        Self {
            orchestrator,
            jobs: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }
}

/// Query string of `/make-short`
#[derive(Debug, Default, Deserialize)]
pub struct MakeShortQuery {
    pub link: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// JSON answer of `/make-short`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeShortResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl MakeShortResponse {
    fn message(message: &str) -> Self {
        Self {
            message: message.to_string(),
            url: None,
        }
    }
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/make-short", get(make_short))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn make_short(State(state): State<AppState>, Query(query): Query<MakeShortQuery>) -> Response {
    let request = match PipelineRequest::from_query(
        query.link.as_deref(),
        query.start.as_deref(),
        query.end.as_deref(),
    ) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(MakeShortResponse::message(MISSING_PARAMETERS_MESSAGE)),
            )
                .into_response();
        }
    };

    let Ok(_permit) = state.jobs.acquire().await else {
        error!("Job semaphore closed");
        return failure();
    };

    match state.orchestrator.run(&request).await {
        Ok(result) => (
            StatusCode::OK,
            Json(MakeShortResponse {
                message: SUCCESS_MESSAGE.to_string(),
                url: Some(result.published_reference),
            }),
        )
            .into_response(),
        Err(failure_info) => {
            error!(
                "make-short failed while {} ({})",
                failure_info.stage,
                failure_info.error.kind()
            );
            failure()
        }
    }
}

fn failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MakeShortResponse::message(FAILURE_MESSAGE)),
    )
        .into_response()
}

/// Bind `addr` and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: &str, state: AppState) -> Result<(), PipelineError> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, state, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), PipelineError> {
    let local: SocketAddr = listener.local_addr()?;
    info!("Listening on http://{}", local);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape() {
        let body = serde_json::to_string(&MakeShortResponse::message(FAILURE_MESSAGE)).unwrap();
        assert_eq!(body, r#"{"message":"Error downloading or uploading video"}"#);

        let ok = MakeShortResponse {
            message: SUCCESS_MESSAGE.to_string(),
            url: Some("https://cdn.example.com/a.mp4_short".to_string()),
        };
        let body = serde_json::to_value(&ok).unwrap();
        assert_eq!(body["url"], "https://cdn.example.com/a.mp4_short");
    }

    #[test]
    fn test_missing_message_lists_parameters() {
        assert!(MISSING_PARAMETERS_MESSAGE.contains("Missing parameters"));
        assert!(MISSING_PARAMETERS_MESSAGE.contains("'start'"));
    }
}
