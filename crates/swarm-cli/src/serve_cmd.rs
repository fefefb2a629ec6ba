use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use swarm_core::config::API_KEY_ENV;
use swarm_core::orchestrator::validate_request;
use swarm_core::{OrchestrateError, Orchestrator};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl From<OrchestrateError> for AppError {
    fn from(err: OrchestrateError) -> Self {
        let message = match std::error::Error::source(&err) {
            Some(source) => format!("{err}: {source}"),
            None => err.to_string(),
        };
        if err.is_invalid_request() {
            Self::bad_request(message)
        } else {
            tracing::error!(error = %message, "run failed before any agent started");
            Self::internal(message)
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OrchestrateRequest {
    #[serde(default)]
    pub prompt: String,
    /// Kept loose so a non-integer is a validation error, not a decode error.
    #[serde(default = "default_agent_count")]
    pub agent_count: Value,
}

fn default_agent_count() -> Value {
    json!(1)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/orchestrate", post(orchestrate))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(orchestrator: Arc<Orchestrator>, bind: &str, port: u16) -> Result<()> {
    let app = build_router(orchestrator);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("swarm serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("swarm serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn orchestrate(
    State(orchestrator): State<Arc<Orchestrator>>,
    payload: Result<Json<OrchestrateRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let prompt = request.prompt.trim();
    let max = orchestrator.config().max_agents;

    let requested = request.agent_count.as_i64().ok_or_else(|| {
        AppError::bad_request(format!("agent_count must be an integer between 1 and {max}"))
    })?;
    let agent_count = validate_request(prompt, requested, max)?;

    let report = orchestrator.orchestrate(prompt, agent_count).await?;
    Ok(Json(json!({
        "status": "completed",
        "run": report.run,
        "summary": report.summary,
        "results": report.results,
    })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn ready(State(orchestrator): State<Arc<Orchestrator>>) -> axum::response::Response {
    if orchestrator.config().api_key.is_some() {
        Json(json!({ "status": "ready" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": format!("{API_KEY_ENV} not set") })),
        )
            .into_response()
    }
}
