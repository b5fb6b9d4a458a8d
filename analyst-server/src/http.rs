//! Analyst HTTP API
//!
//! Axum server exposing the question pipeline, schema, history and chart
//! files, plus the embedded conversational page at `/`.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`, so the logic is testable
//! without axum dispatch.
//!
//! Endpoints:
//! - GET    /                    : web page
//! - GET    /health              : database and model status
//! - GET    /version             : server version info
//! - GET    /schema              : live table layout
//! - POST   /ask                 : run a question through the pipeline
//! - GET    /history/:session_id : conversation history and stats
//! - DELETE /history/:session_id : forget a conversation
//! - GET    /charts/:name        : rendered SVG chart

use std::sync::Arc;

use analyst_core::api::{AnalystRequest, AnalystResponse};
use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::router::{handle_request, AppContext};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Build the Axum router with all endpoints
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/schema", get(schema_handler))
        .route("/ask", post(ask_handler))
        .route(
            "/history/:session_id",
            get(history_handler).delete(clear_history_handler),
        )
        .route("/charts/:name", get(chart_handler))
        .with_state(ctx)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    ctx: Arc<AppContext>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.http.host, ctx.config.http.port);

    let app = build_router(ctx);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Analyst HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct AskRequest {
    pub question: Option<String>,
    pub session_id: Option<Uuid>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }

    fn body(msg: impl Into<String>) -> serde_json::Value {
        serde_json::to_value(Self::new(msg)).unwrap_or_default()
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check. 503 when the database does not answer.
pub async fn health_inner(ctx: &AppContext) -> (StatusCode, serde_json::Value) {
    match response_to_http(handle_request(AnalystRequest::Health, ctx).await) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e,
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": analyst_core::api::PROTOCOL,
    })
}

pub async fn schema_inner(ctx: &AppContext) -> (StatusCode, serde_json::Value) {
    dispatch(AnalystRequest::Schema, ctx).await
}

/// Inner ask: validates the question and runs the pipeline.
pub async fn ask_inner(ctx: &AppContext, req: AskRequest) -> (StatusCode, serde_json::Value) {
    let question = match req.question {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                ErrorResponse::body("question field is required"),
            );
        }
    };

    dispatch(
        AnalystRequest::Ask {
            question,
            session_id: req.session_id,
        },
        ctx,
    )
    .await
}

pub async fn history_inner(ctx: &AppContext, session_id: Uuid) -> (StatusCode, serde_json::Value) {
    dispatch(AnalystRequest::History { session_id }, ctx).await
}

pub async fn clear_history_inner(
    ctx: &AppContext,
    session_id: Uuid,
) -> (StatusCode, serde_json::Value) {
    dispatch(AnalystRequest::ClearHistory { session_id }, ctx).await
}

/// Inner chart lookup. `Ok(None)` means no such chart.
pub async fn chart_inner(ctx: &AppContext, name: &str) -> Result<Option<String>> {
    Ok(ctx.workflow.store().read(name).await?)
}

// ============================================================================
// Axum handler wrappers (thin, delegating to inner functions)
// ============================================================================

pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let (status, body) = health_inner(&ctx).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn schema_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let (status, body) = schema_inner(&ctx).await;
    (status, Json(body))
}

pub async fn ask_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<AskRequest>,
) -> impl IntoResponse {
    let (status, body) = ask_inner(&ctx, req).await;
    (status, Json(body))
}

pub async fn history_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = history_inner(&ctx, session_id).await;
    (status, Json(body))
}

pub async fn clear_history_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = clear_history_inner(&ctx, session_id).await;
    (status, Json(body))
}

pub async fn chart_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(name): Path<String>,
) -> Response {
    match chart_inner(&ctx, &name).await {
        Ok(Some(svg)) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("chart not found: {}", name))),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(chart = %name, error = %e, "Failed to read chart");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal error")),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Route a request through the dispatcher and map the envelope to HTTP.
async fn dispatch(request: AnalystRequest, ctx: &AppContext) -> (StatusCode, serde_json::Value) {
    match response_to_http(handle_request(request, ctx).await) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => {
            tracing::error!(error = %e, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::body(e))
        }
    }
}

/// Convert an `AnalystResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: AnalystResponse) -> std::result::Result<serde_json::Value, String> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
