//! JSON HTTP server.
//!
//! Exposes the query pipeline over a small API suitable for whatever
//! front-end sits on top (the UI itself is out of scope here).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question; body `{"question": "..."}` |
//! | `POST` | `/reindex` | Rebuild the index from the campaigns file and swap it in |
//! | `GET`  | `/health` | Version and active chunk count |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500). Query failures do
//! not use the error contract at all — they surface as degraded answers
//! with HTTP 200.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::pipeline::Pipeline;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Start the HTTP server on `bind`, serving the given pipeline.
///
/// Runs until the process is terminated.
pub async fn run_server(pipeline: Arc<Pipeline>, bind: &str) -> anyhow::Result<()> {
    let state = AppState { pipeline };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ask", post(ask_handler))
        .route("/reindex", post(reindex_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = serde_json::json!({
        "error": { "code": code, "message": message }
    });
    (status, Json(body)).into_response()
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn ask_handler(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Response {
    if req.question.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "question must not be empty",
        );
    }

    let answer = state.pipeline.ask(&req.question).await;
    Json(answer).into_response()
}

async fn reindex_handler(State(state): State<AppState>) -> Response {
    match state.pipeline.reindex().await {
        Ok(stats) => Json(serde_json::json!({ "ok": true, "stats": stats })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", &e.to_string()),
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "chunks": state.pipeline.chunk_count(),
    }))
    .into_response()
}
