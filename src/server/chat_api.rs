//! Chat relay HTTP API.
//!
//! - POST /api/chat/stream
//! - POST /api/chat/normal
//! - GET /api/chat/health
//! - GET /api/
//! - GET / and /static/* (frontend)

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::completion::backend::ChatMessage;
use crate::completion::client::{render, CompletionClient, Overrides};
use crate::config::Config;
use crate::server::error::ApiError;
use crate::server::streaming::fragments_to_sse_stream;

/// Application state shared across handlers.
pub struct AppState {
    pub client: CompletionClient,
    pub config: Arc<Config>,
}

/// Build the axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.server.static_dir.clone();

    let chat = Router::new()
        .route("/stream", post(chat_stream))
        .route("/normal", post(chat_normal))
        .route("/health", get(health));

    Router::new()
        .nest("/api/chat", chat)
        .route("/api/", get(api_info))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CatchPanicLayer::custom(ApiError::from_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Chat request accepted by both relay routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn into_parts(self) -> (Vec<ChatMessage>, Overrides) {
        let overrides = Overrides {
            model: self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        (self.messages, overrides)
    }
}

/// Non-streaming response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Service descriptor served at `/api/`.
#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub stream_chat: &'static str,
    pub normal_chat: &'static str,
    pub health: &'static str,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn chat_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let request_id = Uuid::new_v4().to_string();

    info!(
        request_id = request_id.as_str(),
        messages = req.messages.len(),
        model = req.model.as_deref().unwrap_or(&state.client.defaults().model),
        "Streaming chat request"
    );

    let (messages, overrides) = req.into_parts();
    let fragments = state.client.stream_completion(messages, overrides);
    let stream = fragments_to_sse_stream(fragments, request_id);

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response())
}

async fn chat_normal(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload?;
    let request_id = Uuid::new_v4().to_string();

    info!(
        request_id = request_id.as_str(),
        messages = req.messages.len(),
        model = req.model.as_deref().unwrap_or(&state.client.defaults().model),
        "Chat request"
    );

    let (messages, overrides) = req.into_parts();
    let result = state.client.get_response(messages, overrides).await;
    info!(request_id = request_id.as_str(), ok = result.is_ok(), "Chat response ready");

    Ok(Json(ChatResponse {
        response: render(result),
    }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "OpenAI Chat API".to_string(),
    })
}

async fn api_info() -> Json<ApiInfo> {
    Json(ApiInfo {
        message: "OpenAI Streaming API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: Endpoints {
            stream_chat: "/api/chat/stream",
            normal_chat: "/api/chat/normal",
            health: "/api/chat/health",
        },
    })
}
