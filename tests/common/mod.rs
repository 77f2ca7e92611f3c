//! Shared helpers for the relay integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use futures::stream::{self, StreamExt};
use tower::ServiceExt;

use chat_relay::completion::backend::{
    CompletionBackend, Delta, DeltaStream, UpstreamError, UpstreamRequest,
};
use chat_relay::completion::client::CompletionClient;
use chat_relay::config::{Config, GenerationConfig, ServerConfig};
use chat_relay::server::chat_api::{build_router, AppState};
use chat_relay::server::streaming::StreamChunk;

pub const TEST_MODEL: &str = "test-model";
pub const TEST_MAX_TOKENS: u32 = 256;

/// Backend that replays a fixed script and records every request.
#[derive(Default)]
pub struct ScriptedBackend {
    /// Deltas yielded by `stream`, and concatenated by `complete`.
    pub deltas: Vec<String>,
    /// Fail after the deltas with this message.
    pub fail_with: Option<String>,
    /// Fail before any delta with this message.
    pub refuse_with: Option<String>,
    /// Panic inside `complete`.
    pub panic_on_complete: bool,
    pub seen: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedBackend {
    pub fn yielding(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn then_failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn refusing(message: &str) -> Self {
        Self {
            refuse_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream(&self, request: UpstreamRequest) -> Result<DeltaStream, UpstreamError> {
        self.seen.lock().unwrap().push(request);
        if let Some(message) = &self.refuse_with {
            return Err(UpstreamError::Stream(message.clone()));
        }

        let mut items: Vec<Delta> = self.deltas.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.fail_with {
            items.push(Err(UpstreamError::Stream(message.clone())));
        }
        Ok(stream::iter(items).boxed())
    }

    async fn complete(&self, request: UpstreamRequest) -> Result<String, UpstreamError> {
        self.seen.lock().unwrap().push(request);
        if self.panic_on_complete {
            panic!("scripted panic");
        }
        if let Some(message) = self.fail_with.as_ref().or(self.refuse_with.as_ref()) {
            return Err(UpstreamError::Stream(message.clone()));
        }
        Ok(self.deltas.concat())
    }
}

/// Backend whose stream never ends. Counts how often the stream is polled
/// for a delta and records when it is dropped.
#[derive(Default)]
pub struct EndlessBackend {
    pub polls: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
}

impl EndlessBackend {
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Sets its flag when the owning stream is dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompletionBackend for EndlessBackend {
    async fn stream(&self, _request: UpstreamRequest) -> Result<DeltaStream, UpstreamError> {
        let polls = self.polls.clone();
        let guard = ReleaseGuard(self.released.clone());
        let ticks = stream::unfold((polls, guard), |(polls, guard)| async move {
            polls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Some((Ok("tick".to_string()), (polls, guard)))
        });
        Ok(ticks.boxed())
    }

    async fn complete(&self, _request: UpstreamRequest) -> Result<String, UpstreamError> {
        Err(UpstreamError::EmptyCompletion)
    }
}

pub fn test_config(static_dir: PathBuf) -> Config {
    Config {
        server: ServerConfig {
            static_dir,
            ..Default::default()
        },
        generation: GenerationConfig {
            default_model: TEST_MODEL.to_string(),
            default_max_tokens: TEST_MAX_TOKENS,
            pacing: Duration::ZERO,
        },
        ..Default::default()
    }
}

/// Relay router over an arbitrary backend.
pub fn relay_app_with(backend: Arc<dyn CompletionBackend>, config: Config) -> Router {
    let client = CompletionClient::new(backend, config.generation.defaults())
        .with_pacing(config.generation.pacing);

    build_router(Arc::new(AppState {
        client,
        config: Arc::new(config),
    }))
}

pub fn relay_app(backend: Arc<ScriptedBackend>) -> Router {
    relay_app_with(backend, test_config(PathBuf::from("does-not-exist")))
}

pub async fn post_json(app: Router, path: &str, body: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, path: &str) -> Response {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Parse an SSE body into its chunks, skipping keep-alive comments.
pub fn parse_frames(body: &str) -> Vec<StreamChunk> {
    body.split("\n\n")
        .filter(|frame| !frame.is_empty() && !frame.starts_with(':'))
        .map(|frame| {
            let data = frame
                .strip_prefix("data: ")
                .unwrap_or_else(|| panic!("not a data frame: {frame:?}"));
            serde_json::from_str(data).unwrap()
        })
        .collect()
}

pub fn content_frames(frames: &[StreamChunk]) -> Vec<&str> {
    frames
        .iter()
        .filter(|chunk| !chunk.is_final)
        .map(|chunk| chunk.content.as_str())
        .collect()
}

/// Exactly one terminal chunk, and it is last.
pub fn assert_single_terminal(frames: &[StreamChunk]) {
    let last = frames.last().expect("stream produced no frames");
    assert_eq!(last, &StreamChunk::terminal());
    assert_eq!(frames.iter().filter(|chunk| chunk.is_final).count(), 1);
}

pub const HELLO_REQUEST: &str = r#"{"messages":[{"role":"user","content":"Say hello"}]}"#;
