//! Upstream completion seam.
//!
//! [`CompletionBackend`] is the only thing the relay knows about the provider:
//! it turns an [`UpstreamRequest`] into either a stream of raw text deltas or
//! one finished completion. Errors come back typed as [`UpstreamError`]; the
//! completion client decides how they reach the caller.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One role-tagged chat message. The role is passed through unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Fully resolved chat-completion call, as sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("Error code: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Stream(String),

    #[error("malformed upstream chunk: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("upstream returned no completion content")]
    EmptyCompletion,
}

/// A single upstream text delta, or the failure that ended the stream.
pub type Delta = Result<String, UpstreamError>;

/// Lazily consumed upstream deltas. Dropping it releases the upstream connection.
pub type DeltaStream = BoxStream<'static, Delta>;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Open a streaming completion. Setup failures are returned directly;
    /// failures after the stream is open arrive as an `Err` item.
    async fn stream(&self, request: UpstreamRequest) -> Result<DeltaStream, UpstreamError>;

    /// Run a non-streaming completion and return the generated text.
    async fn complete(&self, request: UpstreamRequest) -> Result<String, UpstreamError>;
}
