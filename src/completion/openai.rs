//! OpenAI-compatible chat-completion backend over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::future;
use futures::stream::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

use crate::completion::backend::{
    CompletionBackend, DeltaStream, UpstreamError, UpstreamRequest,
};
use crate::config::UpstreamConfig;

/// Sentinel payload that ends an OpenAI stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Backend talking to `{base_url}/chat/completions`.
pub struct OpenAiBackend {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl OpenAiBackend {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    fn post(&self, request: &UpstreamRequest) -> RequestBuilder {
        let builder = self.http.post(&self.endpoint).json(request);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn stream(&self, request: UpstreamRequest) -> Result<DeltaStream, UpstreamError> {
        debug!(
            model = %request.model,
            endpoint = %self.endpoint,
            "Opening upstream stream"
        );
        let response = self.post(&request).send().await?;
        let response = check_status(response).await?;
        Ok(delta_stream(response.bytes_stream()))
    }

    async fn complete(&self, request: UpstreamRequest) -> Result<String, UpstreamError> {
        debug!(model = %request.model, endpoint = %self.endpoint, "Upstream completion");
        let mut builder = self.post(&request);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = check_status(builder.send().await?).await?;
        let completion: Completion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(UpstreamError::EmptyCompletion)
    }
}

// ─── Wire types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turn a non-2xx upstream response into [`UpstreamError::Api`].
async fn check_status(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body,
    };
    Err(UpstreamError::Api {
        status: status.as_u16(),
        message,
    })
}

// ─── Streaming ─────────────────────────────────────────────────────────────

/// What one upstream SSE event means for the delta stream.
enum Payload {
    Delta(String),
    Skip,
    Done,
    Failed(UpstreamError),
}

impl From<EventStreamError<reqwest::Error>> for UpstreamError {
    fn from(err: EventStreamError<reqwest::Error>) -> Self {
        match err {
            EventStreamError::Transport(e) => UpstreamError::Transport(e),
            other => UpstreamError::Stream(other.to_string()),
        }
    }
}

/// Interpret the `data` of one upstream event.
fn interpret(data: &str) -> Payload {
    if data == DONE_SENTINEL {
        return Payload::Done;
    }

    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(CompletionChunk {
            error: Some(error), ..
        }) => Payload::Failed(UpstreamError::Stream(error.message)),
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .map_or(Payload::Skip, Payload::Delta),
        Err(e) => Payload::Failed(e.into()),
    }
}

/// Decode an upstream SSE body into text deltas.
///
/// The stream ends after `[DONE]`, after the first error, or when the body
/// ends. The body is only polled when the consumer asks for the next delta.
pub fn delta_stream<S>(body: S) -> DeltaStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    body.eventsource()
        .map(|event| match event {
            Ok(event) if event.data.is_empty() => Payload::Skip,
            Ok(event) => interpret(&event.data),
            Err(e) => Payload::Failed(e.into()),
        })
        .take_while(|payload| future::ready(!matches!(payload, Payload::Done)))
        .scan(false, |failed, payload| {
            if *failed {
                return future::ready(None);
            }
            *failed = matches!(payload, Payload::Failed(_));
            future::ready(Some(payload))
        })
        .filter_map(|payload| {
            future::ready(match payload {
                Payload::Delta(text) => Some(Ok(text)),
                Payload::Failed(e) => Some(Err(e)),
                Payload::Skip | Payload::Done => None,
            })
        })
        .boxed()
}
