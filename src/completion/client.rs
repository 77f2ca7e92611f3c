//! Completion client: default resolution, delta filtering, and pacing on top
//! of a [`CompletionBackend`].
//!
//! Upstream failures never escape as errors from here. Streams end with at
//! most one `Err` item and [`get_response`](CompletionClient::get_response)
//! returns the error value; [`render`] turns either into the in-band
//! diagnostic text the relay sends to clients.

use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::completion::backend::{
    ChatMessage, CompletionBackend, Delta, DeltaStream, UpstreamError, UpstreamRequest,
};

/// Prefix of the diagnostic text that replaces content when upstream fails.
pub const ERROR_PREFIX: &str = "Ошибка: ";

/// Sampling temperature used when a request does not set one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Process-wide generation defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDefaults {
    pub model: String,
    pub max_tokens: u32,
}

/// Per-request generation overrides. `None` falls back to the defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Collapse a delta or completion result into client-visible text.
pub fn render(result: Result<String, UpstreamError>) -> String {
    match result {
        Ok(text) => text,
        Err(e) => format!("{ERROR_PREFIX}{e}"),
    }
}

#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    defaults: GenerationDefaults,
    pacing: Duration,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, defaults: GenerationDefaults) -> Self {
        Self {
            backend,
            defaults,
            pacing: Duration::ZERO,
        }
    }

    /// Delay between consecutive fragments; the first one is never held back.
    /// Zero disables pacing.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn defaults(&self) -> &GenerationDefaults {
        &self.defaults
    }

    /// Build the upstream call, filling in anything the request left out.
    pub fn resolve(
        &self,
        messages: Vec<ChatMessage>,
        overrides: Overrides,
        stream: bool,
    ) -> UpstreamRequest {
        UpstreamRequest {
            model: overrides
                .model
                .filter(|model| !model.is_empty())
                .unwrap_or_else(|| self.defaults.model.clone()),
            messages,
            stream,
            max_tokens: overrides
                .max_tokens
                .filter(|&n| n > 0)
                .unwrap_or(self.defaults.max_tokens),
            temperature: overrides.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        }
    }

    /// Stream non-empty text fragments in upstream order.
    ///
    /// Nothing is sent upstream until the returned stream is first polled. A
    /// failure at setup or mid-stream becomes the final `Err` item.
    pub fn stream_completion(
        &self,
        messages: Vec<ChatMessage>,
        overrides: Overrides,
    ) -> DeltaStream {
        let request = self.resolve(messages, overrides, true);
        let backend = self.backend.clone();
        let pacing = self.pacing;

        let opened = stream::once(async move {
            debug!(
                model = %request.model,
                max_tokens = request.max_tokens,
                "Starting upstream stream"
            );
            backend.stream(request).await
        });

        opened
            .flat_map(|opened| match opened {
                Ok(deltas) => deltas,
                Err(e) => stream::once(future::ready(Err(e))).boxed(),
            })
            .filter(|delta| future::ready(!matches!(delta, Ok(text) if text.is_empty())))
            .scan(false, |failed, delta: Delta| {
                if *failed {
                    return future::ready(None);
                }
                if let Err(e) = &delta {
                    warn!(error = %e, "Upstream stream failed");
                    *failed = true;
                }
                future::ready(Some(delta))
            })
            .enumerate()
            .then(move |(index, delta)| async move {
                if index > 0 && delta.is_ok() && !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
                delta
            })
            .boxed()
    }

    /// Run a non-streaming completion.
    pub async fn get_response(
        &self,
        messages: Vec<ChatMessage>,
        overrides: Overrides,
    ) -> Result<String, UpstreamError> {
        let request = self.resolve(messages, overrides, false);
        debug!(
            model = %request.model,
            max_tokens = request.max_tokens,
            "Requesting upstream completion"
        );

        let result = self.backend.complete(request).await;
        if let Err(e) = &result {
            warn!(error = %e, "Upstream completion failed");
        }
        result
    }
}
