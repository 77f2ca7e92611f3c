//! SSE (Server-Sent Events) framing for relayed completions.
//!
//! Every fragment becomes one `StreamChunk` event, and exactly one terminal
//! chunk follows once the fragment stream is exhausted, whether it ended
//! normally or with an upstream error.

use axum::response::sse::Event;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::info;

use crate::completion::backend::Delta;
use crate::completion::client::render;

/// Wire-level unit of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    pub is_final: bool,
}

impl StreamChunk {
    pub fn content(content: String) -> Self {
        Self {
            content,
            is_final: false,
        }
    }

    pub fn terminal() -> Self {
        Self {
            content: String::new(),
            is_final: true,
        }
    }

    fn to_event(&self) -> Event {
        let data = serde_json::to_string(self).unwrap_or_default();
        Event::default().data(data)
    }
}

/// Convert completion fragments into an SSE stream ending in a terminal chunk.
pub fn fragments_to_sse_stream<S>(
    fragments: S,
    request_id: String,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>>
where
    S: Stream<Item = Delta> + Send + 'static,
{
    let mut sent = 0usize;

    fragments
        .map(|delta| StreamChunk::content(render(delta)))
        // Append the terminal chunk after all fragments.
        .chain(tokio_stream::once(StreamChunk::terminal()))
        .map(move |chunk| {
            if chunk.is_final {
                info!(request_id = request_id.as_str(), fragments = sent, "Stream complete");
            } else {
                sent += 1;
            }
            Ok(chunk.to_event())
        })
}
