//! Completion layer: everything between the relay endpoints and the upstream
//! chat-completion provider.
//!
//! - [`backend`]: The [`CompletionBackend`](backend::CompletionBackend) seam and wire types
//! - [`client`]: Default resolution, delta filtering, pacing, error rendering
//! - [`openai`]: OpenAI-compatible HTTP backend and upstream event-stream decoding

pub mod backend;
pub mod client;
pub mod openai;
