//! chat-relay: streaming HTTP relay for OpenAI-compatible chat completions.
//!
//! Accepts chat requests and answers either with one aggregated completion or
//! with a server-sent-event stream that relays upstream deltas as they arrive
//! and always ends with a terminal chunk. Upstream failures are delivered
//! in-band as diagnostic text rather than as HTTP errors.

pub mod completion;
pub mod config;
pub mod server;
