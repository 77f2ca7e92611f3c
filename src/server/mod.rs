//! HTTP server exposing the chat relay.
//!
//! - [`chat_api`]: Request/response types, route handlers, router
//! - [`streaming`]: SSE framing of relayed fragments
//! - [`error`]: HTTP error responses

pub mod chat_api;
pub mod error;
pub mod streaming;
