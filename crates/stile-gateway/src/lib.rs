//! stile-gateway — OpenAI-compatible HTTP surface for Cursor's web chat.
//!
//! Clients speak the OpenAI chat-completions API. This crate exposes that
//! surface, translates requests into the upstream web chat schema, attaches
//! the proof-of-humanity token derived by `stile-humanizer`, and re-shapes
//! the upstream SSE stream back into OpenAI chunks.
//!
//! Design goals:
//! - Reject bad requests (auth, unknown model) before paying for a token
//!   derivation.
//! - Forward streams chunk-for-chunk in upstream order; never fabricate a
//!   `[DONE]` after a dropped upstream connection.
//! - Pass tools and tool_choice through uninterpreted.

pub mod config;
pub mod error;
pub mod server;
pub mod streaming;
pub mod translation;
pub mod types;
pub mod upstream;

pub use config::GatewayConfig;
pub use server::{serve, AppState};
