//! Session server for Simscope.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`): one interactive, rewindable
//!   session per connection, speaking the protocol in
//!   [`simscope_types::protocol`]
//! - **REST endpoints** for model metadata (`/api/info`) and liveness
//!   (`/health`)
//! - an optional **static file fallback** for the browser client
//!
//! # Architecture
//!
//! Every connection owns its engine outright. A session actor
//! ([`session::run_session`]) drains a bounded inbox one message at a
//! time and runs each engine operation on the blocking pool. Nothing
//! mutable is shared between connections except an open-session counter
//! in [`AppState`].

pub mod handlers;
pub mod router;
pub mod server;
pub mod session;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, serve, start_server};
pub use state::AppState;
