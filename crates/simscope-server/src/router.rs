//! Axum router construction for the session server.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use simscope_core::Model;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete router for serving model `M`.
///
/// The router includes:
/// - `GET /ws` -- one interactive session per `WebSocket` connection
/// - `GET /api/info` -- model metadata
/// - `GET /health` -- liveness probe
///
/// Any other path is served from `static_dir` when one is given, so the
/// browser client can be hosted by the same process.
pub fn build_router<M: Model>(state: Arc<AppState<M>>, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/ws", get(ws::ws_session::<M>))
        .route("/api/info", get(handlers::get_info::<M>))
        .route("/health", get(handlers::health));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
