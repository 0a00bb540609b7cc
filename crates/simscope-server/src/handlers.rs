//! REST endpoint handlers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/info` | Model name, ensemble size, declared parameters |
//! | `GET` | `/health` | Liveness probe |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use simscope_core::Model;
use simscope_types::ParamDescriptor;

use crate::state::AppState;

/// Response body of `GET /api/info`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Display name of the model.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Instances per session.
    pub n_sims: usize,
    /// Declared parameters with their defaults.
    pub params: Vec<ParamDescriptor>,
    /// Open `WebSocket` sessions.
    pub active_sessions: usize,
}

/// Describe the served model.
pub async fn get_info<M: Model>(State(state): State<Arc<AppState<M>>>) -> Json<ModelInfo> {
    Json(ModelInfo {
        name: state.name.clone(),
        description: state.description.clone(),
        n_sims: state.n_sims(),
        params: state.registry().describe(),
        active_sessions: state.active_sessions(),
    })
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
