use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// `GET /health` — liveness probe, exit-code table's companion: this endpoint is what an
/// operator polls instead of parsing process exit codes once the service is up.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "protocolVersion": weft_core::config::PROTOCOL_VERSION,
        "wsClients": state.ws_clients.len(),
        "llmProvider": state.llm.name(),
        "storeRoot": state.store.root().display().to_string(),
    }))
}
