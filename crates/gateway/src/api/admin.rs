//! Health probe — used by process supervisors and uptime checks.

use axum::extract::State;
use axum::response::Json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "llm_providers": state.llm.list_providers(),
        "triggers": state.triggers.list().len(),
    }))
}
