use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let defaults = state.orchestrator.defaults();
    Json(json!({
        "status": "ok",
        "top_n": defaults.top_n,
        "rrf_k": defaults.rrf_k,
        "generation": state.generator.is_some(),
    }))
}
