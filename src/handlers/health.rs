use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub chains: Vec<u64>,
    pub onboarding_running: bool,
}

/// Handler for GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        chains: state.onboarding.chains().iter().map(|c| c.chain_id).collect(),
        onboarding_running: state.onboarding.is_running(),
    })
}
