use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    error::PipelineError,
    handlers::{api_error, ApiError},
    models::{chain::ChainKey, progress::ChainProgress},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct ChainProgressEntry {
    pub key: ChainKey,
    pub chain_id: u64,
    pub name: String,
    pub progress: ChainProgress,
}

#[derive(Debug, Serialize)]
pub struct OnboardingProgressResponse {
    pub needs_onboarding: bool,
    pub running: bool,
    pub chains: Vec<ChainProgressEntry>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub needs_onboarding: bool,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
    pub chain: Option<ChainKey>,
}

/// Handler for GET /onboarding/progress
pub async fn get_progress(State(state): State<AppState>) -> Json<OnboardingProgressResponse> {
    let progress = state.onboarding.progress();
    let chains = state
        .onboarding
        .chains()
        .iter()
        .map(|chain| ChainProgressEntry {
            key: chain.key,
            chain_id: chain.chain_id,
            name: chain.name.clone(),
            progress: progress.get(&chain.key).cloned().unwrap_or_default(),
        })
        .collect();

    Json(OnboardingProgressResponse {
        needs_onboarding: state.onboarding.needs_onboarding(),
        running: state.onboarding.is_running(),
        chains,
    })
}

/// Handler for POST /onboarding/check
pub async fn check_onboarding(
    State(state): State<AppState>,
) -> Result<Json<CheckResponse>, ApiError> {
    let needs_onboarding = state
        .onboarding
        .check_needs_onboarding(state.user_address)
        .await
        .map_err(api_error)?;

    Ok(Json(CheckResponse { needs_onboarding }))
}

/// Handler for POST /onboarding/start
///
/// Runs in the background; progress is polled via GET /onboarding/progress.
pub async fn start_onboarding(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    if state.onboarding.is_running() {
        return Err(api_error(PipelineError::AlreadyRunning));
    }

    let orchestrator = Arc::clone(&state.onboarding);
    tokio::spawn(async move {
        match orchestrator.start_onboarding().await {
            Ok(summary) => tracing::info!(
                completed = summary.completed.len(),
                failed = summary.failed.len(),
                "Background onboarding finished"
            ),
            Err(e) => tracing::warn!(error = %e, "Background onboarding did not run"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            chain: None,
        }),
    ))
}

/// Handler for POST /onboarding/retry/{key}
pub async fn retry_chain(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let key: ChainKey = key
        .parse()
        .map_err(|e: String| api_error(PipelineError::InvalidRequest(e)))?;

    if !state.onboarding.chains().iter().any(|c| c.key == key) {
        return Err(api_error(PipelineError::InvalidRequest(format!(
            "Chain {} is not configured",
            key
        ))));
    }
    if state.onboarding.is_running() {
        return Err(api_error(PipelineError::AlreadyRunning));
    }

    let orchestrator = Arc::clone(&state.onboarding);
    tokio::spawn(async move {
        if let Err(e) = orchestrator.retry_chain(key).await {
            tracing::warn!(chain = %key, error = %e, "Chain retry failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            chain: Some(key),
        }),
    ))
}
