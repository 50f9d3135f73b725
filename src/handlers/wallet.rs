use alloy::primitives::Address;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    handlers::{api_error, ApiError},
    models::{
        chain::ChainTarget,
        progress::{ChainProgress, ModuleStatus},
    },
    services::safe_provisioning::PipelineOutcome,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct SetChainRequest {
    pub chain_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct SelectSafeRequest {
    /// `None` clears the selection
    pub safe_address: Option<Address>,
}

#[derive(Debug, Serialize)]
pub struct WalletStatusResponse {
    pub active_chain: Option<ChainTarget>,
    pub selected_safe: Option<Address>,
    pub module_status: ModuleStatus,
    pub enable_progress: Option<ChainProgress>,
}

fn wallet_status(state: &AppState) -> WalletStatusResponse {
    WalletStatusResponse {
        active_chain: state.wallet.active_chain(),
        selected_safe: state.wallet.selected_safe(),
        module_status: state.wallet.module_status(),
        enable_progress: state.wallet.enable_progress(),
    }
}

/// Handler for POST /wallet/chain
pub async fn set_active_chain(
    State(state): State<AppState>,
    Json(request): Json<SetChainRequest>,
) -> Result<Json<WalletStatusResponse>, ApiError> {
    let chain = state
        .onboarding
        .chains()
        .iter()
        .find(|c| c.chain_id == request.chain_id)
        .cloned()
        .ok_or_else(|| api_error(PipelineError::UnsupportedChain(request.chain_id)))?;

    state.wallet.set_active_chain(chain).await;
    Ok(Json(wallet_status(&state)))
}

/// Handler for POST /wallet/select
///
/// The module status read is debounced; poll GET /wallet/module-status.
pub async fn select_safe(
    State(state): State<AppState>,
    Json(request): Json<SelectSafeRequest>,
) -> Result<Json<WalletStatusResponse>, ApiError> {
    match request.safe_address {
        Some(safe) => state.wallet.select_safe(safe).await.map_err(api_error)?,
        None => state.wallet.clear_selection().await,
    }
    Ok(Json(wallet_status(&state)))
}

/// Handler for GET /wallet/module-status
pub async fn get_module_status(State(state): State<AppState>) -> Json<WalletStatusResponse> {
    Json(wallet_status(&state))
}

/// Handler for POST /wallet/enable-module
pub async fn enable_module(
    State(state): State<AppState>,
) -> Result<Json<PipelineOutcome>, ApiError> {
    let outcome = state.wallet.enable_module().await.map_err(api_error)?;
    Ok(Json(outcome))
}

/// Handler for POST /wallet/retry
pub async fn retry_enable_module(
    State(state): State<AppState>,
) -> Result<Json<PipelineOutcome>, ApiError> {
    let outcome = state.wallet.retry_enable_module().await.map_err(api_error)?;
    Ok(Json(outcome))
}
