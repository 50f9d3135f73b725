use alloy::primitives::{Address, U256};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    handlers::{api_error, ApiError},
    models::swap::{
        SwapExecutionState, SwapQuote, SwapReceipt, SwapRequest, TokenInfo, DEFAULT_SLIPPAGE_BPS,
    },
    AppState,
};

/// Swap parameters as sent by the editor; provider falls back to the configured default
#[derive(Debug, Deserialize)]
pub struct SwapRequestBody {
    pub provider: Option<String>,
    pub chain_id: u64,
    pub token_in: TokenInfo,
    pub token_out: TokenInfo,
    pub amount_in: U256,
    pub slippage_bps: Option<u32>,
    pub router: Address,
}

#[derive(Debug, Serialize)]
pub struct SwapStateResponse {
    pub request: Option<SwapRequest>,
    pub state: SwapExecutionState,
    pub step_description: &'static str,
}

fn swap_state(state: &AppState) -> SwapStateResponse {
    let execution = state.swaps.state();
    SwapStateResponse {
        request: state.swaps.request(),
        step_description: execution.step.description(),
        state: execution,
    }
}

/// Handler for PUT /swap/request
///
/// Changing any parameter discards the previous execution state.
pub async fn set_request(
    State(state): State<AppState>,
    Json(body): Json<SwapRequestBody>,
) -> Json<SwapStateResponse> {
    let request = SwapRequest {
        provider: body
            .provider
            .unwrap_or_else(|| state.swap_provider.clone()),
        chain_id: body.chain_id,
        token_in: body.token_in,
        token_out: body.token_out,
        amount_in: body.amount_in,
        slippage_bps: body.slippage_bps.unwrap_or(DEFAULT_SLIPPAGE_BPS),
        router: body.router,
    };
    state.swaps.set_request(request);
    Json(swap_state(&state))
}

/// Handler for POST /swap/quote
pub async fn get_quote(State(state): State<AppState>) -> Result<Json<SwapQuote>, ApiError> {
    let quote = state.swaps.quote().await.map_err(api_error)?;
    Ok(Json(quote))
}

/// Handler for POST /swap/execute
pub async fn execute_swap(State(state): State<AppState>) -> Result<Json<SwapReceipt>, ApiError> {
    let receipt = state.swaps.execute_swap().await.map_err(api_error)?;
    Ok(Json(receipt))
}

/// Handler for GET /swap/state
pub async fn get_state(State(state): State<AppState>) -> Json<SwapStateResponse> {
    Json(swap_state(&state))
}
