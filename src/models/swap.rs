//! Swap execution request/response models
//!
//! Typed subset of what the editor attaches to a swap node, plus the swap
//! backend's quote and build-tx payloads.

use alloy::primitives::{utils, Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default slippage tolerance in basis points (0.5%)
pub const DEFAULT_SLIPPAGE_BPS: u32 = 50;

/// Token side of a swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Parameters of one swap, as edited by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Swap provider identifier understood by the swap backend (e.g., "uniswap")
    pub provider: String,
    pub chain_id: u64,
    pub token_in: TokenInfo,
    pub token_out: TokenInfo,
    /// Amount of `token_in` in base units
    pub amount_in: U256,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Router contract that spends `token_in`
    pub router: Address,
}

fn default_slippage_bps() -> u32 {
    DEFAULT_SLIPPAGE_BPS
}

/// How much allowance the approval step grants the router
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPolicy {
    /// Approve `U256::MAX` so later swaps skip approval
    #[default]
    Unlimited,
    /// Approve exactly the swap amount
    Exact,
}

impl ApprovalPolicy {
    pub fn approval_amount(&self, amount_in: U256) -> U256 {
        match self {
            ApprovalPolicy::Unlimited => U256::MAX,
            ApprovalPolicy::Exact => amount_in,
        }
    }
}

/// Current step of a swap execution attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwapStep {
    #[default]
    Idle,
    CheckingBalance,
    CheckingAllowance,
    Approving,
    WaitingApproval,
    BuildingTx,
    Swapping,
    Done,
}

impl SwapStep {
    /// Progress text shown while the step is active
    pub fn description(&self) -> &'static str {
        match self {
            SwapStep::Idle => "Ready",
            SwapStep::CheckingBalance => "Checking balance...",
            SwapStep::CheckingAllowance => "Checking allowance...",
            SwapStep::Approving => "Approve token spending in your wallet...",
            SwapStep::WaitingApproval => "Waiting for approval confirmation...",
            SwapStep::BuildingTx => "Building swap transaction...",
            SwapStep::Swapping => "Confirm the swap in your wallet...",
            SwapStep::Done => "Swap submitted",
        }
    }
}

/// Lifecycle of one swap attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapExecutionState {
    /// Identifies the attempt owning this state; `None` before the first execute
    pub attempt_id: Option<Uuid>,
    pub step: SwapStep,
    pub tx_hash: Option<B256>,
    pub approval_tx_hash: Option<B256>,
    pub error: Option<String>,
    pub success: bool,
    pub executed_at: Option<DateTime<Utc>>,
}

impl SwapExecutionState {
    pub fn started(attempt_id: Uuid) -> Self {
        Self {
            attempt_id: Some(attempt_id),
            ..Default::default()
        }
    }
}

/// Execution receipt of a submitted swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub tx_hash: B256,
    pub approval_tx_hash: Option<B256>,
    pub executed_at: DateTime<Utc>,
}

/// Body of POST /swap/quote/{provider}/{chain}
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub token_in: Address,
    pub token_out: Address,
    /// Decimal string in base units
    pub amount_in: String,
    pub slippage_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    /// Decimal string in `token_out` base units
    pub amount_out: String,
    pub price_impact: f64,
    pub gas_estimate: String,
}

/// Body of POST /swap/build-tx/{provider}/{chain}
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTxRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: String,
    pub slippage_bps: u32,
    pub sender: Address,
    /// Approval already proved spend authority, so the backend skips simulation
    pub skip_simulation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTxResponse {
    pub transaction: BuiltTransaction,
}

/// Ready-to-sign transaction returned by the swap backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltTransaction {
    pub to: Address,
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub gas: Option<U256>,
}

impl QuoteRequest {
    pub fn from_swap(request: &SwapRequest) -> Self {
        Self {
            token_in: request.token_in.address,
            token_out: request.token_out.address,
            amount_in: request.amount_in.to_string(),
            slippage_bps: request.slippage_bps,
        }
    }
}

impl BuildTxRequest {
    pub fn from_swap(request: &SwapRequest, sender: Address) -> Self {
        Self {
            token_in: request.token_in.address,
            token_out: request.token_out.address,
            amount_in: request.amount_in.to_string(),
            slippage_bps: request.slippage_bps,
            sender,
            skip_simulation: true,
        }
    }
}

/// Format a base-unit amount with the token's decimals (e.g., 1500000 @ 6 -> "1.5")
pub fn format_units(amount: U256, decimals: u8) -> String {
    let raw = u128::try_from(amount).ok().and_then(|v| i128::try_from(v).ok());
    if let Some(raw) = raw {
        if let Ok(value) = Decimal::try_from_i128_with_scale(raw, u32::from(decimals)) {
            return value.normalize().to_string();
        }
    }

    // Beyond Decimal's 96-bit mantissa
    match utils::format_units(amount, decimals) {
        Ok(formatted) if formatted.contains('.') => formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        Ok(formatted) => formatted,
        Err(_) => amount.to_string(),
    }
}
