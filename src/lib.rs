// src/lib.rs

use alloy::primitives::Address;
use std::sync::Arc;

use services::{
    chain_onboarding::ChainOnboardingOrchestrator, swap_execution::SwapSession,
    wallet_selection::WalletSelectionController,
};

#[derive(Clone)]
pub struct AppState {
    pub onboarding: Arc<ChainOnboardingOrchestrator>,
    pub wallet: Arc<WalletSelectionController>,
    pub swaps: Arc<SwapSession>,
    /// Account whose backend record seeds onboarding progress
    pub user_address: Address,
    /// Provider for swap requests that do not name one
    pub swap_provider: String,
}

pub mod error;
pub mod config;

pub mod services {
    pub mod contracts;
    pub mod signer;
    pub mod retryable_reader;
    pub mod confirmation;
    pub mod relayer;
    pub mod swap_api;
    pub mod safe_provisioning;
    pub mod chain_onboarding;
    pub mod wallet_selection;
    pub mod swap_execution;
}

pub mod models;
pub mod handlers;
