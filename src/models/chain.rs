//! Chain targets provisioned by onboarding
//!
//! The list of target chains depends on the deployment environment and is
//! otherwise static.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ethereum Sepolia chain ID
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Ethereum mainnet chain ID
pub const ETHEREUM_CHAIN_ID: u64 = 1;

/// Stable key of a chain target, also used in backend user record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKey {
    Testnet,
    Mainnet,
}

impl ChainKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKey::Testnet => "testnet",
            ChainKey::Mainnet => "mainnet",
        }
    }

    /// Field of the backend user record holding the safe address for this chain
    pub fn user_record_field(&self) -> String {
        format!("safe_wallet_address_{}", self.as_str())
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "testnet" => Ok(ChainKey::Testnet),
            "mainnet" => Ok(ChainKey::Mainnet),
            other => Err(format!("Unknown chain key: {}", other)),
        }
    }
}

/// One blockchain the system provisions on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTarget {
    pub chain_id: u64,
    /// Display name (e.g., "Ethereum Sepolia")
    pub name: String,
    pub key: ChainKey,
}

impl ChainTarget {
    pub fn new(chain_id: u64, name: impl Into<String>, key: ChainKey) -> Self {
        Self {
            chain_id,
            name: name.into(),
            key,
        }
    }

    pub fn sepolia() -> Self {
        Self::new(SEPOLIA_CHAIN_ID, "Ethereum Sepolia", ChainKey::Testnet)
    }

    pub fn ethereum() -> Self {
        Self::new(ETHEREUM_CHAIN_ID, "Ethereum", ChainKey::Mainnet)
    }
}

/// Deployment environment, selects the chain target list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

/// Chains that onboarding provisions in the given environment, in processing order
pub fn chain_targets(environment: Environment) -> Vec<ChainTarget> {
    match environment {
        Environment::Development => vec![ChainTarget::sepolia()],
        Environment::Production => vec![ChainTarget::sepolia(), ChainTarget::ethereum()],
    }
}
