//! Relayer backend request/response models
//!
//! Payloads for POST /relay/create-safe, POST /relay/enable-module and the
//! user record returned by GET /users/address/{address}.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::chain::ChainKey;

/// Safe operation type for a plain CALL
pub const SAFE_OPERATION_CALL: u8 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSafeRequest {
    pub chain_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSafeResponse {
    pub safe_address: Address,
}

/// Safe transaction fields, as hashed by the Safe's EIP-712 domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeTxData {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: u8,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
}

impl SafeTxData {
    /// A zero-value CALL from the safe to itself, with no gas refund
    pub fn self_call(safe: Address, data: Bytes, nonce: U256) -> Self {
        Self {
            to: safe,
            value: U256::ZERO,
            data,
            operation: SAFE_OPERATION_CALL,
            safe_tx_gas: U256::ZERO,
            base_gas: U256::ZERO,
            gas_price: U256::ZERO,
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
            nonce,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableModuleRequest {
    pub chain_id: u64,
    pub safe_address: Address,
    pub safe_tx_data: SafeTxData,
    /// Concatenated owner signatures
    pub signatures: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableModuleResponse {
    pub tx_hash: B256,
}

/// Backend user record
///
/// Only the per-chain safe addresses (`safe_wallet_address_<chainKey>`) are
/// interpreted; the rest of the record is kept opaque.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl UserRecord {
    pub fn safe_address(&self, key: ChainKey) -> Option<Address> {
        self.fields
            .get(&key.user_record_field())
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<Address>().ok())
    }

    pub fn with_safe_address(mut self, key: ChainKey, safe: Address) -> Self {
        self.fields.insert(
            key.user_record_field(),
            serde_json::Value::String(safe.to_string()),
        );
        self
    }
}
