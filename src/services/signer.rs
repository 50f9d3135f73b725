//! Embedded signer abstraction
//!
//! The pipelines talk to the user's wallet only through [`EmbeddedSigner`]:
//! `eth_call` reads, `eth_sendTransaction`, receipt polling and Safe owner
//! signatures. [`LocalWalletSigner`] implements it with a local private key
//! and an HTTP JSON-RPC provider.

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    signers::{local::PrivateKeySigner, SignerSync},
    transports::{
        http::{Client, Http},
        TransportError,
    },
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{PipelineError, SignerError};

/// Transaction the signer is asked to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas: Option<u64>,
}

impl TransactionCall {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::ZERO,
            gas: None,
        }
    }
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptStatus {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Wallet connected to one chain
#[async_trait]
pub trait EmbeddedSigner: Send + Sync {
    /// Connected account address
    fn account(&self) -> Address;

    fn chain_id(&self) -> u64;

    /// eth_call against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, SignerError>;

    /// eth_sendTransaction from the connected account, returns the tx hash
    async fn send_transaction(&self, tx: TransactionCall) -> Result<B256, SignerError>;

    /// eth_getTransactionReceipt, `None` while the transaction is not mined
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptStatus>, SignerError>;

    /// Owner signature over a Safe transaction hash (65 bytes, r || s || v)
    ///
    /// May wait on the user for an unbounded time.
    async fn sign_hash(&self, hash: B256) -> Result<Bytes, SignerError>;
}

/// Signers keyed by chain ID
#[derive(Clone, Default)]
pub struct SignerRegistry {
    signers: HashMap<u64, Arc<dyn EmbeddedSigner>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, signer: Arc<dyn EmbeddedSigner>) {
        self.signers.insert(signer.chain_id(), signer);
    }

    pub fn with(mut self, signer: Arc<dyn EmbeddedSigner>) -> Self {
        self.insert(signer);
        self
    }

    pub fn get(&self, chain_id: u64) -> Result<Arc<dyn EmbeddedSigner>, PipelineError> {
        self.signers
            .get(&chain_id)
            .cloned()
            .ok_or(PipelineError::UnsupportedChain(chain_id))
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.signers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Embedded signer backed by a local private key
pub struct LocalWalletSigner {
    provider: RootProvider<Http<Client>>,
    wallet: EthereumWallet,
    signer: PrivateKeySigner,
    rpc_url: String,
    chain_id: u64,
}

impl LocalWalletSigner {
    /// Create a signer for `expected_chain_id`
    ///
    /// # Errors
    ///
    /// Returns error if the key or URL is invalid, the RPC is unreachable, or
    /// the RPC serves a different chain
    pub async fn new(
        rpc_url: &str,
        private_key: &str,
        expected_chain_id: u64,
    ) -> Result<Self, SignerError> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| SignerError::InvalidConfig(format!("Invalid private key: {}", e)))?;

        let wallet = EthereumWallet::from(signer.clone());

        let provider = ProviderBuilder::new().on_http(
            rpc_url
                .parse()
                .map_err(|e| SignerError::InvalidConfig(format!("Invalid RPC URL: {}", e)))?,
        );

        let chain_id = provider.get_chain_id().await.map_err(|e| {
            error!(error = %e, rpc_url = %rpc_url, "Failed to connect to RPC");
            SignerError::Rpc(format!("Connection failed: {}", e))
        })?;

        if chain_id != expected_chain_id {
            return Err(SignerError::ChainMismatch {
                expected: expected_chain_id,
                actual: chain_id,
            });
        }

        info!(
            chain_id = chain_id,
            account = %signer.address(),
            "Local wallet signer initialized"
        );

        Ok(Self {
            provider,
            wallet,
            signer,
            rpc_url: rpc_url.to_string(),
            chain_id,
        })
    }
}

fn rpc_error(context: &str, err: TransportError) -> SignerError {
    if let Some(payload) = err.as_error_resp() {
        return SignerError::from_rpc_code(payload.code, format!("{}: {}", context, payload.message));
    }
    SignerError::Rpc(format!("{}: {}", context, err))
}

#[async_trait]
impl EmbeddedSigner for LocalWalletSigner {
    fn account(&self) -> Address {
        self.signer.address()
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, SignerError> {
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        self.provider
            .call(&tx)
            .await
            .map_err(|e| rpc_error("eth_call", e))
    }

    async fn send_transaction(&self, tx: TransactionCall) -> Result<B256, SignerError> {
        // Fillers handle nonce, gas and chain ID; the wallet signs
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(self.wallet.clone())
            .on_http(
                self.rpc_url
                    .parse()
                    .map_err(|e| SignerError::InvalidConfig(format!("Invalid RPC URL: {}", e)))?,
            );

        let mut request = TransactionRequest::default()
            .with_from(self.account())
            .with_to(tx.to)
            .with_input(tx.data)
            .with_value(tx.value);
        if let Some(gas) = tx.gas {
            request = request.with_gas_limit(gas);
        }

        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| rpc_error("eth_sendTransaction", e))?;

        let tx_hash = *pending.tx_hash();
        debug!(tx_hash = %tx_hash, to = %tx.to, "Transaction sent");
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptStatus>, SignerError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| rpc_error("eth_getTransactionReceipt", e))?;

        Ok(receipt.map(|r| ReceiptStatus {
            tx_hash,
            success: r.status(),
            block_number: r.block_number,
        }))
    }

    async fn sign_hash(&self, hash: B256) -> Result<Bytes, SignerError> {
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_call_defaults() {
        let call = TransactionCall::new(Address::ZERO, vec![1u8, 2, 3]);
        assert_eq!(call.value, U256::ZERO);
        assert!(call.gas.is_none());
        assert_eq!(call.data.len(), 3);
    }

    #[test]
    fn test_unknown_chain_is_unsupported() {
        let registry = SignerRegistry::new();
        let err = registry.get(42).err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("Unsupported chain: 42"));
    }

    #[tokio::test]
    async fn test_invalid_private_key_rejected() {
        let result = LocalWalletSigner::new("http://127.0.0.1:8545", "not-a-key", 1).await;
        assert!(matches!(result, Err(SignerError::InvalidConfig(_))));
    }
}
