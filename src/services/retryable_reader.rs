//! On-chain reads with exponential backoff
//!
//! Right after a safe deployment or an approval, a fresh contract or storage
//! slot may not be visible on every RPC backend yet. Reads are therefore
//! retried (default: 5 attempts, 1s base delay doubling) before the failure
//! is surfaced to the calling step.

use alloy::{
    primitives::{Address, Bytes, B256, U256},
    sol_types::SolCall,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::PipelineError;
use crate::models::relay::SafeTxData;
use crate::services::contracts::{IERC20, ISafe};
use crate::services::signer::EmbeddedSigner;

/// Maximum read attempts before failing
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay before the first retry, doubled on each following retry
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): base, 2*base, 4*base, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Reads contract state through the embedded signer's `eth_call`
#[derive(Clone)]
pub struct RetryableReader {
    signer: Arc<dyn EmbeddedSigner>,
    policy: RetryPolicy,
}

impl RetryableReader {
    pub fn new(signer: Arc<dyn EmbeddedSigner>, policy: RetryPolicy) -> Self {
        Self { signer, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Call `call` on `contract` and decode its return value
    ///
    /// Both RPC failures and undecodable responses (e.g., empty code at a
    /// not-yet-visible address) count as failed attempts.
    pub async fn read<C: SolCall>(
        &self,
        operation: &str,
        contract: Address,
        call: C,
    ) -> Result<C::Return, PipelineError> {
        let data = Bytes::from(call.abi_encode());

        self.with_retry(operation, || {
            let data = data.clone();
            async move {
                let raw = self
                    .signer
                    .call(contract, data)
                    .await
                    .map_err(|e| e.to_string())?;
                C::abi_decode_returns(&raw, true)
                    .map_err(|e| format!("Failed to decode response: {}", e))
            }
        })
        .await
    }

    pub async fn owners(&self, safe: Address) -> Result<Vec<Address>, PipelineError> {
        Ok(self.read("getOwners", safe, ISafe::getOwnersCall {}).await?._0)
    }

    pub async fn threshold(&self, safe: Address) -> Result<u64, PipelineError> {
        let threshold = self
            .read("getThreshold", safe, ISafe::getThresholdCall {})
            .await?
            ._0;
        Ok(threshold.saturating_to::<u64>())
    }

    pub async fn is_module_enabled(
        &self,
        safe: Address,
        module: Address,
    ) -> Result<bool, PipelineError> {
        Ok(self
            .read("isModuleEnabled", safe, ISafe::isModuleEnabledCall { module })
            .await?
            ._0)
    }

    pub async fn safe_nonce(&self, safe: Address) -> Result<U256, PipelineError> {
        Ok(self.read("nonce", safe, ISafe::nonceCall {}).await?._0)
    }

    /// EIP-712 digest of `tx` as computed by the safe itself
    pub async fn safe_transaction_hash(
        &self,
        safe: Address,
        tx: &SafeTxData,
    ) -> Result<B256, PipelineError> {
        let call = ISafe::getTransactionHashCall {
            to: tx.to,
            value: tx.value,
            data: tx.data.clone(),
            operation: tx.operation,
            safeTxGas: tx.safe_tx_gas,
            baseGas: tx.base_gas,
            gasPrice: tx.gas_price,
            gasToken: tx.gas_token,
            refundReceiver: tx.refund_receiver,
            _nonce: tx.nonce,
        };
        Ok(self.read("getTransactionHash", safe, call).await?._0)
    }

    pub async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, PipelineError> {
        Ok(self
            .read("allowance", token, IERC20::allowanceCall { owner, spender })
            .await?
            ._0)
    }

    pub async fn balance_of(&self, token: Address, account: Address) -> Result<U256, PipelineError> {
        Ok(self
            .read("balanceOf", token, IERC20::balanceOfCall { account })
            .await?
            ._0)
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, PipelineError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, String>>,
    {
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.policy.max_attempts {
            match f().await {
                Ok(result) => {
                    if attempts > 0 {
                        debug!(operation = %operation, attempt = attempts + 1, "Read succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    attempts += 1;
                    last_error = Some(e);

                    if attempts < self.policy.max_attempts {
                        let delay = self.policy.delay_after(attempts);
                        warn!(
                            operation = %operation,
                            attempt = attempts,
                            max_attempts = self.policy.max_attempts,
                            delay_ms = delay.as_millis(),
                            "RPC read failed, retrying..."
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!(operation = %operation, attempts = attempts, "Max retries exceeded");

        Err(PipelineError::ReadFailed {
            operation: operation.to_string(),
            attempts,
            message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}
