//! Receipt polling for submitted transactions

use alloy::primitives::B256;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::services::signer::{EmbeddedSigner, ReceiptStatus};

/// Interval between receipt polls (ms)
pub const POLL_INTERVAL_MS: u64 = 1000;

/// Receipt polls before giving up
pub const MAX_POLL_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(POLL_INTERVAL_MS),
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }
}

/// Poll until `tx_hash` is mined successfully
///
/// A mined-but-failed receipt is `TransactionReverted`; running out of
/// attempts is `ConfirmationTimeout`, so the caller can tell "failed" from
/// "not seen yet". RPC errors while polling count as an unseen receipt.
pub async fn wait_for_receipt(
    signer: &dyn EmbeddedSigner,
    tx_hash: B256,
    policy: ConfirmationPolicy,
) -> Result<ReceiptStatus, PipelineError> {
    info!(
        tx_hash = %tx_hash,
        max_attempts = policy.max_attempts,
        interval_ms = policy.interval.as_millis(),
        "Waiting for transaction confirmation"
    );

    for attempt in 1..=policy.max_attempts {
        match signer.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) if receipt.success => {
                info!(tx_hash = %tx_hash, block = ?receipt.block_number, attempt = attempt, "Transaction confirmed");
                return Ok(receipt);
            }
            Ok(Some(_)) => {
                warn!(tx_hash = %tx_hash, "Transaction reverted");
                return Err(PipelineError::TransactionReverted { tx_hash });
            }
            Ok(None) => {
                debug!(tx_hash = %tx_hash, attempt = attempt, "Receipt not available yet");
            }
            Err(e) => {
                warn!(tx_hash = %tx_hash, attempt = attempt, error = %e, "Receipt poll failed");
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(PipelineError::ConfirmationTimeout {
        tx_hash,
        attempts: policy.max_attempts,
    })
}
