//! Error types shared by the provisioning and swap pipelines
//!
//! Collaborator errors (`SignerError`, `BackendError`) are folded into
//! `PipelineError` at the pipeline boundary, so orchestrators and handlers
//! only ever deal with one structured type.

use alloy::primitives::{Address, B256};
use serde::Serialize;

/// Coarse classification used by callers to decide how to recover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The user declined a signature prompt; only an explicit retry helps
    UserDeclined,
    /// Wrong account or missing credentials
    Authorization,
    /// Network or RPC failure, safe to retry
    Transient,
    /// Detected before any write was attempted
    InsufficientFunds,
    /// Confirmation polling ran out of attempts
    Timeout,
    /// Chain or deployment misconfiguration
    Configuration,
    /// Another run already holds the pipeline
    Conflict,
    /// Caller supplied an unusable request or invoked a step out of order
    InvalidRequest,
    /// The operation failed on-chain or at the backend
    Failed,
}

/// Errors reported by an embedded signer
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignerError {
    #[error("User rejected the request")]
    UserRejected,
    #[error("Signer RPC error: {0}")]
    Rpc(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Signer is connected to chain {actual}, expected {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
    #[error("Invalid signer config: {0}")]
    InvalidConfig(String),
}

impl SignerError {
    /// EIP-1193 code for "user rejected request"
    pub const USER_REJECTED_CODE: i64 = 4001;

    /// Map a JSON-RPC error code returned by a wallet into a signer error
    pub fn from_rpc_code(code: i64, message: impl Into<String>) -> Self {
        if code == Self::USER_REJECTED_CODE {
            SignerError::UserRejected
        } else {
            SignerError::Rpc(format!("{} (code {})", message.into(), code))
        }
    }
}

/// Errors reported by the relayer and swap backends
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::InvalidResponse(e.to_string())
        } else {
            BackendError::Request(e.to_string())
        }
    }
}

/// Structured failure of a pipeline step
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Signature request was rejected by the user")]
    UserRejected,
    #[error("Connected account {account} is not an owner of safe {safe}")]
    NotOwner { account: Address, safe: Address },
    #[error("Not authorized: {0}")]
    Unauthorized(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{operation} failed after {attempts} attempts: {message}")]
    ReadFailed {
        operation: String,
        attempts: u32,
        message: String,
    },
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(u64),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Insufficient {symbol} balance: have {held}, need {required}")]
    InsufficientBalance {
        symbol: String,
        held: String,
        required: String,
    },
    #[error("Transaction {tx_hash} failed on-chain")]
    TransactionReverted { tx_hash: B256 },
    #[error("Transaction {tx_hash} not confirmed after {attempts} attempts")]
    ConfirmationTimeout { tx_hash: B256, attempts: u32 },
    #[error("No signed transaction available, sign before submitting")]
    MissingSignature,
    #[error("Signed transaction targets safe {signed}, but submit targets {target}")]
    StaleSignature { signed: Address, target: Address },
    #[error("No safe wallet selected")]
    MissingSafe,
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Onboarding is already running")]
    AlreadyRunning,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Signing failed: {0}")]
    Signing(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UserRejected => ErrorKind::UserDeclined,
            PipelineError::NotOwner { .. } | PipelineError::Unauthorized(_) => {
                ErrorKind::Authorization
            }
            PipelineError::Network(_) | PipelineError::ReadFailed { .. } => ErrorKind::Transient,
            PipelineError::UnsupportedChain(_) | PipelineError::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            PipelineError::InsufficientBalance { .. } => ErrorKind::InsufficientFunds,
            PipelineError::ConfirmationTimeout { .. } => ErrorKind::Timeout,
            PipelineError::AlreadyRunning => ErrorKind::Conflict,
            PipelineError::MissingSignature
            | PipelineError::StaleSignature { .. }
            | PipelineError::MissingSafe
            | PipelineError::InvalidState(_)
            | PipelineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PipelineError::TransactionReverted { .. }
            | PipelineError::Backend(_)
            | PipelineError::Signing(_) => ErrorKind::Failed,
        }
    }

    /// Whether re-running the same step without user action may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Timeout)
    }
}

impl From<SignerError> for PipelineError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::UserRejected => PipelineError::UserRejected,
            SignerError::Rpc(msg) => PipelineError::Network(msg),
            SignerError::Signing(msg) => PipelineError::Signing(msg),
            SignerError::ChainMismatch { actual, .. } => PipelineError::UnsupportedChain(actual),
            SignerError::InvalidConfig(msg) => PipelineError::InvalidConfig(msg),
        }
    }
}

impl From<BackendError> for PipelineError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Request(msg) => PipelineError::Network(msg),
            BackendError::Status { status, body } if status == 401 || status == 403 => {
                PipelineError::Unauthorized(body)
            }
            BackendError::Status { status, body } if status >= 500 => {
                PipelineError::Network(format!("backend returned {}: {}", status, body))
            }
            BackendError::Status { status, body } => {
                PipelineError::Backend(format!("{}: {}", status, body))
            }
            BackendError::InvalidResponse(msg) => PipelineError::Backend(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejection_code_maps_to_user_rejected() {
        let err = SignerError::from_rpc_code(4001, "User denied");
        assert!(matches!(err, SignerError::UserRejected));

        let err: PipelineError = SignerError::from_rpc_code(-32000, "nonce too low").into();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("nonce too low"));
    }

    #[test]
    fn test_backend_status_classification() {
        let unauthorized: PipelineError = BackendError::Status {
            status: 401,
            body: "bad token".to_string(),
        }
        .into();
        assert_eq!(unauthorized.kind(), ErrorKind::Authorization);
        assert!(!unauthorized.is_retryable());

        let unavailable: PipelineError = BackendError::Status {
            status: 503,
            body: "down".to_string(),
        }
        .into();
        assert!(unavailable.is_retryable());

        let rejected: PipelineError = BackendError::Status {
            status: 422,
            body: "invalid signatures".to_string(),
        }
        .into();
        assert_eq!(rejected.kind(), ErrorKind::Failed);
    }

    #[test]
    fn test_insufficient_balance_message() {
        let err = PipelineError::InsufficientBalance {
            symbol: "USDC".to_string(),
            held: "5".to_string(),
            required: "10.5".to_string(),
        };
        assert_eq!(err.to_string(), "Insufficient USDC balance: have 5, need 10.5");
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }
}
