//! Runtime configuration loaded from the environment

use alloy::primitives::Address;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::models::chain::{chain_targets, ChainTarget, Environment};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(String),
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    pub relayer_url: String,
    pub relayer_api_token: String,
    pub swap_api_url: String,
    /// Provider used when a swap request does not name one
    pub swap_provider: String,
    pub signer_private_key: String,
    /// RPC endpoint per target chain ID
    pub rpc_urls: BTreeMap<u64, String>,
    pub permission_module: Address,
    pub bind_addr: SocketAddr,
    pub http_timeout: Duration,
}

impl Config {
    /// Load from process environment (call `dotenvy::dotenv()` first)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::Missing(key.to_string()))
        };

        let environment = match lookup("SAFEFLOW_ENV") {
            Some(value) => value.parse::<Environment>().map_err(|e| ConfigError::Invalid {
                key: "SAFEFLOW_ENV".to_string(),
                message: e,
            })?,
            None => Environment::Development,
        };

        let mut rpc_urls = BTreeMap::new();
        for chain in chain_targets(environment) {
            let key = format!("RPC_URL_{}", chain.chain_id);
            rpc_urls.insert(chain.chain_id, required(&key)?);
        }

        let signer_private_key = required("SIGNER_PRIVATE_KEY")?;
        validate_private_key(&signer_private_key)?;

        let module = required("PERMISSION_MODULE_ADDRESS")?;
        let permission_module = module.parse::<Address>().map_err(|e| ConfigError::Invalid {
            key: "PERMISSION_MODULE_ADDRESS".to_string(),
            message: e.to_string(),
        })?;

        let bind = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            key: "BIND_ADDR".to_string(),
            message: e.to_string(),
        })?;

        let http_timeout = match lookup("HTTP_TIMEOUT_SECS") {
            Some(value) => value.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "HTTP_TIMEOUT_SECS".to_string(),
                message: e.to_string(),
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            environment,
            relayer_url: required("RELAYER_URL")?,
            relayer_api_token: required("RELAYER_API_TOKEN")?,
            swap_api_url: required("SWAP_API_URL")?,
            swap_provider: lookup("SWAP_PROVIDER").unwrap_or_else(|| "uniswap".to_string()),
            signer_private_key,
            rpc_urls,
            permission_module,
            bind_addr,
            http_timeout: Duration::from_secs(http_timeout),
        })
    }

    /// Chains onboarded in the configured environment
    pub fn chain_targets(&self) -> Vec<ChainTarget> {
        chain_targets(self.environment)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("relayer_url", &self.relayer_url)
            .field("relayer_api_token", &"<redacted>")
            .field("swap_api_url", &self.swap_api_url)
            .field("swap_provider", &self.swap_provider)
            .field("signer_private_key", &"<redacted>")
            .field("rpc_urls", &self.rpc_urls)
            .field("permission_module", &self.permission_module)
            .field("bind_addr", &self.bind_addr)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

fn validate_private_key(key: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        key: "SIGNER_PRIVATE_KEY".to_string(),
        message,
    };
    let bytes = hex::decode(key.trim().trim_start_matches("0x"))
        .map_err(|e| invalid(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(invalid(format!("expected 32 bytes, got {}", bytes.len())));
    }
    Ok(())
}
