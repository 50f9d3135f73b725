//! Relayer backend client
//!
//! The relayer deploys safes and broadcasts owner-signed Safe transactions,
//! paying gas on the user's behalf. All requests carry a bearer token.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::BackendError;
use crate::models::relay::{
    CreateSafeRequest, CreateSafeResponse, EnableModuleRequest, EnableModuleResponse, UserRecord,
};

#[async_trait]
pub trait RelayerApi: Send + Sync {
    /// Deploy (or look up) the user's safe on `chain_id`
    ///
    /// Must be idempotent: a second call returns the existing safe address.
    async fn create_safe(&self, chain_id: u64) -> Result<Address, BackendError>;

    /// Broadcast a signed `enableModule` Safe transaction, returns the execution tx hash
    async fn enable_module(&self, request: &EnableModuleRequest) -> Result<B256, BackendError>;

    async fn get_user(&self, address: Address) -> Result<UserRecord, BackendError>;
}

#[derive(Clone)]
pub struct RelayerClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl RelayerClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        })
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RelayerApi for RelayerClient {
    async fn create_safe(&self, chain_id: u64) -> Result<Address, BackendError> {
        info!(chain_id = chain_id, "Requesting safe creation from relayer");

        let url = format!("{}/relay/create-safe", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&CreateSafeRequest { chain_id })
            .send()
            .await?;

        let body: CreateSafeResponse = Self::parse(response).await?;
        info!(chain_id = chain_id, safe = %body.safe_address, "Relayer returned safe");
        Ok(body.safe_address)
    }

    async fn enable_module(&self, request: &EnableModuleRequest) -> Result<B256, BackendError> {
        info!(
            chain_id = request.chain_id,
            safe = %request.safe_address,
            nonce = %request.safe_tx_data.nonce,
            "Relaying enableModule transaction"
        );

        let url = format!("{}/relay/enable-module", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await?;

        let body: EnableModuleResponse = Self::parse(response).await?;
        info!(tx_hash = %body.tx_hash, "Relayer broadcast enableModule");
        Ok(body.tx_hash)
    }

    async fn get_user(&self, address: Address) -> Result<UserRecord, BackendError> {
        debug!(address = %address, "Fetching user record");

        let url = format!("{}/users/address/{}", self.base_url, address);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .header("accept", "application/json")
            .send()
            .await?;

        Self::parse(response).await
    }
}
