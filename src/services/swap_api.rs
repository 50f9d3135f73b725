//! Swap pricing/build backend client

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

use crate::error::BackendError;
use crate::models::swap::{BuildTxRequest, BuildTxResponse, BuiltTransaction, QuoteRequest, SwapQuote};

#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn quote(
        &self,
        provider: &str,
        chain_id: u64,
        request: &QuoteRequest,
    ) -> Result<SwapQuote, BackendError>;

    /// Ready-to-sign swap transaction for the given parameters
    async fn build_tx(
        &self,
        provider: &str,
        chain_id: u64,
        request: &BuildTxRequest,
    ) -> Result<BuiltTransaction, BackendError>;
}

#[derive(Clone)]
pub struct SwapApiClient {
    client: Client,
    base_url: String,
}

impl SwapApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SwapApi for SwapApiClient {
    async fn quote(
        &self,
        provider: &str,
        chain_id: u64,
        request: &QuoteRequest,
    ) -> Result<SwapQuote, BackendError> {
        let url = format!("{}/swap/quote/{}/{}", self.base_url, provider, chain_id);

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let quote: SwapQuote = response.json().await?;
        info!(
            provider = %provider,
            chain_id = chain_id,
            amount_out = %quote.amount_out,
            price_impact = quote.price_impact,
            "Fetched swap quote"
        );
        Ok(quote)
    }

    async fn build_tx(
        &self,
        provider: &str,
        chain_id: u64,
        request: &BuildTxRequest,
    ) -> Result<BuiltTransaction, BackendError> {
        let url = format!("{}/swap/build-tx/{}/{}", self.base_url, provider, chain_id);

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: BuildTxResponse = response.json().await?;
        info!(
            provider = %provider,
            chain_id = chain_id,
            to = %body.transaction.to,
            "Built swap transaction"
        );
        Ok(body.transaction)
    }
}
