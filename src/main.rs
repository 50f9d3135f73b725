use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use safeflow_backend::{
    config::Config,
    handlers,
    services::{
        chain_onboarding::ChainOnboardingOrchestrator,
        relayer::RelayerClient,
        retryable_reader::RetryPolicy,
        signer::{EmbeddedSigner, LocalWalletSigner, SignerRegistry},
        swap_api::SwapApiClient,
        swap_execution::{SwapExecutionPipeline, SwapSession},
        wallet_selection::WalletSelectionController,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,safeflow_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(config = ?config, "Configuration loaded");

    // One signer per target chain; a chain whose RPC is down is left out and
    // reported as a failed wallet_create step during onboarding
    let chains = config.chain_targets();
    let mut signers = SignerRegistry::new();
    for chain in &chains {
        let Some(rpc_url) = config.rpc_urls.get(&chain.chain_id) else {
            continue;
        };
        match LocalWalletSigner::new(rpc_url, &config.signer_private_key, chain.chain_id).await {
            Ok(signer) => signers.insert(Arc::new(signer)),
            Err(e) => tracing::error!(
                chain_id = chain.chain_id,
                error = %e,
                "Failed to initialize signer, chain unavailable"
            ),
        }
    }

    let user_address = signers
        .chain_ids()
        .first()
        .and_then(|id| signers.get(*id).ok())
        .map(|signer| signer.account())
        .context("No chain signer could be initialized")?;

    let relayer = Arc::new(
        RelayerClient::new(
            config.relayer_url.clone(),
            config.relayer_api_token.clone(),
            config.http_timeout,
        )
        .context("Failed to create relayer client")?,
    );
    let swap_api = Arc::new(
        SwapApiClient::new(config.swap_api_url.clone(), config.http_timeout)
            .context("Failed to create swap API client")?,
    );

    let retry_policy = RetryPolicy::default();
    let onboarding = Arc::new(ChainOnboardingOrchestrator::new(
        chains,
        config.permission_module,
        relayer.clone(),
        signers.clone(),
        retry_policy,
    ));
    let wallet = Arc::new(WalletSelectionController::new(
        config.permission_module,
        relayer,
        signers.clone(),
        retry_policy,
    ));
    let swaps = Arc::new(SwapSession::new(SwapExecutionPipeline::new(swap_api, signers)));

    let state = AppState {
        onboarding,
        wallet,
        swaps,
        user_address,
        swap_provider: config.swap_provider.clone(),
    };

    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        user = %user_address,
        "Server listening"
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
