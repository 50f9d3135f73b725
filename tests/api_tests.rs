mod common;

use alloy::primitives::U256;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use common::*;
use safeflow_backend::{
    handlers,
    services::{
        chain_onboarding::ChainOnboardingOrchestrator,
        signer::SignerRegistry,
        swap_execution::{SwapExecutionPipeline, SwapSession},
        wallet_selection::WalletSelectionController,
    },
    AppState,
};

struct TestApp {
    router: Router,
    mainnet: Arc<MockSigner>,
}

fn setup_test_app() -> TestApp {
    let events = event_log();
    let testnet = Arc::new(MockSigner::new(11_155_111, events.clone()));
    let mainnet = Arc::new(MockSigner::new(1, events.clone()));
    let relayer = Arc::new(MockRelayer::new(events));
    let signers = SignerRegistry::new()
        .with(testnet.clone())
        .with(mainnet.clone());

    let state = AppState {
        onboarding: Arc::new(ChainOnboardingOrchestrator::new(
            chains(),
            MODULE,
            relayer.clone(),
            signers.clone(),
            fast_retry(),
        )),
        wallet: Arc::new(
            WalletSelectionController::new(MODULE, relayer, signers.clone(), fast_retry())
                .with_debounce(Duration::from_millis(5)),
        ),
        swaps: Arc::new(SwapSession::new(
            SwapExecutionPipeline::new(Arc::new(MockSwapApi::default()), signers)
                .with_retry_policy(fast_retry())
                .with_confirmation_policy(fast_confirmation()),
        )),
        user_address: account(),
        swap_provider: "uniswap".to_string(),
    };

    TestApp {
        router: handlers::router(state),
        mainnet,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn swap_body(amount_in: u64) -> Value {
    json!({
        "chain_id": 1,
        "token_in": { "address": TOKEN_IN, "symbol": "USDC", "decimals": 6 },
        "token_out": { "address": TOKEN_OUT, "symbol": "WETH", "decimals": 18 },
        "amount_in": U256::from(amount_in),
        "router": ROUTER,
    })
}

#[tokio::test]
async fn test_health() {
    let app = setup_test_app();

    let (status, body) = send(&app.router, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["chains"], json!([11_155_111, 1]));
}

#[tokio::test]
async fn test_onboarding_start_runs_in_background() {
    let app = setup_test_app();

    let (status, body) = send(&app.router, "POST", "/onboarding/check", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needs_onboarding"], true);

    let (status, _) = send(&app.router, "POST", "/onboarding/start", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, body) = send(&app.router, "GET", "/onboarding/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needs_onboarding"], false);
    assert_eq!(body["running"], false);
    assert_eq!(body["chains"][0]["key"], "testnet");
    assert_eq!(body["chains"][0]["progress"]["module_enable"], "success");
    assert_eq!(body["chains"][1]["progress"]["module_enable"], "success");
}

#[tokio::test]
async fn test_retry_unknown_chain_key() {
    let app = setup_test_app();

    let (status, body) = send(&app.router, "POST", "/onboarding/retry/devnet", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");
}

#[tokio::test]
async fn test_unsupported_wallet_chain() {
    let app = setup_test_app();

    let (status, body) = send(
        &app.router,
        "POST",
        "/wallet/chain",
        Some(json!({ "chain_id": 8453 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "configuration");
}

#[tokio::test]
async fn test_wallet_selection_flow() {
    let app = setup_test_app();
    let safe = safe_for(1);

    let (status, _) = send(&app.router, "POST", "/wallet/chain", Some(json!({ "chain_id": 1 }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        "POST",
        "/wallet/select",
        Some(json!({ "safe_address": safe })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["module_status"]["loading"], true);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let (_, body) = send(&app.router, "GET", "/wallet/module-status", None).await;
    assert_eq!(body["module_status"]["enabled"], false);

    let (status, body) = send(&app.router, "POST", "/wallet/enable-module", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "enabled");
    assert_eq!(app.mainnet.signed_count(), 1);
}

#[tokio::test]
async fn test_enable_without_selection() {
    let app = setup_test_app();
    send(&app.router, "POST", "/wallet/chain", Some(json!({ "chain_id": 1 }))).await;

    let (status, body) = send(&app.router, "POST", "/wallet/enable-module", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No safe wallet selected");
}

#[tokio::test]
async fn test_swap_with_insufficient_balance() {
    let app = setup_test_app();

    let (status, body) = send(&app.router, "PUT", "/swap/request", Some(swap_body(2_000_000))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["provider"], "uniswap");
    assert_eq!(body["request"]["slippage_bps"], 50);

    let (status, body) = send(&app.router, "POST", "/swap/execute", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "insufficient_funds");
    assert_eq!(body["error"], "Insufficient USDC balance: have 0, need 2");

    let (_, body) = send(&app.router, "GET", "/swap/state", None).await;
    assert_eq!(body["state"]["success"], false);
    assert_eq!(body["state"]["step"], "checking-balance");
    assert!(app.mainnet.sent().is_empty());
}

#[tokio::test]
async fn test_swap_execute_and_quote() {
    let app = setup_test_app();
    {
        let mut state = app.mainnet.state.lock();
        state.balances.insert(TOKEN_IN, U256::from(5_000_000u64));
    }
    send(&app.router, "PUT", "/swap/request", Some(swap_body(1_000_000))).await;

    let (status, body) = send(&app.router, "POST", "/swap/quote", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amountOut"], "1000000000");

    let (status, body) = send(&app.router, "POST", "/swap/execute", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["approval_tx_hash"].is_string());

    let (_, body) = send(&app.router, "GET", "/swap/state", None).await;
    assert_eq!(body["state"]["step"], "done");
    assert_eq!(body["state"]["success"], true);
    assert_eq!(body["step_description"], "Swap submitted");
}
