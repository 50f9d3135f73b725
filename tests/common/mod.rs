//! Mock collaborators shared by the integration tests
#![allow(dead_code)]

use alloy::{
    primitives::{Address, Bytes, B256, U256},
    sol_types::SolCall,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use safeflow_backend::{
    error::{BackendError, SignerError},
    models::{
        chain::{ChainKey, ChainTarget},
        relay::{EnableModuleRequest, UserRecord},
        swap::{BuildTxRequest, BuiltTransaction, QuoteRequest, SwapQuote, SwapRequest, TokenInfo},
    },
    services::{
        confirmation::ConfirmationPolicy,
        contracts::{IERC20, ISafe},
        relayer::RelayerApi,
        retryable_reader::RetryPolicy,
        signer::{EmbeddedSigner, ReceiptStatus, TransactionCall},
        swap_api::SwapApi,
    },
};

pub const MODULE: Address = Address::repeat_byte(0xaa);
pub const ROUTER: Address = Address::repeat_byte(0x70);
pub const TOKEN_IN: Address = Address::repeat_byte(0x01);
pub const TOKEN_OUT: Address = Address::repeat_byte(0x02);
pub const SAFE_TX_HASH: B256 = B256::repeat_byte(0x5a);
pub const ENABLE_TX_HASH: B256 = B256::repeat_byte(0xee);

pub fn account() -> Address {
    Address::repeat_byte(0x0c)
}

pub fn safe_for(chain_id: u64) -> Address {
    Address::left_padding_from(&chain_id.to_be_bytes())
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

pub fn fast_confirmation() -> ConfirmationPolicy {
    ConfirmationPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 5,
    }
}

pub fn chains() -> Vec<ChainTarget> {
    vec![
        ChainTarget::new(11_155_111, "Ethereum Sepolia", ChainKey::Testnet),
        ChainTarget::new(1, "Ethereum", ChainKey::Mainnet),
    ]
}

pub fn swap_request(amount_in: u64) -> SwapRequest {
    SwapRequest {
        provider: "uniswap".to_string(),
        chain_id: 1,
        token_in: TokenInfo {
            address: TOKEN_IN,
            symbol: "USDC".to_string(),
            decimals: 6,
        },
        token_out: TokenInfo {
            address: TOKEN_OUT,
            symbol: "WETH".to_string(),
            decimals: 18,
        },
        amount_in: U256::from(amount_in),
        slippage_bps: 50,
        router: ROUTER,
    }
}

/// Ordered log of collaborator calls, shared across mocks
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    Success,
    Reverted,
    NeverMined,
}

#[derive(Debug)]
pub struct SignerState {
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub module_enabled: bool,
    pub nonce: U256,
    pub balances: HashMap<Address, U256>,
    pub allowances: HashMap<Address, U256>,
    /// Upcoming eth_calls that fail with an RPC error
    pub failing_reads: u32,
    /// Upcoming eth_calls that return empty data
    pub empty_reads: u32,
    /// Upcoming signature requests the user rejects
    pub rejected_signatures: u32,
    pub receipt_mode: ReceiptMode,
    pub calls: Vec<[u8; 4]>,
    pub sent: Vec<TransactionCall>,
    pub signed: Vec<B256>,
    pub receipt_polls: u32,
}

/// Scriptable wallet for one chain
pub struct MockSigner {
    account: Address,
    chain_id: u64,
    pub state: Mutex<SignerState>,
    events: EventLog,
    active_signatures: Arc<AtomicUsize>,
    max_active_signatures: Arc<AtomicUsize>,
    sign_gate: Option<Arc<Notify>>,
}

impl MockSigner {
    pub fn new(chain_id: u64, events: EventLog) -> Self {
        Self {
            account: account(),
            chain_id,
            state: Mutex::new(SignerState {
                owners: vec![account()],
                threshold: 1,
                module_enabled: false,
                nonce: U256::from(3),
                balances: HashMap::new(),
                allowances: HashMap::new(),
                failing_reads: 0,
                empty_reads: 0,
                rejected_signatures: 0,
                receipt_mode: ReceiptMode::Success,
                calls: Vec::new(),
                sent: Vec::new(),
                signed: Vec::new(),
                receipt_polls: 0,
            }),
            events,
            active_signatures: Arc::new(AtomicUsize::new(0)),
            max_active_signatures: Arc::new(AtomicUsize::new(0)),
            sign_gate: None,
        }
    }

    /// Hold every signature prompt open until the gate is notified
    pub fn with_sign_gate(mut self, gate: Arc<Notify>) -> Self {
        self.sign_gate = Some(gate);
        self
    }

    /// Share signature-concurrency counters with other signers
    pub fn with_signature_tracking(
        mut self,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    ) -> Self {
        self.active_signatures = active;
        self.max_active_signatures = max_active;
        self
    }

    pub fn max_concurrent_signatures(&self) -> usize {
        self.max_active_signatures.load(Ordering::SeqCst)
    }

    pub fn calls_of(&self, selector: [u8; 4]) -> usize {
        self.state.lock().calls.iter().filter(|s| **s == selector).count()
    }

    pub fn sent(&self) -> Vec<TransactionCall> {
        self.state.lock().sent.clone()
    }

    pub fn signed_count(&self) -> usize {
        self.state.lock().signed.len()
    }
}

#[async_trait]
impl EmbeddedSigner for MockSigner {
    fn account(&self) -> Address {
        self.account
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, SignerError> {
        let mut state = self.state.lock();
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| SignerError::Rpc("short calldata".to_string()))?;
        state.calls.push(selector);

        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(SignerError::Rpc("header not found".to_string()));
        }
        if state.empty_reads > 0 {
            state.empty_reads -= 1;
            return Ok(Bytes::new());
        }

        let encoded = match selector {
            ISafe::getOwnersCall::SELECTOR => {
                ISafe::getOwnersCall::abi_encode_returns(&(state.owners.clone(),))
            }
            ISafe::getThresholdCall::SELECTOR => {
                ISafe::getThresholdCall::abi_encode_returns(&(U256::from(state.threshold),))
            }
            ISafe::isModuleEnabledCall::SELECTOR => {
                ISafe::isModuleEnabledCall::abi_encode_returns(&(state.module_enabled,))
            }
            ISafe::nonceCall::SELECTOR => ISafe::nonceCall::abi_encode_returns(&(state.nonce,)),
            ISafe::getTransactionHashCall::SELECTOR => {
                ISafe::getTransactionHashCall::abi_encode_returns(&(SAFE_TX_HASH,))
            }
            IERC20::balanceOfCall::SELECTOR => {
                let balance = state.balances.get(&to).copied().unwrap_or_default();
                IERC20::balanceOfCall::abi_encode_returns(&(balance,))
            }
            IERC20::allowanceCall::SELECTOR => {
                let allowance = state.allowances.get(&to).copied().unwrap_or_default();
                IERC20::allowanceCall::abi_encode_returns(&(allowance,))
            }
            other => return Err(SignerError::Rpc(format!("unexpected selector {:?}", other))),
        };
        Ok(Bytes::from(encoded))
    }

    async fn send_transaction(&self, tx: TransactionCall) -> Result<B256, SignerError> {
        let mut state = self.state.lock();
        if let Ok(approve) = IERC20::approveCall::abi_decode(&tx.data, true) {
            state.allowances.insert(tx.to, approve.amount);
            self.events.lock().push(format!("approve:{}", self.chain_id));
        } else {
            self.events.lock().push(format!("send:{}", self.chain_id));
        }
        state.sent.push(tx);
        Ok(B256::with_last_byte(state.sent.len() as u8))
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptStatus>, SignerError> {
        let mut state = self.state.lock();
        state.receipt_polls += 1;
        Ok(match state.receipt_mode {
            ReceiptMode::Success => Some(ReceiptStatus {
                tx_hash,
                success: true,
                block_number: Some(100),
            }),
            ReceiptMode::Reverted => Some(ReceiptStatus {
                tx_hash,
                success: false,
                block_number: Some(100),
            }),
            ReceiptMode::NeverMined => None,
        })
    }

    async fn sign_hash(&self, hash: B256) -> Result<Bytes, SignerError> {
        let active = self.active_signatures.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_signatures.fetch_max(active, Ordering::SeqCst);
        self.events.lock().push(format!("sign:{}", self.chain_id));
        if let Some(gate) = &self.sign_gate {
            gate.notified().await;
        }

        // Hold the prompt open long enough for any overlap to show up
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active_signatures.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.rejected_signatures > 0 {
            state.rejected_signatures -= 1;
            return Err(SignerError::UserRejected);
        }
        state.signed.push(hash);
        Ok(Bytes::from(vec![0x11; 65]))
    }
}

#[derive(Debug, Default)]
pub struct RelayerState {
    pub user: UserRecord,
    /// Chains whose create_safe fails
    pub failing_creates: Vec<u64>,
    /// Upcoming enable_module calls that fail with a 503
    pub failing_enables: u32,
    /// Time create_safe takes before answering
    pub create_delay: Duration,
    pub create_calls: Vec<u64>,
    pub enable_requests: Vec<EnableModuleRequest>,
    pub user_lookups: u32,
}

pub struct MockRelayer {
    pub state: Mutex<RelayerState>,
    events: EventLog,
}

impl MockRelayer {
    pub fn new(events: EventLog) -> Self {
        Self {
            state: Mutex::new(RelayerState::default()),
            events,
        }
    }

    pub fn create_calls(&self) -> Vec<u64> {
        self.state.lock().create_calls.clone()
    }

    pub fn enable_requests(&self) -> Vec<EnableModuleRequest> {
        self.state.lock().enable_requests.clone()
    }
}

#[async_trait]
impl RelayerApi for MockRelayer {
    async fn create_safe(&self, chain_id: u64) -> Result<Address, BackendError> {
        self.events.lock().push(format!("create:{}", chain_id));
        let delay = self.state.lock().create_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.create_calls.push(chain_id);
        if state.failing_creates.contains(&chain_id) {
            return Err(BackendError::Status {
                status: 500,
                body: "deployment failed".to_string(),
            });
        }
        Ok(safe_for(chain_id))
    }

    async fn enable_module(&self, request: &EnableModuleRequest) -> Result<B256, BackendError> {
        self.events.lock().push(format!("enable:{}", request.chain_id));
        let mut state = self.state.lock();
        state.enable_requests.push(request.clone());
        if state.failing_enables > 0 {
            state.failing_enables -= 1;
            return Err(BackendError::Status {
                status: 503,
                body: "relayer busy".to_string(),
            });
        }
        Ok(ENABLE_TX_HASH)
    }

    async fn get_user(&self, _address: Address) -> Result<UserRecord, BackendError> {
        let mut state = self.state.lock();
        state.user_lookups += 1;
        Ok(state.user.clone())
    }
}

#[derive(Default)]
pub struct MockSwapApi {
    pub quotes: AtomicUsize,
    pub builds: Mutex<Vec<BuildTxRequest>>,
}

#[async_trait]
impl SwapApi for MockSwapApi {
    async fn quote(
        &self,
        _provider: &str,
        _chain_id: u64,
        request: &QuoteRequest,
    ) -> Result<SwapQuote, BackendError> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        Ok(SwapQuote {
            amount_out: format!("{}000", request.amount_in),
            price_impact: 0.12,
            gas_estimate: "180000".to_string(),
        })
    }

    async fn build_tx(
        &self,
        _provider: &str,
        _chain_id: u64,
        request: &BuildTxRequest,
    ) -> Result<BuiltTransaction, BackendError> {
        self.builds.lock().push(request.clone());
        Ok(BuiltTransaction {
            to: ROUTER,
            data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            value: U256::ZERO,
            gas: Some(U256::from(250_000u64)),
        })
    }
}
