//! Swap execution pipeline
//!
//! Forward-only sequence per attempt:
//! balance check → allowance check → (approve → wait for receipt) →
//! build transaction → submit swap.
//!
//! Every step updates the shared `step` field so callers can show progress.
//! The first failure halts the sequence with `success = false`. Nothing is
//! rolled back: an approval that was sent stays pending on-chain, which is
//! why the allowance is always re-read instead of trusting earlier state.

use alloy::{
    primitives::{Address, Bytes, B256},
    sol_types::SolCall,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::swap::{
    format_units, ApprovalPolicy, BuildTxRequest, QuoteRequest, SwapExecutionState, SwapQuote,
    SwapReceipt, SwapRequest, SwapStep,
};
use crate::services::confirmation::{wait_for_receipt, ConfirmationPolicy};
use crate::services::contracts::IERC20;
use crate::services::retryable_reader::{RetryPolicy, RetryableReader};
use crate::services::signer::{EmbeddedSigner, SignerRegistry, TransactionCall};
use crate::services::swap_api::SwapApi;

pub struct SwapExecutionPipeline {
    swap_api: Arc<dyn SwapApi>,
    signers: SignerRegistry,
    retry_policy: RetryPolicy,
    confirmation: ConfirmationPolicy,
    approval_policy: ApprovalPolicy,
    state: RwLock<SwapExecutionState>,
}

impl SwapExecutionPipeline {
    pub fn new(swap_api: Arc<dyn SwapApi>, signers: SignerRegistry) -> Self {
        Self {
            swap_api,
            signers,
            retry_policy: RetryPolicy::default(),
            confirmation: ConfirmationPolicy::default(),
            approval_policy: ApprovalPolicy::default(),
            state: RwLock::new(SwapExecutionState::default()),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_confirmation_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.confirmation = policy;
        self
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.approval_policy = policy;
        self
    }

    pub fn state(&self) -> SwapExecutionState {
        self.state.read().clone()
    }

    /// Forget the current attempt; late updates from it are ignored
    pub fn discard_state(&self) {
        *self.state.write() = SwapExecutionState::default();
    }

    pub async fn quote(&self, request: &SwapRequest) -> Result<SwapQuote, PipelineError> {
        validate(request)?;
        Ok(self
            .swap_api
            .quote(&request.provider, request.chain_id, &QuoteRequest::from_swap(request))
            .await?)
    }

    /// Run one swap attempt to completion or first failure
    pub async fn execute(&self, request: &SwapRequest) -> Result<SwapReceipt, PipelineError> {
        let attempt = Uuid::new_v4();
        *self.state.write() = SwapExecutionState::started(attempt);

        info!(
            attempt = %attempt,
            provider = %request.provider,
            chain_id = request.chain_id,
            token_in = %request.token_in.symbol,
            token_out = %request.token_out.symbol,
            amount_in = %request.amount_in,
            "Executing swap"
        );

        let result = self.run_steps(attempt, request).await;

        match &result {
            Ok(receipt) => {
                self.update(attempt, |s| {
                    s.step = SwapStep::Done;
                    s.tx_hash = Some(receipt.tx_hash);
                    s.executed_at = Some(receipt.executed_at);
                    s.success = true;
                    s.error = None;
                });
                info!(attempt = %attempt, tx_hash = %receipt.tx_hash, "Swap submitted");
            }
            Err(e) => {
                self.update(attempt, |s| {
                    s.success = false;
                    s.error = Some(e.to_string());
                });
                warn!(attempt = %attempt, error = %e, "Swap failed");
            }
        }

        result
    }

    async fn run_steps(
        &self,
        attempt: Uuid,
        request: &SwapRequest,
    ) -> Result<SwapReceipt, PipelineError> {
        self.set_step(attempt, SwapStep::CheckingBalance);
        validate(request)?;
        let signer = self.signers.get(request.chain_id)?;
        let reader = RetryableReader::new(Arc::clone(&signer), self.retry_policy);
        let account = signer.account();
        let token = request.token_in.address;

        let balance = reader.balance_of(token, account).await?;
        if balance < request.amount_in {
            return Err(PipelineError::InsufficientBalance {
                symbol: request.token_in.symbol.clone(),
                held: format_units(balance, request.token_in.decimals),
                required: format_units(request.amount_in, request.token_in.decimals),
            });
        }

        self.set_step(attempt, SwapStep::CheckingAllowance);
        let allowance = reader.allowance(token, account, request.router).await?;
        debug!(allowance = %allowance, required = %request.amount_in, "Allowance read");

        let approval_tx_hash = if allowance < request.amount_in {
            Some(self.approve(attempt, signer.as_ref(), request).await?)
        } else {
            info!(attempt = %attempt, "Allowance sufficient, skipping approval");
            None
        };

        self.set_step(attempt, SwapStep::BuildingTx);
        let built = self
            .swap_api
            .build_tx(
                &request.provider,
                request.chain_id,
                &BuildTxRequest::from_swap(request, account),
            )
            .await?;

        self.set_step(attempt, SwapStep::Swapping);
        let tx_hash = signer
            .send_transaction(TransactionCall {
                to: built.to,
                data: built.data,
                value: built.value,
                gas: built.gas.map(|g| g.saturating_to::<u64>()),
            })
            .await?;

        Ok(SwapReceipt {
            tx_hash,
            approval_tx_hash,
            executed_at: Utc::now(),
        })
    }

    async fn approve(
        &self,
        attempt: Uuid,
        signer: &dyn EmbeddedSigner,
        request: &SwapRequest,
    ) -> Result<B256, PipelineError> {
        self.set_step(attempt, SwapStep::Approving);
        let amount = self.approval_policy.approval_amount(request.amount_in);
        let data = IERC20::approveCall {
            spender: request.router,
            amount,
        }
        .abi_encode();

        info!(
            attempt = %attempt,
            token = %request.token_in.address,
            spender = %request.router,
            policy = ?self.approval_policy,
            "Submitting approval"
        );
        let tx_hash = signer
            .send_transaction(TransactionCall::new(request.token_in.address, Bytes::from(data)))
            .await?;

        self.update(attempt, |s| {
            s.approval_tx_hash = Some(tx_hash);
            s.step = SwapStep::WaitingApproval;
        });
        wait_for_receipt(signer, tx_hash, self.confirmation).await?;
        Ok(tx_hash)
    }

    fn set_step(&self, attempt: Uuid, step: SwapStep) {
        self.update(attempt, |s| s.step = step);
    }

    fn update(&self, attempt: Uuid, f: impl FnOnce(&mut SwapExecutionState)) {
        let mut state = self.state.write();
        if state.attempt_id == Some(attempt) {
            f(&mut state);
        }
    }
}

fn validate(request: &SwapRequest) -> Result<(), PipelineError> {
    if request.amount_in.is_zero() {
        return Err(PipelineError::InvalidRequest("Swap amount must be positive".to_string()));
    }
    if request.token_in.address == request.token_out.address {
        return Err(PipelineError::InvalidRequest(
            "Input and output tokens must differ".to_string(),
        ));
    }
    if request.router == Address::ZERO {
        return Err(PipelineError::InvalidRequest("Router address is missing".to_string()));
    }
    Ok(())
}

/// Editable swap parameters plus the execution state they produced
///
/// Editing any parameter discards the previous attempt's state.
pub struct SwapSession {
    pipeline: SwapExecutionPipeline,
    request: RwLock<Option<SwapRequest>>,
}

impl SwapSession {
    pub fn new(pipeline: SwapExecutionPipeline) -> Self {
        Self {
            pipeline,
            request: RwLock::new(None),
        }
    }

    pub fn request(&self) -> Option<SwapRequest> {
        self.request.read().clone()
    }

    pub fn state(&self) -> SwapExecutionState {
        self.pipeline.state()
    }

    pub fn set_request(&self, request: SwapRequest) {
        let mut current = self.request.write();
        if current.as_ref() != Some(&request) {
            debug!("Swap parameters changed, discarding execution state");
            self.pipeline.discard_state();
            *current = Some(request);
        }
    }

    pub async fn quote(&self) -> Result<SwapQuote, PipelineError> {
        let request = self.require_request()?;
        self.pipeline.quote(&request).await
    }

    pub async fn execute_swap(&self) -> Result<SwapReceipt, PipelineError> {
        let request = self.require_request()?;
        self.pipeline.execute(&request).await
    }

    fn require_request(&self) -> Result<SwapRequest, PipelineError> {
        self.request()
            .ok_or_else(|| PipelineError::InvalidRequest("No swap parameters set".to_string()))
    }
}
