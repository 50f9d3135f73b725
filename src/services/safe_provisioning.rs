//! Safe provisioning pipeline
//!
//! Three steps per chain attempt:
//!
//! ```text
//! idle    -> create -> created | create-error
//! created -> sign   -> signed  | sign-error
//! signed  -> submit -> enabled | submit-error
//! ```
//!
//! `create` asks the relayer for the user's safe (idempotent), `sign` collects
//! the owner signature for `enableModule(module)` unless the module is already
//! enabled, and `submit` hands the signed Safe transaction to the relayer.

use alloy::{
    primitives::{Address, Bytes, B256},
    sol_types::SolCall,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::models::chain::ChainTarget;
use crate::models::progress::{ChainProgress, OnboardingStep, StepStatus};
use crate::models::relay::{EnableModuleRequest, SafeTxData};
use crate::services::contracts::ISafe;
use crate::services::relayer::RelayerApi;
use crate::services::retryable_reader::{RetryPolicy, RetryableReader};
use crate::services::signer::EmbeddedSigner;

/// Called with a snapshot after every progress change
pub type ProgressObserver = Arc<dyn Fn(&ChainProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisioningStage {
    Idle,
    Created,
    CreateError,
    Signed,
    SignError,
    Enabled,
    SubmitError,
}

/// Output of the sign step, consumed by submit
///
/// Bound to `safe_address`: submit refuses it for any other safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransactionHandle {
    pub safe_address: Address,
    /// EIP-712 digest of `safe_tx`
    pub safe_tx_hash: B256,
    pub safe_tx: SafeTxData,
    pub signatures: Bytes,
    pub threshold: u64,
    pub owners: Vec<Address>,
    pub signer: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    /// Module already active; no transaction needed and submit is skipped
    AlreadyEnabled,
    Signed { safe_tx_hash: B256 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Enabled { safe_address: Address, tx_hash: B256 },
    AlreadyEnabled { safe_address: Address },
}

impl PipelineOutcome {
    pub fn safe_address(&self) -> Address {
        match self {
            PipelineOutcome::Enabled { safe_address, .. }
            | PipelineOutcome::AlreadyEnabled { safe_address } => *safe_address,
        }
    }
}

/// One chain's provisioning attempt
pub struct SafeProvisioningPipeline {
    chain: ChainTarget,
    module_address: Address,
    relayer: Arc<dyn RelayerApi>,
    signer: Arc<dyn EmbeddedSigner>,
    reader: RetryableReader,
    stage: ProvisioningStage,
    safe_address: Option<Address>,
    handle: Option<SignedTransactionHandle>,
    progress: ChainProgress,
    observer: Option<ProgressObserver>,
}

impl SafeProvisioningPipeline {
    pub fn new(
        chain: ChainTarget,
        module_address: Address,
        relayer: Arc<dyn RelayerApi>,
        signer: Arc<dyn EmbeddedSigner>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let reader = RetryableReader::new(Arc::clone(&signer), retry_policy);
        Self {
            chain,
            module_address,
            relayer,
            signer,
            reader,
            stage: ProvisioningStage::Idle,
            safe_address: None,
            handle: None,
            progress: ChainProgress::default(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn chain(&self) -> &ChainTarget {
        &self.chain
    }

    pub fn stage(&self) -> ProvisioningStage {
        self.stage
    }

    pub fn safe_address(&self) -> Option<Address> {
        self.safe_address
    }

    pub fn progress(&self) -> &ChainProgress {
        &self.progress
    }

    pub fn signed_handle(&self) -> Option<&SignedTransactionHandle> {
        self.handle.as_ref()
    }

    /// Target an already-provisioned safe, skipping create
    ///
    /// Any signature collected for a different safe is dropped.
    pub fn use_existing_safe(&mut self, safe: Address) {
        if self.safe_address != Some(safe) {
            self.invalidate_signature();
            self.progress = ChainProgress::provisioned(safe);
            self.stage = ProvisioningStage::Created;
        }
        self.safe_address = Some(safe);
        self.progress.safe_address = Some(safe);
        self.notify();
    }

    /// Drop the signed handle, if any
    pub fn invalidate_signature(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(safe = %handle.safe_address, "Discarding signed transaction");
        }
    }

    /// Step 1: obtain the user's safe from the relayer
    pub async fn create(&mut self) -> Result<Address, PipelineError> {
        self.begin(OnboardingStep::WalletCreate)?;

        let result = match self.ensure_chain() {
            Ok(()) => self
                .relayer
                .create_safe(self.chain.chain_id)
                .await
                .map_err(PipelineError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(safe) => {
                if self.safe_address.is_some_and(|current| current != safe) {
                    self.invalidate_signature();
                }
                self.safe_address = Some(safe);
                self.progress.safe_address = Some(safe);
                self.stage = ProvisioningStage::Created;
                info!(chain_id = self.chain.chain_id, safe = %safe, "Safe wallet ready");
                self.settle(OnboardingStep::WalletCreate, Ok(safe))
            }
            Err(e) => {
                self.stage = ProvisioningStage::CreateError;
                self.settle(OnboardingStep::WalletCreate, Err(e))
            }
        }
    }

    /// Step 2: sign `enableModule` unless the module is already active
    pub async fn sign(&mut self) -> Result<SignOutcome, PipelineError> {
        self.begin(OnboardingStep::ModuleSign)?;

        let result = match self.safe_address {
            Some(safe) => self.collect_signature(safe).await,
            None => Err(PipelineError::MissingSafe),
        };

        match result {
            Ok(None) => {
                self.handle = None;
                self.stage = ProvisioningStage::Enabled;
                self.progress.succeed(OnboardingStep::ModuleSign);
                // Nothing to submit: the enable step is satisfied as-is
                self.progress.begin(OnboardingStep::ModuleEnable);
                self.settle(OnboardingStep::ModuleEnable, Ok(SignOutcome::AlreadyEnabled))
            }
            Ok(Some(handle)) => {
                let safe_tx_hash = handle.safe_tx_hash;
                self.handle = Some(handle);
                self.stage = ProvisioningStage::Signed;
                self.settle(OnboardingStep::ModuleSign, Ok(SignOutcome::Signed { safe_tx_hash }))
            }
            Err(e) => {
                self.stage = ProvisioningStage::SignError;
                self.settle(OnboardingStep::ModuleSign, Err(e))
            }
        }
    }

    /// Step 3: relay the signed transaction
    ///
    /// The handle is consumed only once the relayer accepts it; a failed
    /// submit keeps it so the step can be retried without a new signature.
    pub async fn submit(&mut self) -> Result<B256, PipelineError> {
        self.begin(OnboardingStep::ModuleEnable)?;

        match self.relay_signed().await {
            Ok(tx_hash) => {
                self.handle = None;
                self.stage = ProvisioningStage::Enabled;
                info!(
                    chain_id = self.chain.chain_id,
                    tx_hash = %tx_hash,
                    "Permission module enabled"
                );
                self.settle(OnboardingStep::ModuleEnable, Ok(tx_hash))
            }
            Err(e) => {
                self.stage = ProvisioningStage::SubmitError;
                self.settle(OnboardingStep::ModuleEnable, Err(e))
            }
        }
    }

    /// Full create → sign → submit sequence as a fresh attempt
    pub async fn run(&mut self) -> Result<PipelineOutcome, PipelineError> {
        self.reset();
        self.create().await?;
        self.activate_from_sign().await
    }

    /// Sign and submit for a safe set via [`Self::use_existing_safe`]
    pub async fn activate(&mut self) -> Result<PipelineOutcome, PipelineError> {
        if self.safe_address.is_none() {
            return Err(PipelineError::MissingSafe);
        }
        if self.progress.module_sign == StepStatus::Success {
            self.progress.reset_step(OnboardingStep::ModuleSign);
            self.progress.reset_step(OnboardingStep::ModuleEnable);
            self.invalidate_signature();
        }
        self.activate_from_sign().await
    }

    /// Re-run only the failed step and the steps after it
    pub async fn resume(&mut self) -> Result<PipelineOutcome, PipelineError> {
        info!(
            chain_id = self.chain.chain_id,
            stage = ?self.stage,
            "Resuming provisioning"
        );

        match self.stage {
            ProvisioningStage::Idle | ProvisioningStage::CreateError => self.run().await,
            ProvisioningStage::Created | ProvisioningStage::SignError => {
                self.activate_from_sign().await
            }
            ProvisioningStage::Signed | ProvisioningStage::SubmitError => {
                if self.handle.is_some() {
                    let tx_hash = self.submit().await?;
                    Ok(self.enabled_outcome(tx_hash)?)
                } else {
                    // Signature was discarded; collect a new one
                    self.progress.reset_step(OnboardingStep::ModuleSign);
                    self.activate_from_sign().await
                }
            }
            ProvisioningStage::Enabled => {
                let safe_address = self.safe_address.ok_or(PipelineError::MissingSafe)?;
                Ok(PipelineOutcome::AlreadyEnabled { safe_address })
            }
        }
    }

    async fn activate_from_sign(&mut self) -> Result<PipelineOutcome, PipelineError> {
        match self.sign().await? {
            SignOutcome::AlreadyEnabled => {
                let safe_address = self.safe_address.ok_or(PipelineError::MissingSafe)?;
                Ok(PipelineOutcome::AlreadyEnabled { safe_address })
            }
            SignOutcome::Signed { .. } => {
                let tx_hash = self.submit().await?;
                self.enabled_outcome(tx_hash)
            }
        }
    }

    fn enabled_outcome(&self, tx_hash: B256) -> Result<PipelineOutcome, PipelineError> {
        let safe_address = self.safe_address.ok_or(PipelineError::MissingSafe)?;
        Ok(PipelineOutcome::Enabled {
            safe_address,
            tx_hash,
        })
    }

    async fn collect_signature(
        &self,
        safe: Address,
    ) -> Result<Option<SignedTransactionHandle>, PipelineError> {
        self.ensure_chain()?;

        let account = self.signer.account();
        let owners = self.reader.owners(safe).await?;
        if !owners.contains(&account) {
            error!(safe = %safe, account = %account, "Connected account is not a safe owner");
            return Err(PipelineError::NotOwner { account, safe });
        }

        let threshold = self.reader.threshold(safe).await?;
        if threshold > 1 {
            warn!(
                safe = %safe,
                threshold = threshold,
                "Safe requires more than one signature; relayer needs co-signers"
            );
        }

        if self.reader.is_module_enabled(safe, self.module_address).await? {
            info!(safe = %safe, module = %self.module_address, "Module already enabled, skipping");
            return Ok(None);
        }

        let nonce = self.reader.safe_nonce(safe).await?;
        let data = ISafe::enableModuleCall {
            module: self.module_address,
        }
        .abi_encode();
        let safe_tx = SafeTxData::self_call(safe, Bytes::from(data), nonce);
        let safe_tx_hash = self.reader.safe_transaction_hash(safe, &safe_tx).await?;

        info!(safe = %safe, safe_tx_hash = %safe_tx_hash, "Requesting owner signature");
        let signatures = self.signer.sign_hash(safe_tx_hash).await?;

        Ok(Some(SignedTransactionHandle {
            safe_address: safe,
            safe_tx_hash,
            safe_tx,
            signatures,
            threshold,
            owners,
            signer: account,
        }))
    }

    async fn relay_signed(&mut self) -> Result<B256, PipelineError> {
        let target = self.safe_address.ok_or(PipelineError::MissingSafe)?;
        let handle = self.handle.as_ref().ok_or(PipelineError::MissingSignature)?;

        if handle.safe_address != target {
            let signed = handle.safe_address;
            self.invalidate_signature();
            warn!(signed = %signed, target = %target, "Refusing to submit signature for another safe");
            return Err(PipelineError::StaleSignature { signed, target });
        }

        let request = EnableModuleRequest {
            chain_id: self.chain.chain_id,
            safe_address: target,
            safe_tx_data: handle.safe_tx.clone(),
            signatures: handle.signatures.clone(),
        };

        Ok(self.relayer.enable_module(&request).await?)
    }

    fn ensure_chain(&self) -> Result<(), PipelineError> {
        if self.signer.chain_id() != self.chain.chain_id {
            return Err(PipelineError::UnsupportedChain(self.chain.chain_id));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.invalidate_signature();
        self.stage = ProvisioningStage::Idle;
        self.progress = ChainProgress {
            safe_address: self.safe_address,
            ..Default::default()
        };
        self.notify();
    }

    fn begin(&mut self, step: OnboardingStep) -> Result<(), PipelineError> {
        if !self.progress.begin(step) {
            return Err(PipelineError::InvalidState(format!(
                "{} cannot start from {:?}",
                step.as_str(),
                self.progress.status(step)
            )));
        }
        self.notify();
        Ok(())
    }

    fn settle<T>(
        &mut self,
        step: OnboardingStep,
        result: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        match &result {
            Ok(_) => {
                self.progress.succeed(step);
            }
            Err(e) => {
                warn!(
                    chain_id = self.chain.chain_id,
                    step = step.as_str(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "Provisioning step failed"
                );
                self.progress.fail(step, e.to_string());
            }
        }
        self.notify();
        result
    }

    fn notify(&self) {
        if let Some(observer) = &self.observer {
            observer(&self.progress);
        }
    }
}
