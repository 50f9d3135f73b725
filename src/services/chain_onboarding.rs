//! Chain onboarding orchestrator
//!
//! Decides once per session which configured chains still lack a safe with
//! the permission module enabled, then provisions them one chain at a time.
//! Chain N+1 starts only after chain N has settled, so the user never faces
//! more than one pending signature prompt. A failed chain is recorded and
//! the loop moves on.

use alloy::primitives::Address;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::models::chain::{ChainKey, ChainTarget};
use crate::models::progress::{ChainProgress, OnboardingStep};
use crate::services::relayer::RelayerApi;
use crate::services::retryable_reader::{RetryPolicy, RetryableReader};
use crate::services::safe_provisioning::{PipelineOutcome, SafeProvisioningPipeline};
use crate::services::signer::SignerRegistry;

/// Result of one onboarding run
#[derive(Debug, Clone, Default, Serialize)]
pub struct OnboardingSummary {
    pub completed: Vec<ChainKey>,
    pub failed: Vec<ChainFailure>,
    pub skipped: Vec<ChainKey>,
    pub needs_onboarding: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainFailure {
    pub chain: ChainKey,
    pub error: String,
}

pub struct ChainOnboardingOrchestrator {
    chains: Vec<ChainTarget>,
    module_address: Address,
    relayer: Arc<dyn RelayerApi>,
    signers: SignerRegistry,
    retry_policy: RetryPolicy,
    progress: Arc<RwLock<BTreeMap<ChainKey, ChainProgress>>>,
    /// Set once the user record has been checked this session
    checked_user: Mutex<Option<Address>>,
    /// Held for the duration of a run; at most one signature prompt at a time
    run_lock: tokio::sync::Mutex<()>,
}

impl ChainOnboardingOrchestrator {
    pub fn new(
        chains: Vec<ChainTarget>,
        module_address: Address,
        relayer: Arc<dyn RelayerApi>,
        signers: SignerRegistry,
        retry_policy: RetryPolicy,
    ) -> Self {
        let progress = chains
            .iter()
            .map(|chain| (chain.key, ChainProgress::default()))
            .collect();

        Self {
            chains,
            module_address,
            relayer,
            signers,
            retry_policy,
            progress: Arc::new(RwLock::new(progress)),
            checked_user: Mutex::new(None),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn chains(&self) -> &[ChainTarget] {
        &self.chains
    }

    /// Snapshot of every chain's progress
    pub fn progress(&self) -> BTreeMap<ChainKey, ChainProgress> {
        self.progress.read().clone()
    }

    pub fn chain_progress(&self, key: ChainKey) -> Option<ChainProgress> {
        self.progress.read().get(&key).cloned()
    }

    /// True unless every configured chain has its module enabled
    pub fn needs_onboarding(&self) -> bool {
        let progress = self.progress.read();
        !self.chains.iter().all(|chain| {
            progress
                .get(&chain.key)
                .map(ChainProgress::is_complete)
                .unwrap_or(false)
        })
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Seed progress from the backend user record, once per session
    ///
    /// Chains with a known safe are verified on-chain before being marked
    /// complete; a failed verification leaves the chain pending. While a run
    /// is in flight the live progress is reported as is and the check is
    /// left for a later call.
    pub async fn check_needs_onboarding(&self, user: Address) -> Result<bool, PipelineError> {
        let checked = *self.checked_user.lock();
        if checked == Some(user) {
            return Ok(self.needs_onboarding());
        }

        let Ok(_guard) = self.run_lock.try_lock() else {
            debug!(user = %user, "Onboarding run in progress, skipping status check");
            return Ok(self.needs_onboarding());
        };

        info!(user = %user, "Checking onboarding status");
        let record = self.relayer.get_user(user).await?;

        for chain in &self.chains {
            let Some(safe) = record.safe_address(chain.key) else {
                info!(chain = %chain.key, "No safe recorded for chain");
                self.progress.write().insert(chain.key, ChainProgress::default());
                continue;
            };

            let seeded = match self.module_enabled(chain, safe).await {
                Ok(true) => ChainProgress::completed(safe),
                Ok(false) => ChainProgress::provisioned(safe),
                Err(e) => {
                    warn!(chain = %chain.key, safe = %safe, error = %e, "Could not verify module status");
                    ChainProgress::provisioned(safe)
                }
            };
            self.progress.write().insert(chain.key, seeded);
        }

        *self.checked_user.lock() = Some(user);

        let needs = self.needs_onboarding();
        info!(user = %user, needs_onboarding = needs, "Onboarding status checked");
        Ok(needs)
    }

    /// Provision every incomplete chain, strictly in order
    pub async fn start_onboarding(&self) -> Result<OnboardingSummary, PipelineError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;

        info!(chains = self.chains.len(), "Starting onboarding");
        let mut summary = OnboardingSummary::default();

        for chain in &self.chains {
            if self
                .chain_progress(chain.key)
                .is_some_and(|p| p.is_complete())
            {
                summary.skipped.push(chain.key);
                continue;
            }

            match self.run_chain(chain).await {
                Ok(_) => summary.completed.push(chain.key),
                Err(e) => summary.failed.push(ChainFailure {
                    chain: chain.key,
                    error: e.to_string(),
                }),
            }
        }

        summary.needs_onboarding = self.needs_onboarding();
        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            needs_onboarding = summary.needs_onboarding,
            "Onboarding finished"
        );
        Ok(summary)
    }

    /// Re-run the whole pipeline for one chain, starting again from create
    pub async fn retry_chain(&self, key: ChainKey) -> Result<PipelineOutcome, PipelineError> {
        let chain = self
            .chains
            .iter()
            .find(|c| c.key == key)
            .cloned()
            .ok_or_else(|| PipelineError::InvalidRequest(format!("Chain {} is not configured", key)))?;

        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;

        info!(chain = %key, "Retrying chain onboarding");
        self.run_chain(&chain).await
    }

    async fn run_chain(&self, chain: &ChainTarget) -> Result<PipelineOutcome, PipelineError> {
        let signer = match self.signers.get(chain.chain_id) {
            Ok(signer) => signer,
            Err(e) => {
                error!(chain = %chain.key, chain_id = chain.chain_id, "No signer for chain");
                let mut progress = ChainProgress::default();
                progress.begin(OnboardingStep::WalletCreate);
                progress.fail(OnboardingStep::WalletCreate, e.to_string());
                self.progress.write().insert(chain.key, progress);
                return Err(e);
            }
        };

        let progress = Arc::clone(&self.progress);
        let key = chain.key;
        let mut pipeline = SafeProvisioningPipeline::new(
            chain.clone(),
            self.module_address,
            Arc::clone(&self.relayer),
            signer,
            self.retry_policy,
        )
        .with_observer(Arc::new(move |snapshot: &ChainProgress| {
            progress.write().insert(key, snapshot.clone());
        }));

        info!(chain = %chain.key, chain_id = chain.chain_id, "Provisioning chain");
        let result = pipeline.run().await;

        match &result {
            Ok(outcome) => info!(chain = %chain.key, outcome = ?outcome, "Chain onboarded"),
            Err(e) => warn!(chain = %chain.key, error = %e, "Chain onboarding failed"),
        }
        result
    }

    async fn module_enabled(&self, chain: &ChainTarget, safe: Address) -> Result<bool, PipelineError> {
        let signer = self.signers.get(chain.chain_id)?;
        RetryableReader::new(signer, self.retry_policy)
            .is_module_enabled(safe, self.module_address)
            .await
    }
}
