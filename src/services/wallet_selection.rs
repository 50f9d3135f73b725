//! Wallet selection controller
//!
//! Tracks the safe the user picked for the active chain. Safe addresses are
//! chain-scoped, so switching chains drops the selection together with any
//! signature collected for it. Module status is always re-read from chain
//! (debounced) on selection.

use alloy::primitives::Address;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::models::chain::ChainTarget;
use crate::models::progress::{ChainProgress, ModuleStatus};
use crate::services::relayer::RelayerApi;
use crate::services::retryable_reader::{RetryPolicy, RetryableReader};
use crate::services::safe_provisioning::{PipelineOutcome, SafeProvisioningPipeline};
use crate::services::signer::SignerRegistry;

/// Delay before a selection triggers a module status read (ms)
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, Default)]
struct SelectionState {
    active_chain: Option<ChainTarget>,
    selected: Option<Address>,
    module_status: ModuleStatus,
    enable_progress: Option<ChainProgress>,
}

pub struct WalletSelectionController {
    module_address: Address,
    relayer: Arc<dyn RelayerApi>,
    signers: SignerRegistry,
    retry_policy: RetryPolicy,
    debounce: Duration,
    state: Arc<RwLock<SelectionState>>,
    /// Pipeline for the selected safe, kept between enable and retry.
    /// Taken out of the slot while an attempt runs; never locked across an await.
    pipeline: Mutex<Option<SafeProvisioningPipeline>>,
    /// Held while an enable attempt is in flight
    enable_lock: tokio::sync::Mutex<()>,
    /// Bumped on every chain or selection change; stale reads are discarded
    generation: AtomicU64,
}

impl WalletSelectionController {
    pub fn new(
        module_address: Address,
        relayer: Arc<dyn RelayerApi>,
        signers: SignerRegistry,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            module_address,
            relayer,
            signers,
            retry_policy,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            state: Arc::new(RwLock::new(SelectionState::default())),
            pipeline: Mutex::new(None),
            enable_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn active_chain(&self) -> Option<ChainTarget> {
        self.state.read().active_chain.clone()
    }

    pub fn selected_safe(&self) -> Option<Address> {
        self.state.read().selected
    }

    pub fn module_status(&self) -> ModuleStatus {
        self.state.read().module_status
    }

    /// Step progress of the last enable attempt for the selected safe
    pub fn enable_progress(&self) -> Option<ChainProgress> {
        self.state.read().enable_progress.clone()
    }

    /// Switch the active chain, clearing any selection made on another chain
    pub async fn set_active_chain(&self, chain: ChainTarget) {
        if self
            .state
            .read()
            .active_chain
            .as_ref()
            .is_some_and(|c| c.chain_id == chain.chain_id)
        {
            return;
        }

        info!(chain_id = chain.chain_id, "Active chain changed, clearing selection");
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.write();
            *state = SelectionState {
                active_chain: Some(chain),
                ..Default::default()
            };
        }
        *self.pipeline.lock() = None;
    }

    /// Select a safe on the active chain and schedule a module status read
    pub async fn select_safe(self: &Arc<Self>, safe: Address) -> Result<(), PipelineError> {
        {
            let mut state = self.state.write();
            if state.active_chain.is_none() {
                return Err(PipelineError::InvalidRequest(
                    "No active chain selected".to_string(),
                ));
            }
            state.selected = Some(safe);
            state.module_status = ModuleStatus::loading();
            state.enable_progress = None;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut pipeline = self.pipeline.lock();
            if pipeline.as_ref().and_then(|p| p.safe_address()) != Some(safe) {
                *pipeline = None;
            }
        }

        debug!(safe = %safe, generation = generation, "Safe selected");

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(controller.debounce).await;
            if controller.generation.load(Ordering::SeqCst) != generation {
                debug!(generation = generation, "Selection changed during debounce, skipping read");
                return;
            }
            if let Err(e) = controller.refresh_module_status().await {
                warn!(error = %e, "Module status read failed");
            }
        });

        Ok(())
    }

    pub async fn clear_selection(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.write();
            state.selected = None;
            state.module_status = ModuleStatus::default();
            state.enable_progress = None;
        }
        *self.pipeline.lock() = None;
    }

    /// Read the module flag for the current selection from chain
    pub async fn refresh_module_status(&self) -> Result<ModuleStatus, PipelineError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let (chain, safe) = self.current_selection()?;

        let signer = match self.signers.get(chain.chain_id) {
            Ok(signer) => signer,
            Err(e) => {
                if self.generation.load(Ordering::SeqCst) == generation {
                    self.state.write().module_status = ModuleStatus::default();
                }
                return Err(e);
            }
        };
        self.state.write().module_status = ModuleStatus::loading();

        let result = RetryableReader::new(signer, self.retry_policy)
            .is_module_enabled(safe, self.module_address)
            .await;

        let status = match &result {
            Ok(enabled) => ModuleStatus::known(*enabled),
            Err(_) => ModuleStatus::default(),
        };

        if self.generation.load(Ordering::SeqCst) == generation {
            self.state.write().module_status = status;
        } else {
            debug!(safe = %safe, "Discarding module status for stale selection");
        }

        result.map(|_| status)
    }

    /// Enable the permission module on the selected safe (sign + submit)
    pub async fn enable_module(&self) -> Result<PipelineOutcome, PipelineError> {
        let (chain, safe) = self.current_selection()?;
        let _guard = self
            .enable_lock
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;

        let mut pipeline = match self.take_pipeline(&chain, safe) {
            Some(pipeline) => pipeline,
            None => self.build_pipeline(&chain, safe)?,
        };

        let result = pipeline.activate().await;
        self.finish_attempt(&chain, safe, pipeline, &result);
        result
    }

    /// Resume only the failed step of the last enable attempt
    pub async fn retry_enable_module(&self) -> Result<PipelineOutcome, PipelineError> {
        let (chain, safe) = self.current_selection()?;
        let guard = self
            .enable_lock
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;

        let Some(mut pipeline) = self.take_pipeline(&chain, safe) else {
            drop(guard);
            return self.enable_module().await;
        };

        let result = pipeline.resume().await;
        self.finish_attempt(&chain, safe, pipeline, &result);
        result
    }

    /// Remove the kept pipeline if it still targets this chain and safe
    fn take_pipeline(&self, chain: &ChainTarget, safe: Address) -> Option<SafeProvisioningPipeline> {
        let mut slot = self.pipeline.lock();
        let reusable = slot
            .as_ref()
            .is_some_and(|p| p.safe_address() == Some(safe) && p.chain().chain_id == chain.chain_id);
        if reusable { slot.take() } else { None }
    }

    /// Put the pipeline back for a later retry unless the selection moved on
    fn finish_attempt(
        &self,
        chain: &ChainTarget,
        safe: Address,
        pipeline: SafeProvisioningPipeline,
        result: &Result<PipelineOutcome, PipelineError>,
    ) {
        let mut state = self.state.write();
        let current = state.selected == Some(safe)
            && state
                .active_chain
                .as_ref()
                .is_some_and(|c| c.chain_id == chain.chain_id);
        if !current {
            debug!(safe = %safe, chain_id = chain.chain_id, "Selection changed during enable, dropping pipeline");
            return;
        }

        if result.is_ok() {
            state.module_status = ModuleStatus::known(true);
        }
        *self.pipeline.lock() = Some(pipeline);
    }

    fn build_pipeline(
        &self,
        chain: &ChainTarget,
        safe: Address,
    ) -> Result<SafeProvisioningPipeline, PipelineError> {
        let signer = self.signers.get(chain.chain_id)?;
        let state = Arc::clone(&self.state);
        let mut pipeline = SafeProvisioningPipeline::new(
            chain.clone(),
            self.module_address,
            Arc::clone(&self.relayer),
            signer,
            self.retry_policy,
        )
        .with_observer(Arc::new(move |snapshot: &ChainProgress| {
            let mut state = state.write();
            if state.selected == snapshot.safe_address {
                state.enable_progress = Some(snapshot.clone());
            }
        }));
        pipeline.use_existing_safe(safe);
        Ok(pipeline)
    }

    fn current_selection(&self) -> Result<(ChainTarget, Address), PipelineError> {
        let state = self.state.read();
        let chain = state
            .active_chain
            .clone()
            .ok_or_else(|| PipelineError::InvalidRequest("No active chain selected".to_string()))?;
        let safe = state.selected.ok_or(PipelineError::MissingSafe)?;
        Ok((chain, safe))
    }
}
