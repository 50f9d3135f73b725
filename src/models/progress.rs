//! Step and progress state shared by the pipelines
//!
//! These types carry no behavior beyond guarding legal step transitions.
//! They are serialized as read-only snapshots for the control API.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifecycle of one pipeline step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

impl StepStatus {
    /// `Success` is terminal; an errored step may start a new attempt
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Idle, StepStatus::Pending)
                | (StepStatus::Error, StepStatus::Pending)
                | (StepStatus::Pending, StepStatus::Success)
                | (StepStatus::Pending, StepStatus::Error)
        )
    }

    pub fn is_settled(self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Error)
    }
}

/// Steps of safe provisioning on one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    WalletCreate,
    ModuleSign,
    ModuleEnable,
}

impl OnboardingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStep::WalletCreate => "wallet_create",
            OnboardingStep::ModuleSign => "module_sign",
            OnboardingStep::ModuleEnable => "module_enable",
        }
    }
}

/// Per-chain onboarding state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProgress {
    pub wallet_create: StepStatus,
    pub module_sign: StepStatus,
    pub module_enable: StepStatus,
    /// Message of the most recent failed step
    pub error: Option<String>,
    pub safe_address: Option<Address>,
}

impl ChainProgress {
    /// A chain whose safe exists but whose module state is not yet known
    pub fn provisioned(safe_address: Address) -> Self {
        Self {
            wallet_create: StepStatus::Success,
            safe_address: Some(safe_address),
            ..Default::default()
        }
    }

    /// A chain whose safe exists and has the module enabled
    pub fn completed(safe_address: Address) -> Self {
        Self {
            wallet_create: StepStatus::Success,
            module_sign: StepStatus::Success,
            module_enable: StepStatus::Success,
            error: None,
            safe_address: Some(safe_address),
        }
    }

    pub fn status(&self, step: OnboardingStep) -> StepStatus {
        match step {
            OnboardingStep::WalletCreate => self.wallet_create,
            OnboardingStep::ModuleSign => self.module_sign,
            OnboardingStep::ModuleEnable => self.module_enable,
        }
    }

    fn status_mut(&mut self, step: OnboardingStep) -> &mut StepStatus {
        match step {
            OnboardingStep::WalletCreate => &mut self.wallet_create,
            OnboardingStep::ModuleSign => &mut self.module_sign,
            OnboardingStep::ModuleEnable => &mut self.module_enable,
        }
    }

    /// Apply a transition, returning false (and leaving state untouched) if illegal
    pub fn transition(&mut self, step: OnboardingStep, next: StepStatus) -> bool {
        let current = self.status(step);
        if !current.can_transition_to(next) {
            warn!(
                step = step.as_str(),
                from = ?current,
                to = ?next,
                "Rejected illegal step transition"
            );
            return false;
        }
        *self.status_mut(step) = next;
        true
    }

    pub fn begin(&mut self, step: OnboardingStep) -> bool {
        let started = self.transition(step, StepStatus::Pending);
        if started {
            self.error = None;
        }
        started
    }

    pub fn succeed(&mut self, step: OnboardingStep) -> bool {
        self.transition(step, StepStatus::Success)
    }

    pub fn fail(&mut self, step: OnboardingStep, message: impl Into<String>) -> bool {
        let failed = self.transition(step, StepStatus::Error);
        if failed {
            self.error = Some(message.into());
        }
        failed
    }

    /// Start a fresh attempt of `step`, discarding its previous outcome
    pub fn reset_step(&mut self, step: OnboardingStep) {
        *self.status_mut(step) = StepStatus::Idle;
    }

    pub fn is_complete(&self) -> bool {
        self.module_enable == StepStatus::Success
    }
}

/// Cached "is the permission module enabled on this safe" flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    /// `None` while unknown
    pub enabled: Option<bool>,
    pub loading: bool,
}

impl ModuleStatus {
    pub fn loading() -> Self {
        Self {
            enabled: None,
            loading: true,
        }
    }

    pub fn known(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            loading: false,
        }
    }
}
