//! Provisioning step contract

use async_trait::async_trait;

use crate::config::DeploymentConfig;
use crate::errors::ProvisionError;
use crate::pipeline::context::StepContext;

/// What happens when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Failure aborts the pipeline
    Irreversible,
    /// Failure is rolled back and the pipeline continues
    Reversible,
}

/// Result of a successful step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// Finished in a degraded but safe way
    Recovered(String),
}

/// One idempotent unit of host provisioning.
///
/// `install` runs only when `is_installed` is false; `configure` runs on
/// every pass.
#[async_trait]
pub trait ProvisioningStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> StepKind {
        StepKind::Irreversible
    }

    fn enabled(&self, _config: &DeploymentConfig) -> bool {
        true
    }

    async fn is_installed(&self, _ctx: &mut StepContext<'_>) -> Result<bool, ProvisionError> {
        Ok(true)
    }

    async fn install(&self, _ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn configure(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, ProvisionError>;

    /// Undo whatever `configure` changed. Only called for reversible steps.
    async fn rollback(&self, _ctx: &mut StepContext<'_>) -> Result<(), ProvisionError> {
        Ok(())
    }
}
