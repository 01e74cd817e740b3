//! Provisioning pipeline

pub mod context;
pub mod executor;
pub mod fsm;
pub mod step;
pub mod steps;

pub use context::StepContext;
pub use executor::{Pipeline, PipelineResult};
pub use step::{ProvisioningStep, StepKind, StepOutcome};
