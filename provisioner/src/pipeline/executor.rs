//! Sequential step executor

use tracing::{error, info, warn};

use crate::collect::Tone;
use crate::errors::ProvisionError;
use crate::pipeline::context::StepContext;
use crate::pipeline::fsm::{StepEvent, StepFsm, StepState};
use crate::pipeline::step::{ProvisioningStep, StepKind, StepOutcome};
use crate::pipeline::steps;

/// Summary of one pipeline pass
#[derive(Debug, Default)]
pub struct PipelineResult {
    pub completed: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
    /// Steps whose install phase ran
    pub installed: Vec<&'static str>,
    pub rolled_back: Vec<&'static str>,
    pub failed_step: Option<&'static str>,
    pub warnings: Vec<String>,
    /// Final state of every step that was reached
    pub states: Vec<(&'static str, StepState)>,
    pub error: Option<ProvisionError>,
}

impl PipelineResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn state_of(&self, step: &str) -> Option<StepState> {
        self.states.iter().find(|(name, _)| *name == step).map(|(_, s)| *s)
    }
}

/// Runs provisioning steps in order
pub struct Pipeline {
    steps: Vec<Box<dyn ProvisioningStep>>,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn ProvisioningStep>>) -> Self {
        Self { steps }
    }

    /// The full provisioning pipeline
    pub fn standard() -> Self {
        Self::new(steps::all())
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step. Stops at the first irreversible failure.
    pub async fn run(&self, ctx: &mut StepContext<'_>) -> PipelineResult {
        let mut result = PipelineResult::default();
        ctx.refresh_ssh_port().await;

        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            let name = step.name();
            let mut fsm = StepFsm::new();

            if !step.enabled(&ctx.config) {
                let _ = fsm.process(StepEvent::Skip);
                info!("Skipping step {}", name);
                result.skipped.push(name);
                result.states.push((name, fsm.state()));
                continue;
            }

            ctx.prompter
                .show(Tone::Heading, &format!("[{}/{}] {}", index + 1, total, name));

            match run_step(step.as_ref(), ctx, &mut fsm).await {
                Ok(outcome) => {
                    if let StepOutcome::Recovered(message) = outcome {
                        ctx.warn(format!("{}: {}", name, message));
                    }
                    let _ = fsm.process(StepEvent::Complete);
                    if fsm.installed() {
                        result.installed.push(name);
                    }
                    result.completed.push(name);
                }
                Err(err) => {
                    let _ = fsm.process(StepEvent::Fail(err.to_string()));
                    if step.kind() == StepKind::Reversible && !matches!(err, ProvisionError::Cancelled) {
                        warn!("Step {} failed, rolling back: {}", name, err);
                        match step.rollback(ctx).await {
                            Ok(()) => {
                                let _ = fsm.process(StepEvent::RollBack);
                                ctx.warn(format!("{} was rolled back: {}", name, err));
                                result.rolled_back.push(name);
                                result.states.push((name, fsm.state()));
                                continue;
                            }
                            Err(rollback_err) => {
                                error!("Rollback of {} failed: {}", name, rollback_err);
                                result.failed_step = Some(name);
                                result.error = Some(ProvisionError::StepError {
                                    step: name.to_string(),
                                    message: format!("{}; rollback failed: {}", err, rollback_err),
                                    output: rollback_err.output().or(err.output()).map(str::to_string),
                                });
                                result.states.push((name, fsm.state()));
                                break;
                            }
                        }
                    }
                    error!("Step {} failed: {}", name, err);
                    result.failed_step = Some(name);
                    result.error = Some(err.in_step(name));
                    result.states.push((name, fsm.state()));
                    break;
                }
            }
            result.states.push((name, fsm.state()));
        }

        result.warnings = ctx.warnings.clone();
        result
    }
}

async fn run_step(
    step: &dyn ProvisioningStep,
    ctx: &mut StepContext<'_>,
    fsm: &mut StepFsm,
) -> Result<StepOutcome, ProvisionError> {
    let transition = |fsm: &mut StepFsm, event| fsm.process(event).map_err(ProvisionError::Internal);

    transition(fsm, StepEvent::Check)?;
    if step.is_installed(ctx).await? {
        info!("{} already installed", step.name());
    } else {
        transition(fsm, StepEvent::Install)?;
        info!("Installing {}", step.name());
        step.install(ctx).await?;
    }

    transition(fsm, StepEvent::Configure)?;
    step.configure(ctx).await
}
