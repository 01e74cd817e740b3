//! Finite state machine for a provisioning step

use serde::{Deserialize, Serialize};

/// Step state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// Not started
    Pending,

    /// Evaluating the idempotency predicate
    Checking,

    /// Install phase running
    Installing,

    /// Configure phase running
    Configuring,

    /// Finished successfully
    Completed,

    /// Disabled by the configuration
    Skipped,

    /// A phase failed
    Failed,

    /// Failed, then restored to the prior host state
    RolledBack,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed | StepState::Skipped | StepState::Failed | StepState::RolledBack
        )
    }
}

/// Step event
#[derive(Debug, Clone)]
pub enum StepEvent {
    /// Step is disabled
    Skip,

    /// Begin the idempotency check
    Check,

    /// Host lacks the component
    Install,

    /// Component present (or just installed), apply configuration
    Configure,

    /// Configuration applied
    Complete,

    /// A phase failed
    Fail(String),

    /// Rollback succeeded
    RollBack,
}

/// Step FSM
#[derive(Debug, Clone)]
pub struct StepFsm {
    state: StepState,
    error: Option<String>,
    installed: bool,
}

impl StepFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: StepState::Pending,
            error: None,
            installed: false,
        }
    }

    /// Get current state
    pub fn state(&self) -> StepState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the install phase ran
    pub fn installed(&self) -> bool {
        self.installed
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: StepEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            (StepState::Pending, StepEvent::Skip) => StepState::Skipped,
            (StepState::Pending, StepEvent::Check) => StepState::Checking,

            (StepState::Checking, StepEvent::Install) => {
                self.installed = true;
                StepState::Installing
            }
            (StepState::Checking, StepEvent::Configure) => StepState::Configuring,
            (StepState::Installing, StepEvent::Configure) => StepState::Configuring,
            (StepState::Configuring, StepEvent::Complete) => StepState::Completed,

            (StepState::Checking | StepState::Installing | StepState::Configuring, StepEvent::Fail(err)) => {
                self.error = Some(err.clone());
                StepState::Failed
            }

            (StepState::Failed, StepEvent::RollBack) => StepState::RolledBack,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for StepFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_transitions() {
        let mut fsm = StepFsm::new();
        assert_eq!(fsm.state(), StepState::Pending);

        fsm.process(StepEvent::Check).unwrap();
        fsm.process(StepEvent::Install).unwrap();
        assert_eq!(fsm.state(), StepState::Installing);

        fsm.process(StepEvent::Configure).unwrap();
        fsm.process(StepEvent::Complete).unwrap();
        assert_eq!(fsm.state(), StepState::Completed);
        assert!(fsm.installed());
    }

    #[test]
    fn test_fsm_error_handling() {
        let mut fsm = StepFsm::new();

        fsm.process(StepEvent::Check).unwrap();
        fsm.process(StepEvent::Configure).unwrap();
        fsm.process(StepEvent::Fail("sshd -t failed".to_string())).unwrap();

        assert_eq!(fsm.state(), StepState::Failed);
        assert_eq!(fsm.error(), Some("sshd -t failed"));
        assert!(!fsm.installed());
    }
}
