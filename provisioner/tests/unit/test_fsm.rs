//! Step FSM tests

use escprov::pipeline::fsm::{StepEvent, StepFsm, StepState};

#[test]
fn test_fsm_initial_state() {
    let fsm = StepFsm::new();
    assert_eq!(fsm.state(), StepState::Pending);
    assert!(fsm.error().is_none());
    assert!(!fsm.installed());
}

#[test]
fn test_fsm_already_installed_flow() {
    let mut fsm = StepFsm::new();

    fsm.process(StepEvent::Check).unwrap();
    assert_eq!(fsm.state(), StepState::Checking);

    // Checking -> Configuring, no install
    fsm.process(StepEvent::Configure).unwrap();
    fsm.process(StepEvent::Complete).unwrap();
    assert_eq!(fsm.state(), StepState::Completed);
    assert!(!fsm.installed());
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_fsm_skip() {
    let mut fsm = StepFsm::new();
    fsm.process(StepEvent::Skip).unwrap();
    assert_eq!(fsm.state(), StepState::Skipped);
    assert!(fsm.process(StepEvent::Check).is_err());
}

#[test]
fn test_fsm_rollback_after_failure() {
    let mut fsm = StepFsm::new();

    fsm.process(StepEvent::Check).unwrap();
    fsm.process(StepEvent::Install).unwrap();
    fsm.process(StepEvent::Fail("apt-get exited with 100".to_string())).unwrap();
    assert_eq!(fsm.state(), StepState::Failed);
    assert_eq!(fsm.error(), Some("apt-get exited with 100"));

    fsm.process(StepEvent::RollBack).unwrap();
    assert_eq!(fsm.state(), StepState::RolledBack);
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = StepFsm::new();

    // Cannot configure before checking
    assert!(fsm.process(StepEvent::Configure).is_err());

    // Cannot roll back a step that has not failed
    fsm.process(StepEvent::Check).unwrap();
    assert!(fsm.process(StepEvent::RollBack).is_err());

    // Completed is final
    fsm.process(StepEvent::Configure).unwrap();
    fsm.process(StepEvent::Complete).unwrap();
    assert!(fsm.process(StepEvent::Fail("late".to_string())).is_err());
    assert_eq!(fsm.state(), StepState::Completed);
}
