//! FSM unit tests

use madahost::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use madahost::models::DeploymentStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentStatus::Pending);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.history(), &[DeploymentStatus::Pending]);
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut fsm = DeploymentFsm::new();

    assert_eq!(fsm.process(DeploymentEvent::Clone).unwrap(), DeploymentStatus::Cloning);
    assert_eq!(fsm.process(DeploymentEvent::Build).unwrap(), DeploymentStatus::Building);
    assert_eq!(fsm.process(DeploymentEvent::Deploy).unwrap(), DeploymentStatus::Deploying);
    assert_eq!(
        fsm.process(DeploymentEvent::Configure).unwrap(),
        DeploymentStatus::Configuring
    );
    assert_eq!(fsm.process(DeploymentEvent::Complete).unwrap(), DeploymentStatus::Success);
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_fsm_failure_records_stage() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::Clone).unwrap();
    fsm.process(DeploymentEvent::Build).unwrap();
    fsm.process(DeploymentEvent::Fail("npm exited with 1".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), DeploymentStatus::Failed);
    assert_eq!(fsm.error(), Some("npm exited with 1"));
    assert_eq!(fsm.last_stage(), DeploymentStatus::Building);
}

#[test]
fn test_fsm_cancel_from_pending() {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::Cancel).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Cancelled);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_terminal_states_are_final() {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::Cancel).unwrap();

    assert!(fsm.process(DeploymentEvent::Clone).is_err());
    assert!(fsm.process(DeploymentEvent::Fail("late".to_string())).is_err());
    assert!(fsm.process(DeploymentEvent::Cancel).is_err());
    assert_eq!(fsm.state(), DeploymentStatus::Cancelled);
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeploymentFsm::new();

    // Cannot skip stages
    assert!(fsm.process(DeploymentEvent::Build).is_err());
    assert!(fsm.process(DeploymentEvent::Complete).is_err());
    assert_eq!(fsm.state(), DeploymentStatus::Pending);
}
