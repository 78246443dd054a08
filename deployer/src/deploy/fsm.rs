//! Finite State Machine for a deployment attempt

use crate::models::deployment::DeploymentStatus;

/// Deployment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// Start fetching the repository
    Clone,

    /// Start install + build
    Build,

    /// Start publishing files
    Deploy,

    /// Start reverse-proxy configuration
    Configure,

    /// Pipeline completed
    Complete,

    /// A stage failed
    Fail(String),

    /// Explicit user cancellation
    Cancel,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
    history: Vec<DeploymentStatus>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: DeploymentStatus::Pending,
            error: None,
            history: vec![DeploymentStatus::Pending],
        }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[DeploymentStatus] {
        &self.history
    }

    /// The last non-terminal state, i.e. the stage a failure happened in
    pub fn last_stage(&self) -> DeploymentStatus {
        self.history
            .iter()
            .rev()
            .find(|s| !s.is_terminal())
            .copied()
            .unwrap_or(DeploymentStatus::Pending)
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, String> {
        let new_state = match (&self.state, &event) {
            (DeploymentStatus::Pending, DeploymentEvent::Clone) => DeploymentStatus::Cloning,
            (DeploymentStatus::Cloning, DeploymentEvent::Build) => DeploymentStatus::Building,
            (DeploymentStatus::Building, DeploymentEvent::Deploy) => DeploymentStatus::Deploying,
            (DeploymentStatus::Deploying, DeploymentEvent::Configure) => {
                DeploymentStatus::Configuring
            }
            (DeploymentStatus::Configuring, DeploymentEvent::Complete) => {
                DeploymentStatus::Success
            }

            // Any non-terminal state may fail or be cancelled
            (state, DeploymentEvent::Fail(err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                DeploymentStatus::Failed
            }
            (state, DeploymentEvent::Cancel) if !state.is_terminal() => {
                DeploymentStatus::Cancelled
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_transitions() {
        let mut fsm = DeploymentFsm::new();
        assert_eq!(fsm.state(), DeploymentStatus::Pending);

        fsm.process(DeploymentEvent::Clone).unwrap();
        fsm.process(DeploymentEvent::Build).unwrap();
        fsm.process(DeploymentEvent::Deploy).unwrap();
        fsm.process(DeploymentEvent::Configure).unwrap();
        fsm.process(DeploymentEvent::Complete).unwrap();

        assert_eq!(fsm.state(), DeploymentStatus::Success);
        assert_eq!(
            fsm.history(),
            &[
                DeploymentStatus::Pending,
                DeploymentStatus::Cloning,
                DeploymentStatus::Building,
                DeploymentStatus::Deploying,
                DeploymentStatus::Configuring,
                DeploymentStatus::Success,
            ]
        );
    }

    #[test]
    fn test_fsm_error_handling() {
        let mut fsm = DeploymentFsm::new();

        fsm.process(DeploymentEvent::Clone).unwrap();
        fsm.process(DeploymentEvent::Fail("test error".to_string()))
            .unwrap();

        assert_eq!(fsm.state(), DeploymentStatus::Failed);
        assert_eq!(fsm.error(), Some("test error"));
        assert_eq!(fsm.last_stage(), DeploymentStatus::Cloning);
    }
}
