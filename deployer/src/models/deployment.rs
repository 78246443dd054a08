//! Deployment models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Deployment status, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Cloning,
    Building,
    Deploying,
    Configuring,
    Success,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Cloning => "cloning",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Configuring => "configuring",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }

    /// All non-terminal statuses
    pub fn active() -> &'static [DeploymentStatus] {
        &[
            DeploymentStatus::Pending,
            DeploymentStatus::Cloning,
            DeploymentStatus::Building,
            DeploymentStatus::Deploying,
            DeploymentStatus::Configuring,
        ]
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeploymentStatus::Pending),
            "cloning" => Ok(DeploymentStatus::Cloning),
            "building" => Ok(DeploymentStatus::Building),
            "deploying" => Ok(DeploymentStatus::Deploying),
            "configuring" => Ok(DeploymentStatus::Configuring),
            "success" => Ok(DeploymentStatus::Success),
            "failed" => Ok(DeploymentStatus::Failed),
            "cancelled" => Ok(DeploymentStatus::Cancelled),
            other => Err(DeployError::ValidationError(format!(
                "unknown deployment status: {}",
                other
            ))),
        }
    }
}

/// One attempt to build and publish a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub project_id: String,
    pub status: DeploymentStatus,
    pub commit_hash: Option<String>,
    pub build_log: String,
    pub deploy_log: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// A new deployment in the `pending` state
    pub fn pending(project_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            status: DeploymentStatus::Pending,
            commit_hash: None,
            build_log: String::new(),
            deploy_log: String::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A status write. Logs replace the stored text; the caller sends the full log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: DeploymentStatus,
    pub build_log: Option<String>,
    pub deploy_log: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    /// Completion time is stamped exactly when the status is terminal.
    pub fn new(status: DeploymentStatus) -> Self {
        Self {
            status,
            build_log: None,
            deploy_log: None,
            completed_at: status.is_terminal().then(Utc::now),
        }
    }

    pub fn with_logs(mut self, build_log: String, deploy_log: String) -> Self {
        self.build_log = Some(build_log);
        self.deploy_log = Some(deploy_log);
        self
    }

    pub fn with_build_log(mut self, build_log: String) -> Self {
        self.build_log = Some(build_log);
        self
    }

    /// Apply this update to an in-memory deployment
    pub fn apply(&self, deployment: &mut Deployment) {
        deployment.status = self.status;
        if let Some(log) = &self.build_log {
            deployment.build_log = log.clone();
        }
        if let Some(log) = &self.deploy_log {
            deployment.deploy_log = log.clone();
        }
        if self.completed_at.is_some() {
            deployment.completed_at = self.completed_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses_stamp_completion() {
        assert!(StatusUpdate::new(DeploymentStatus::Success).completed_at.is_some());
        assert!(StatusUpdate::new(DeploymentStatus::Failed).completed_at.is_some());
        assert!(StatusUpdate::new(DeploymentStatus::Cancelled).completed_at.is_some());
        for status in DeploymentStatus::active() {
            assert!(StatusUpdate::new(*status).completed_at.is_none());
        }
    }

    #[test]
    fn test_apply_keeps_logs_when_absent() {
        let mut deployment = Deployment::pending("p1");
        deployment.build_log = "cloned\n".to_string();

        StatusUpdate::new(DeploymentStatus::Building).apply(&mut deployment);
        assert_eq!(deployment.status, DeploymentStatus::Building);
        assert_eq!(deployment.build_log, "cloned\n");
        assert!(deployment.completed_at.is_none());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "configuring".parse::<DeploymentStatus>().unwrap(),
            DeploymentStatus::Configuring
        );
        assert!("queued".parse::<DeploymentStatus>().is_err());
    }
}
