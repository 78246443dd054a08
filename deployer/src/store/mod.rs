//! Persistence facade used by the pipeline

pub mod memory;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::DeployError;
use crate::models::{Deployment, Project, ProjectUpdate, StatusUpdate};

/// Deployment and project persistence
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a new deployment in `pending`
    async fn create_deployment(&self, project_id: &str) -> Result<Deployment, DeployError>;

    async fn get_deployment(&self, deployment_id: &str) -> Result<Option<Deployment>, DeployError>;

    /// Overwrite status (and logs, when present on the update)
    async fn update_deployment_status(
        &self,
        deployment_id: &str,
        update: StatusUpdate,
    ) -> Result<(), DeployError>;

    async fn set_commit_hash(&self, deployment_id: &str, hash: &str) -> Result<(), DeployError>;

    /// Most recent non-terminal deployment of a project, if any
    async fn find_active_deployment(
        &self,
        project_id: &str,
    ) -> Result<Option<Deployment>, DeployError>;

    /// Every non-terminal deployment
    async fn list_active_deployments(&self) -> Result<Vec<Deployment>, DeployError>;

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, DeployError>;

    async fn update_project(
        &self,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<(), DeployError>;
}

/// Source of per-user source-host access tokens
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn access_token(&self, user_id: &str) -> Result<Option<SecretString>, DeployError>;
}
