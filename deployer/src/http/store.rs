//! Store traits on top of the Supabase client

use async_trait::async_trait;
use secrecy::SecretString;
use store_models::DeploymentPatch;

use crate::errors::DeployError;
use crate::http::client::SupabaseClient;
use crate::http::deployments::status_patch;
use crate::models::{Deployment, Project, ProjectUpdate, StatusUpdate};
use crate::store::{CredentialSource, DeploymentStore};

#[async_trait]
impl DeploymentStore for SupabaseClient {
    async fn create_deployment(&self, project_id: &str) -> Result<Deployment, DeployError> {
        self.insert_deployment(project_id).await
    }

    async fn get_deployment(&self, deployment_id: &str) -> Result<Option<Deployment>, DeployError> {
        self.fetch_deployment(deployment_id).await
    }

    async fn update_deployment_status(
        &self,
        deployment_id: &str,
        update: StatusUpdate,
    ) -> Result<(), DeployError> {
        self.patch_deployment(deployment_id, &status_patch(update))
            .await
    }

    async fn set_commit_hash(&self, deployment_id: &str, hash: &str) -> Result<(), DeployError> {
        let patch = DeploymentPatch {
            commit_hash: Some(hash.to_string()),
            ..Default::default()
        };
        self.patch_deployment(deployment_id, &patch).await
    }

    async fn find_active_deployment(
        &self,
        project_id: &str,
    ) -> Result<Option<Deployment>, DeployError> {
        let active = self.fetch_active_deployments(Some(project_id)).await?;
        Ok(active.into_iter().next())
    }

    async fn list_active_deployments(&self) -> Result<Vec<Deployment>, DeployError> {
        self.fetch_active_deployments(None).await
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, DeployError> {
        self.fetch_project(project_id).await
    }

    async fn update_project(
        &self,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<(), DeployError> {
        self.patch_project(project_id, update).await
    }
}

#[async_trait]
impl CredentialSource for SupabaseClient {
    async fn access_token(&self, user_id: &str) -> Result<Option<SecretString>, DeployError> {
        self.fetch_access_token(user_id).await
    }
}
