//! In-memory store for local development and tests

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::errors::DeployError;
use crate::models::{Deployment, DeploymentStatus, Project, ProjectUpdate, StatusUpdate};
use crate::store::{CredentialSource, DeploymentStore};

#[derive(Default)]
struct Tables {
    projects: HashMap<String, Project>,
    deployments: HashMap<String, Deployment>,
    tokens: HashMap<String, String>,
    /// Every status written per deployment, in write order
    transitions: HashMap<String, Vec<DeploymentStatus>>,
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_project(&self, project: Project) {
        let mut tables = self.tables.write().await;
        tables.projects.insert(project.id.clone(), project);
    }

    pub async fn insert_deployment(&self, deployment: Deployment) {
        let mut tables = self.tables.write().await;
        tables
            .transitions
            .entry(deployment.id.clone())
            .or_default()
            .push(deployment.status);
        tables
            .deployments
            .insert(deployment.id.clone(), deployment);
    }

    pub async fn set_access_token(&self, user_id: &str, token: &str) {
        let mut tables = self.tables.write().await;
        tables
            .tokens
            .insert(user_id.to_string(), token.to_string());
    }

    /// Statuses written for a deployment, starting with `pending`
    pub async fn status_history(&self, deployment_id: &str) -> Vec<DeploymentStatus> {
        let tables = self.tables.read().await;
        tables
            .transitions
            .get(deployment_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn deployments_for(&self, project_id: &str) -> Vec<Deployment> {
        let tables = self.tables.read().await;
        let mut deployments: Vec<Deployment> = tables
            .deployments
            .values()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect();
        deployments.sort_by_key(|d| d.started_at);
        deployments
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn create_deployment(&self, project_id: &str) -> Result<Deployment, DeployError> {
        let deployment = Deployment::pending(project_id);
        self.insert_deployment(deployment.clone()).await;
        Ok(deployment)
    }

    async fn get_deployment(&self, deployment_id: &str) -> Result<Option<Deployment>, DeployError> {
        let tables = self.tables.read().await;
        Ok(tables.deployments.get(deployment_id).cloned())
    }

    async fn update_deployment_status(
        &self,
        deployment_id: &str,
        update: StatusUpdate,
    ) -> Result<(), DeployError> {
        let mut tables = self.tables.write().await;
        let deployment = tables
            .deployments
            .get_mut(deployment_id)
            .ok_or_else(|| DeployError::NotFound(format!("deployment {}", deployment_id)))?;
        update.apply(deployment);
        tables
            .transitions
            .entry(deployment_id.to_string())
            .or_default()
            .push(update.status);
        Ok(())
    }

    async fn set_commit_hash(&self, deployment_id: &str, hash: &str) -> Result<(), DeployError> {
        let mut tables = self.tables.write().await;
        let deployment = tables
            .deployments
            .get_mut(deployment_id)
            .ok_or_else(|| DeployError::NotFound(format!("deployment {}", deployment_id)))?;
        deployment.commit_hash = Some(hash.to_string());
        Ok(())
    }

    async fn find_active_deployment(
        &self,
        project_id: &str,
    ) -> Result<Option<Deployment>, DeployError> {
        let tables = self.tables.read().await;
        Ok(tables
            .deployments
            .values()
            .filter(|d| d.project_id == project_id && !d.is_terminal())
            .max_by_key(|d| d.started_at)
            .cloned())
    }

    async fn list_active_deployments(&self) -> Result<Vec<Deployment>, DeployError> {
        let tables = self.tables.read().await;
        Ok(tables
            .deployments
            .values()
            .filter(|d| !d.is_terminal())
            .cloned()
            .collect())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, DeployError> {
        let tables = self.tables.read().await;
        Ok(tables.projects.get(project_id).cloned())
    }

    async fn update_project(
        &self,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<(), DeployError> {
        let mut tables = self.tables.write().await;
        let project = tables
            .projects
            .get_mut(project_id)
            .ok_or_else(|| DeployError::NotFound(format!("project {}", project_id)))?;

        if let Some(domain) = update.domain {
            project.domain = Some(domain);
        }
        if let Some(status) = update.status {
            project.status = status;
        }
        if let Some(framework) = update.framework {
            project.framework = Some(framework);
        }
        if let Some(at) = update.last_deployed_at {
            project.last_deployed_at = Some(at);
        }
        project.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CredentialSource for MemoryStore {
    async fn access_token(&self, user_id: &str) -> Result<Option<SecretString>, DeployError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .get(user_id)
            .map(|t| SecretString::from(t.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectStatus;

    #[tokio::test]
    async fn test_active_deployment_lookup() {
        let store = MemoryStore::new();
        let first = store.create_deployment("p1").await.unwrap();
        assert_eq!(
            store.find_active_deployment("p1").await.unwrap().unwrap().id,
            first.id
        );

        store
            .update_deployment_status(&first.id, StatusUpdate::new(DeploymentStatus::Failed))
            .await
            .unwrap();
        assert!(store.find_active_deployment("p1").await.unwrap().is_none());
        assert!(store.list_active_deployments().await.unwrap().is_empty());

        let stored = store.get_deployment(&first.id).await.unwrap().unwrap();
        assert!(stored.completed_at.is_some());
        assert_eq!(
            store.status_history(&first.id).await,
            vec![DeploymentStatus::Pending, DeploymentStatus::Failed]
        );
    }

    #[tokio::test]
    async fn test_update_project_only_touches_given_fields() {
        let store = MemoryStore::new();
        let mut project = Project::new("u1", "demo", "acme/demo", "main");
        project.domain = Some("demo-abc123.madahost.app".to_string());
        let id = project.id.clone();
        store.insert_project(project).await;

        store
            .update_project(&id, ProjectUpdate::status(ProjectStatus::Building))
            .await
            .unwrap();

        let project = store.get_project(&id).await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Building);
        assert_eq!(project.domain.as_deref(), Some("demo-abc123.madahost.app"));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let store = MemoryStore::new();
        assert!(store.access_token("nobody").await.unwrap().is_none());
        store.set_access_token("u1", "tok").await;
        assert!(store.access_token("u1").await.unwrap().is_some());
    }
}
