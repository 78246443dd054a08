//! Deployment rows

use store_models::{DeploymentPatch, DeploymentRow, NewDeploymentRow};

use crate::errors::DeployError;
use crate::http::client::{eq, Filter, SupabaseClient};
use crate::models::{Deployment, DeploymentStatus, StatusUpdate};

const TABLE: &str = "deployments";

impl SupabaseClient {
    /// Insert a new `pending` deployment
    pub async fn insert_deployment(&self, project_id: &str) -> Result<Deployment, DeployError> {
        let fresh = Deployment::pending(project_id);
        let body = NewDeploymentRow {
            id: fresh.id,
            project_id: fresh.project_id,
            status: fresh.status.as_str().to_string(),
            started_at: fresh.started_at,
        };
        let row: DeploymentRow = self.insert(TABLE, &body).await?;
        deployment_from_row(row)
    }

    /// Fetch a deployment by id
    pub async fn fetch_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<Option<Deployment>, DeployError> {
        let rows: Vec<DeploymentRow> = self.select(TABLE, &[eq("id", deployment_id)]).await?;
        rows.into_iter().next().map(deployment_from_row).transpose()
    }

    /// Patch a deployment row
    pub async fn patch_deployment(
        &self,
        deployment_id: &str,
        patch: &DeploymentPatch,
    ) -> Result<(), DeployError> {
        let touched = self.update(TABLE, &[eq("id", deployment_id)], patch).await?;
        if touched == 0 {
            return Err(DeployError::NotFound(format!("deployment {}", deployment_id)));
        }
        Ok(())
    }

    /// Non-terminal deployments, newest first, optionally for a single project
    pub async fn fetch_active_deployments(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<Deployment>, DeployError> {
        let mut filters: Vec<Filter> = vec![
            ("status", format!("in.({})", active_list())),
            ("order", "started_at.desc".to_string()),
        ];
        if let Some(project_id) = project_id {
            filters.push(eq("project_id", project_id));
        }

        let rows: Vec<DeploymentRow> = self.select(TABLE, &filters).await?;
        rows.into_iter().map(deployment_from_row).collect()
    }
}

fn active_list() -> String {
    DeploymentStatus::active()
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn deployment_from_row(row: DeploymentRow) -> Result<Deployment, DeployError> {
    Ok(Deployment {
        status: row.status.parse()?,
        id: row.id,
        project_id: row.project_id,
        commit_hash: row.commit_hash,
        build_log: row.build_log.unwrap_or_default(),
        deploy_log: row.deploy_log.unwrap_or_default(),
        started_at: row.started_at,
        completed_at: row.completed_at,
    })
}

pub fn status_patch(update: StatusUpdate) -> DeploymentPatch {
    DeploymentPatch {
        status: Some(update.status.as_str().to_string()),
        commit_hash: None,
        build_log: update.build_log,
        deploy_log: update.deploy_log,
        completed_at: update.completed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_list() {
        assert_eq!(active_list(), "pending,cloning,building,deploying,configuring");
    }

    #[test]
    fn test_terminal_patch_has_completion() {
        let patch = status_patch(
            StatusUpdate::new(DeploymentStatus::Failed).with_build_log("boom\n".to_string()),
        );
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["build_log"], "boom\n");
        assert!(value.get("deploy_log").is_none());
        assert!(value.get("completed_at").is_some());
    }
}
