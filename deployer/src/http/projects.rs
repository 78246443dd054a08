//! Project rows

use chrono::Utc;
use store_models::{ProjectPatch, ProjectRow};

use crate::errors::DeployError;
use crate::http::client::{eq, SupabaseClient};
use crate::models::{BuildConfig, EnvVar, Project, ProjectUpdate};

const TABLE: &str = "projects";
const DEFAULT_BRANCH: &str = "main";

impl SupabaseClient {
    /// Fetch a project by id
    pub async fn fetch_project(&self, project_id: &str) -> Result<Option<Project>, DeployError> {
        let rows: Vec<ProjectRow> = self.select(TABLE, &[eq("id", project_id)]).await?;
        rows.into_iter().next().map(project_from_row).transpose()
    }

    /// Patch the pipeline-owned columns of a project
    pub async fn patch_project(
        &self,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<(), DeployError> {
        let touched = self
            .update(TABLE, &[eq("id", project_id)], &project_patch(update))
            .await?;
        if touched == 0 {
            return Err(DeployError::NotFound(format!("project {}", project_id)));
        }
        Ok(())
    }
}

pub fn project_from_row(row: ProjectRow) -> Result<Project, DeployError> {
    Ok(Project {
        status: row.status.parse()?,
        id: row.id,
        user_id: row.user_id,
        name: row.name,
        repository: row.github_repo,
        branch: row
            .branch
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        build: BuildConfig {
            install_command: row.install_command,
            build_command: row.build_command,
            output_directory: row.output_directory,
            env: row
                .env_vars
                .unwrap_or_default()
                .into_iter()
                .map(|v| EnvVar::new(v.key, v.value))
                .collect(),
        },
        framework: row.framework,
        domain: row.domain,
        auto_deploy: row.auto_deploy.unwrap_or(false),
        created_at: row.created_at,
        updated_at: row.updated_at,
        last_deployed_at: row.last_deployed_at,
    })
}

pub fn project_patch(update: ProjectUpdate) -> ProjectPatch {
    ProjectPatch {
        domain: update.domain,
        status: update.status.map(|s| s.as_str().to_string()),
        framework: update.framework,
        last_deployed_at: update.last_deployed_at,
        updated_at: Utc::now(),
    }
}
