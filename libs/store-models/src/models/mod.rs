//! Table rows and patch bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Environment variable declared on a project (`projects.env_vars` jsonb entries)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarRow {
    pub key: String,
    pub value: String,
}

/// A row of the `projects` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// `owner/repo`
    pub github_repo: String,
    /// Null or absent means the default branch
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub install_command: Option<String>,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub output_directory: Option<String>,
    #[serde(default)]
    pub env_vars: Option<Vec<EnvVarRow>>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub auto_deploy: Option<bool>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_deployed_at: Option<DateTime<Utc>>,
}

/// Partial update of a `projects` row. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A row of the `deployments` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRow {
    pub id: String,
    pub project_id: String,
    pub status: String,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub build_log: Option<String>,
    #[serde(default)]
    pub deploy_log: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Insert body for a new deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeploymentRow {
    pub id: String,
    pub project_id: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
}

/// Partial update of a `deployments` row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// The credential columns of a `users` row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTokenRow {
    pub id: String,
    #[serde(default)]
    pub github_access_token: Option<String>,
}

/// Error body returned by the REST gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_row_defaults() {
        let row: ProjectRow = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "user_id": "u1",
            "name": "demo",
            "github_repo": "acme/demo",
            "status": "created",
            "created_at": "2025-01-01T00:00:00+00:00",
            "updated_at": "2025-01-01T00:00:00+00:00"
        }))
        .unwrap();

        assert!(row.branch.is_none());
        assert!(row.domain.is_none());
        assert!(row.auto_deploy.is_none());
        assert!(row.env_vars.is_none());
    }

    #[test]
    fn test_project_row_accepts_nulls() {
        let row: ProjectRow = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "user_id": "u1",
            "name": "demo",
            "github_repo": "acme/demo",
            "branch": null,
            "install_command": null,
            "build_command": null,
            "output_directory": null,
            "env_vars": null,
            "framework": null,
            "domain": null,
            "auto_deploy": null,
            "status": "created",
            "created_at": "2025-01-01T00:00:00+00:00",
            "updated_at": "2025-01-01T00:00:00+00:00",
            "last_deployed_at": null
        }))
        .unwrap();

        assert!(row.branch.is_none());
        assert!(row.auto_deploy.is_none());
        assert!(row.last_deployed_at.is_none());
    }

    #[test]
    fn test_patch_skips_absent_fields() {
        let patch = DeploymentPatch {
            status: Some("cloning".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({ "status": "cloning" }));
    }
}
