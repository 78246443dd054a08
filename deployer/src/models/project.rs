//! Project models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Project lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Created,
    Active,
    Inactive,
    Building,
    Error,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Created => "created",
            ProjectStatus::Active => "active",
            ProjectStatus::Inactive => "inactive",
            ProjectStatus::Building => "building",
            ProjectStatus::Error => "error",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ProjectStatus::Created),
            "active" => Ok(ProjectStatus::Active),
            "inactive" => Ok(ProjectStatus::Inactive),
            "building" => Ok(ProjectStatus::Building),
            "error" => Ok(ProjectStatus::Error),
            other => Err(DeployError::ValidationError(format!(
                "unknown project status: {}",
                other
            ))),
        }
    }
}

/// A user-declared build environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Build configuration declared on a project.
///
/// `None` means "use the detected framework default". `Some("")` disables the step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub install_command: Option<String>,
    pub build_command: Option<String>,
    pub output_directory: Option<String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// A project connected to a GitHub repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Repository coordinate in `owner/repo` form
    pub repository: String,
    pub branch: String,
    pub build: BuildConfig,
    pub framework: Option<String>,
    pub domain: Option<String>,
    pub auto_deploy: bool,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_deployed_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Create a fresh project in the `created` state
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            repository: repository.into(),
            branch: branch.into(),
            build: BuildConfig::default(),
            framework: None,
            domain: None,
            auto_deploy: false,
            status: ProjectStatus::Created,
            created_at: now,
            updated_at: now,
            last_deployed_at: None,
        }
    }

    /// Parse the repository coordinate
    pub fn repo(&self) -> Result<RepoCoordinate, DeployError> {
        self.repository.parse()
    }
}

/// Fields the pipeline may change on a project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectUpdate {
    pub domain: Option<String>,
    pub status: Option<ProjectStatus>,
    pub framework: Option<String>,
    pub last_deployed_at: Option<DateTime<Utc>>,
}

impl ProjectUpdate {
    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// A validated `owner/repo` coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinate {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinate {
    /// URL path of the repository on the source host (`owner/repo.git`)
    pub fn clone_path(&self) -> String {
        format!("{}/{}.git", self.owner, self.name)
    }
}

impl fmt::Display for RepoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoCoordinate {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(".git");
        let mut parts = trimmed.split('/');
        let (owner, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => (owner, name),
            _ => {
                return Err(DeployError::ValidationError(format!(
                    "repository must be in owner/repo form: {}",
                    s
                )))
            }
        };

        for segment in [owner, name] {
            let valid_chars = segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if segment.is_empty() || segment == "." || segment == ".." || !valid_chars {
                return Err(DeployError::ValidationError(format!(
                    "invalid repository segment '{}' in {}",
                    segment, s
                )));
            }
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_coordinate_parse() {
        let repo: RepoCoordinate = "acme/demo".parse().unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "demo");
        assert_eq!(repo.clone_path(), "acme/demo.git");

        let repo: RepoCoordinate = "acme/demo.git".parse().unwrap();
        assert_eq!(repo.to_string(), "acme/demo");
    }

    #[test]
    fn test_repo_coordinate_rejects_traversal() {
        assert!("acme".parse::<RepoCoordinate>().is_err());
        assert!("acme/demo/extra".parse::<RepoCoordinate>().is_err());
        assert!("../demo".parse::<RepoCoordinate>().is_err());
        assert!("acme/..".parse::<RepoCoordinate>().is_err());
        assert!("acme/de mo".parse::<RepoCoordinate>().is_err());
        assert!("acme@evil.com/demo".parse::<RepoCoordinate>().is_err());
    }

    #[test]
    fn test_project_status_round_trip() {
        for status in [
            ProjectStatus::Created,
            ProjectStatus::Active,
            ProjectStatus::Inactive,
            ProjectStatus::Building,
            ProjectStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ProjectStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<ProjectStatus>().is_err());
    }
}
