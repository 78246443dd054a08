//! Error types for the MadaHost deployer

use thiserror::Error;

use crate::deploy::command::CommandError;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Missing credentials: no GitHub access token stored for user {0}")]
    MissingCredentials(String),

    #[error("Clone failed: {0}")]
    CloneFailed(String),

    #[error("Install failed: {0}")]
    InstallFailed(#[source] CommandError),

    #[error("Build failed: {0}")]
    BuildFailed(#[source] CommandError),

    #[error("Staging failed: {0}")]
    StagingFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Proxy configuration failed: {0}")]
    ProxyConfigFailed(String),

    #[error("Workspace error: {0}")]
    WorkspaceError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Project {project_id} already has a deployment in progress")]
    AlreadyDeploying {
        project_id: String,
        deployment_id: Option<String>,
    },

    #[error("Deployment cancelled")]
    Cancelled,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
