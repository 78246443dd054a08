//! Repository fetching

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::deploy::command::{
    CommandError, CommandRequest, CommandRunner, CommandSpec, NoopObserver,
};
use crate::deploy::log::DeploymentLog;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::{Project, RepoCoordinate};
use crate::store::{CredentialSource, DeploymentStore};

/// Brings a project's source into a workspace
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Populate `dest` with the project's branch and return the commit hash.
    /// The hash is persisted on the deployment before returning.
    async fn fetch(
        &self,
        project: &Project,
        deployment_id: &str,
        dest: &Dir,
        log: &DeploymentLog,
        cancel: &CancellationToken,
    ) -> Result<String, DeployError>;
}

/// Git fetcher options
#[derive(Debug, Clone)]
pub struct Options {
    /// Scheme and host of the source host
    pub host: String,
    pub clone_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: "https://github.com".to_string(),
            clone_timeout: Duration::from_secs(300),
        }
    }
}

/// Shallow-clones the project's branch with the owner's token
pub struct GitFetcher {
    credentials: Arc<dyn CredentialSource>,
    store: Arc<dyn DeploymentStore>,
    runner: Arc<dyn CommandRunner>,
    options: Options,
}

impl GitFetcher {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        store: Arc<dyn DeploymentStore>,
        runner: Arc<dyn CommandRunner>,
        options: Options,
    ) -> Self {
        Self {
            credentials,
            store,
            runner,
            options,
        }
    }

    async fn prepare(&self, dest: &Dir) -> Result<(), DeployError> {
        dest.delete().await?;
        if let Some(parent) = dest.path().parent() {
            Dir::new(parent).create().await?;
        }
        Ok(())
    }
}

/// `https://<token>@<host>/<owner>/<repo>.git`
pub fn clone_url(host: &str, repo: &RepoCoordinate, token: &str) -> Result<Url, DeployError> {
    let host = Url::parse(host)
        .map_err(|e| DeployError::ConfigError(format!("invalid git host {}: {}", host, e)))?;
    let mut url = host
        .join(&repo.clone_path())
        .map_err(|e| DeployError::ValidationError(format!("invalid clone URL: {}", e)))?;
    url.set_username(token)
        .map_err(|_| DeployError::ValidationError(format!("{} cannot carry credentials", host)))?;
    Ok(url)
}

fn clone_error(e: CommandError) -> DeployError {
    match e {
        CommandError::Cancelled => DeployError::Cancelled,
        CommandError::Failed { .. } => {
            let tail = e.stderr_tail(5);
            DeployError::CloneFailed(if tail.is_empty() { e.to_string() } else { tail })
        }
        other => DeployError::CloneFailed(other.to_string()),
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(
        &self,
        project: &Project,
        deployment_id: &str,
        dest: &Dir,
        log: &DeploymentLog,
        cancel: &CancellationToken,
    ) -> Result<String, DeployError> {
        let repo = project.repo()?;

        let token = self
            .credentials
            .access_token(&project.user_id)
            .await?
            .ok_or_else(|| DeployError::MissingCredentials(project.user_id.clone()))?;

        self.prepare(dest)
            .await
            .map_err(|e| DeployError::WorkspaceError(e.to_string()))?;

        let url = clone_url(&self.options.host, &repo, token.expose_secret())?;
        let work_dir = dest.path().parent().unwrap_or(dest.path());

        info!(deployment_id, "Cloning {} (branch {})", repo, project.branch);
        log.build_step(&format!("Cloning {} (branch {})", repo, project.branch));

        let clone = CommandRequest::new(
            CommandSpec::exec(
                "git",
                [
                    "clone".to_string(),
                    "--depth".to_string(),
                    "1".to_string(),
                    "--single-branch".to_string(),
                    "--branch".to_string(),
                    project.branch.clone(),
                    url.to_string(),
                    dest.path().to_string_lossy().into_owned(),
                ],
            ),
            work_dir,
        )
        .var("GIT_TERMINAL_PROMPT", "0")
        .timeout(self.options.clone_timeout)
        .secret(SecretString::from(token.expose_secret().to_string()))
        .secret(SecretString::from(url.to_string()));

        self.runner
            .execute(&clone, log, cancel)
            .await
            .map_err(clone_error)?;

        let rev_parse = CommandRequest::new(CommandSpec::exec("git", ["rev-parse", "HEAD"]), dest.path())
            .timeout(Duration::from_secs(30));
        let output = self
            .runner
            .execute(&rev_parse, &NoopObserver, cancel)
            .await
            .map_err(clone_error)?;

        let hash = output.stdout.trim().to_string();
        if hash.is_empty() {
            return Err(DeployError::CloneFailed(
                "git rev-parse returned no commit".to_string(),
            ));
        }
        debug!(deployment_id, "HEAD is {}", hash);

        self.store.set_commit_hash(deployment_id, &hash).await?;
        log.build_step(&format!("Checked out commit {}", short(&hash)));
        Ok(hash)
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(7)]
}
