//! Install, build and stage a workspace into the artifact directory

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::deploy::command::{CommandError, CommandRequest, CommandRunner, CommandSpec};
use crate::deploy::framework::{self, GENERIC};
use crate::deploy::log::DeploymentLog;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::tree::{self, SKIP_DIRS};
use crate::models::{BuildConfig, Project};
use crate::storage::layout::{StorageLayout, METADATA_FILE};

/// Builder options
#[derive(Debug, Clone)]
pub struct Options {
    pub install_timeout: Duration,
    pub build_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            install_timeout: Duration::from_secs(600),
            build_timeout: Duration::from_secs(900),
        }
    }
}

/// What a build will run, after merging project settings with detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub framework: Option<&'static str>,
    pub install_command: Option<String>,
    pub build_command: Option<String>,
    pub output_directory: String,
    /// Framework overlay for the build step
    pub framework_env: HashMap<String, String>,
}

fn explicit(command: &Option<String>) -> Option<Option<String>> {
    command.as_ref().map(|c| {
        let c = c.trim();
        (!c.is_empty()).then(|| c.to_string())
    })
}

impl BuildPlan {
    /// Explicit project values win. Without a manifest there is nothing to
    /// detect and nothing to install or build unless the project says so.
    pub fn resolve(config: &BuildConfig, manifest: Option<&str>) -> Self {
        let detection = manifest.map(framework::detect);
        let profile = detection.map(|d| d.profile).unwrap_or(&GENERIC);

        let default_command = |command: &'static str| detection.map(|_| command.to_string());

        Self {
            framework: detection.and_then(|d| d.framework),
            install_command: explicit(&config.install_command)
                .unwrap_or_else(|| default_command(profile.install_command)),
            build_command: explicit(&config.build_command)
                .unwrap_or_else(|| default_command(profile.build_command)),
            output_directory: config
                .output_directory
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or(profile.output_directory)
                .to_string(),
            framework_env: detection.map(|d| d.env()).unwrap_or_default(),
        }
    }
}

/// Inputs of a build besides the workspace
#[derive(Debug, Clone)]
pub struct BuildContext<'a> {
    pub project: &'a Project,
    pub domain: &'a str,
    pub public_url: String,
    pub commit_hash: Option<String>,
}

/// The `.deployment.json` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMetadata {
    pub project_id: String,
    pub project_name: String,
    pub framework: Option<String>,
    pub branch: String,
    pub build_command: Option<String>,
    pub deployed_at: DateTime<Utc>,
    pub domain: String,
    pub commit_hash: Option<String>,
    /// SHA-256 over the staged files, metadata excluded
    pub content_digest: String,
}

/// A staged build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub artifact_dir: Dir,
    pub framework: Option<String>,
    pub metadata: DeploymentMetadata,
}

/// Runs install and build, then stages the output
pub struct Builder {
    layout: StorageLayout,
    runner: Arc<dyn CommandRunner>,
    options: Options,
}

impl Builder {
    pub fn new(layout: StorageLayout, runner: Arc<dyn CommandRunner>, options: Options) -> Self {
        Self {
            layout,
            runner,
            options,
        }
    }

    pub async fn build(
        &self,
        ctx: &BuildContext<'_>,
        workspace: &Dir,
        log: &DeploymentLog,
        cancel: &CancellationToken,
    ) -> Result<BuildOutput, DeployError> {
        let project = ctx.project;
        let artifact_dir = self.layout.artifact_dir(&project.id)?;
        artifact_dir
            .recreate()
            .await
            .map_err(|e| DeployError::StagingFailed(e.to_string()))?;

        let manifest_file = workspace.file("package.json");
        let manifest = if manifest_file.exists().await {
            manifest_file.read_string().await.ok()
        } else {
            None
        };

        let plan = BuildPlan::resolve(&project.build, manifest.as_deref());
        match plan.framework {
            Some(name) => log.build_step(&format!("Detected framework: {}", name)),
            None if manifest.is_some() => log.build_step("No known framework detected, using defaults"),
            None => log.build_step("No package.json found, treating as a static site"),
        }

        let user_env: HashMap<String, String> = project
            .build
            .env
            .iter()
            .map(|v| (v.key.clone(), v.value.clone()))
            .collect();

        if let Some(install) = &plan.install_command {
            log.build_step(&format!("Installing dependencies: {}", install));
            let request = CommandRequest::new(CommandSpec::shell(install), workspace.path())
                .env(user_env.clone())
                .timeout(self.options.install_timeout);
            self.runner
                .execute(&request, log, cancel)
                .await
                .map_err(|e| command_error(e, DeployError::InstallFailed))?;
        }

        if let Some(build) = &plan.build_command {
            log.build_step(&format!("Building: {}", build));
            let request = CommandRequest::new(CommandSpec::shell(build), workspace.path())
                .env(build_env(&ctx.public_url, &plan.framework_env, &user_env))
                .timeout(self.options.build_timeout);
            self.runner
                .execute(&request, log, cancel)
                .await
                .map_err(|e| command_error(e, DeployError::BuildFailed))?;
        }

        self.stage(&plan, workspace, &artifact_dir, log).await?;

        let digest_root = artifact_dir.path().to_path_buf();
        let content_digest =
            tree::blocking(move || tree::digest_tree(&digest_root, &[METADATA_FILE]))
                .await
                .map_err(|e| DeployError::StagingFailed(e.to_string()))?;

        let metadata = DeploymentMetadata {
            project_id: project.id.clone(),
            project_name: project.name.clone(),
            framework: plan.framework.map(str::to_string),
            branch: project.branch.clone(),
            build_command: plan.build_command.clone(),
            deployed_at: Utc::now(),
            domain: ctx.domain.to_string(),
            commit_hash: ctx.commit_hash.clone(),
            content_digest,
        };
        artifact_dir
            .file(METADATA_FILE)
            .write_json(&metadata)
            .await
            .map_err(|e| DeployError::StagingFailed(e.to_string()))?;

        info!(project_id = %project.id, "Staged build into {}", artifact_dir.path().display());
        Ok(BuildOutput {
            artifact_dir,
            framework: metadata.framework.clone(),
            metadata,
        })
    }

    async fn stage(
        &self,
        plan: &BuildPlan,
        workspace: &Dir,
        artifact_dir: &Dir,
        log: &DeploymentLog,
    ) -> Result<(), DeployError> {
        let relative = tree::safe_relative_path(&plan.output_directory)
            .map_err(|e| DeployError::StagingFailed(e.to_string()))?;
        let source = Dir::new(workspace.path().join(&relative));
        let dest: PathBuf = artifact_dir.path().to_path_buf();

        let staged = if source.exists().await {
            log.build_step(&format!("Staging output directory {}", plan.output_directory));
            let src = source.path().to_path_buf();
            tree::blocking(move || tree::copy_tree(&src, &dest, SKIP_DIRS)).await
        } else {
            warn!(
                "Output directory {} not found, collecting static assets",
                plan.output_directory
            );
            log.build_step(&format!(
                "Output directory {} not found, collecting static assets",
                plan.output_directory
            ));
            let src = workspace.path().to_path_buf();
            tree::blocking(move || tree::collect_static_assets(&src, &dest)).await
        };
        let copied = staged.map_err(|e| DeployError::StagingFailed(e.to_string()))?;

        log.build_step(&format!("Staged {} files", copied));
        Ok(())
    }
}

/// `NODE_ENV`, `PUBLIC_URL` and `BASE_URL`, then the framework overlay, then user variables
pub fn build_env(
    public_url: &str,
    framework_env: &HashMap<String, String>,
    user_env: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env = HashMap::from([
        ("NODE_ENV".to_string(), "production".to_string()),
        ("PUBLIC_URL".to_string(), public_url.to_string()),
        ("BASE_URL".to_string(), "/".to_string()),
    ]);
    env.extend(framework_env.clone());
    env.extend(user_env.clone());
    env
}

fn command_error(e: CommandError, wrap: fn(CommandError) -> DeployError) -> DeployError {
    match e {
        CommandError::Cancelled => DeployError::Cancelled,
        other => wrap(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnvVar;

    #[test]
    fn test_plan_without_manifest_skips_commands() {
        let plan = BuildPlan::resolve(&BuildConfig::default(), None);
        assert_eq!(plan.framework, None);
        assert_eq!(plan.install_command, None);
        assert_eq!(plan.build_command, None);
        assert_eq!(plan.output_directory, "dist");
    }

    #[test]
    fn test_plan_explicit_values_win() {
        let config = BuildConfig {
            install_command: Some(String::new()),
            build_command: Some("make site".to_string()),
            output_directory: Some("public".to_string()),
            env: vec![],
        };
        let plan = BuildPlan::resolve(&config, Some(r#"{"dependencies":{"next":"14"}}"#));
        assert_eq!(plan.framework, Some("nextjs"));
        assert_eq!(plan.install_command, None);
        assert_eq!(plan.build_command.as_deref(), Some("make site"));
        assert_eq!(plan.output_directory, "public");
        assert_eq!(plan.framework_env.get("NEXT_TELEMETRY_DISABLED").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_plan_with_unknown_manifest_uses_generic() {
        let plan = BuildPlan::resolve(&BuildConfig::default(), Some("{}"));
        assert_eq!(plan.framework, None);
        assert_eq!(plan.install_command.as_deref(), Some("npm install"));
        assert_eq!(plan.build_command.as_deref(), Some("npm run build"));
    }

    #[test]
    fn test_build_env_precedence() {
        let framework_env = HashMap::from([("CI".to_string(), "false".to_string())]);
        let user: HashMap<String, String> = [EnvVar::new("NODE_ENV", "staging"), EnvVar::new("CI", "true")]
            .into_iter()
            .map(|v| (v.key, v.value))
            .collect();

        let env = build_env("https://demo-abc123.madahost.app", &framework_env, &user);
        assert_eq!(env["NODE_ENV"], "staging");
        assert_eq!(env["CI"], "true");
        assert_eq!(env["PUBLIC_URL"], "https://demo-abc123.madahost.app");
        assert_eq!(env["BASE_URL"], "/");
    }
}
