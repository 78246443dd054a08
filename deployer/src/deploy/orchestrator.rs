//! Drives a deployment through its stages and records every transition

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::deploy::builder::{BuildContext, Builder};
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::git::SourceFetcher;
use crate::deploy::log::DeploymentLog;
use crate::deploy::publisher::{ProxyOutcome, Publisher};
use crate::errors::DeployError;
use crate::models::{Deployment, DeploymentStatus, ProjectStatus, ProjectUpdate, StatusUpdate};
use crate::storage::layout::StorageLayout;
use crate::store::DeploymentStore;

/// Final result of one deployment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployOutcome {
    pub success: bool,
    pub deployment_id: String,
    pub status: DeploymentStatus,
    pub url: Option<String>,
    pub error: Option<String>,
    /// Stage the attempt was in when it failed
    pub failed_stage: Option<DeploymentStatus>,
}

/// Mutable bookkeeping of a running attempt, readable after a panic
struct Progress {
    fsm: Mutex<DeploymentFsm>,
    /// Project id and its status before the attempt, once loaded
    project: Mutex<Option<(String, ProjectStatus)>>,
    /// The new site is live
    published: AtomicBool,
}

impl Progress {
    fn new() -> Self {
        Self {
            fsm: Mutex::new(DeploymentFsm::new()),
            project: Mutex::new(None),
            published: AtomicBool::new(false),
        }
    }

    fn published(&self) -> bool {
        self.published.load(Ordering::SeqCst)
    }

    fn set_published(&self) {
        self.published.store(true, Ordering::SeqCst);
    }

    fn fsm(&self) -> DeploymentFsm {
        self.fsm.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_fsm(&self, fsm: DeploymentFsm) {
        *self.fsm.lock().unwrap_or_else(|e| e.into_inner()) = fsm;
    }

    fn project(&self) -> Option<(String, ProjectStatus)> {
        self.project.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_project(&self, id: &str, status: ProjectStatus) {
        *self.project.lock().unwrap_or_else(|e| e.into_inner()) = Some((id.to_string(), status));
    }
}

pub struct DeploymentOrchestrator {
    store: Arc<dyn DeploymentStore>,
    fetcher: Arc<dyn SourceFetcher>,
    builder: Builder,
    publisher: Publisher,
    layout: StorageLayout,
}

impl DeploymentOrchestrator {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        fetcher: Arc<dyn SourceFetcher>,
        builder: Builder,
        publisher: Publisher,
        layout: StorageLayout,
    ) -> Self {
        Self {
            store,
            fetcher,
            builder,
            publisher,
            layout,
        }
    }

    pub fn store(&self) -> &Arc<dyn DeploymentStore> {
        &self.store
    }

    /// Create the `pending` deployment row
    pub async fn begin(&self, project_id: &str) -> Result<Deployment, DeployError> {
        let deployment = self.store.create_deployment(project_id).await?;
        info!(deployment_id = %deployment.id, project_id, "Deployment created");
        Ok(deployment)
    }

    /// Create a deployment and run it to a terminal status
    pub async fn deploy_project(&self, project_id: &str) -> Result<DeployOutcome, DeployError> {
        let deployment = self.begin(project_id).await?;
        Ok(self.run(deployment, CancellationToken::new()).await)
    }

    /// Run a created deployment. Errors and panics end in `failed`, a
    /// cancelled token ends in `cancelled`. Publishing is never interrupted;
    /// a cancel that arrives during it is recorded once it is done.
    pub async fn run(&self, deployment: Deployment, cancel: CancellationToken) -> DeployOutcome {
        let log = DeploymentLog::resume(
            &deployment.id,
            &deployment.build_log,
            &deployment.deploy_log,
        );
        let progress = Progress::new();

        let result = AssertUnwindSafe(self.pipeline(&deployment, &log, &progress, &cancel))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(url)) => DeployOutcome {
                success: true,
                deployment_id: deployment.id.clone(),
                status: DeploymentStatus::Success,
                url: Some(url),
                error: None,
                failed_stage: None,
            },
            Ok(Err(DeployError::Cancelled)) => self.finish_cancelled(&deployment, &log, &progress).await,
            Ok(Err(e)) => self.finish_failed(&deployment, &log, &progress, e.to_string()).await,
            Err(panic) => {
                let message = format!("internal error: {}", panic_message(panic.as_ref()));
                self.finish_failed(&deployment, &log, &progress, message).await
            }
        };

        self.cleanup(&deployment.id).await;
        outcome
    }

    async fn pipeline(
        &self,
        deployment: &Deployment,
        log: &DeploymentLog,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<String, DeployError> {
        let id = deployment.id.as_str();

        let project = self
            .store
            .get_project(&deployment.project_id)
            .await?
            .ok_or_else(|| {
                DeployError::NotFound(format!("project {} does not exist", deployment.project_id))
            })?;
        progress.set_project(&project.id, project.status);
        self.store
            .update_project(&project.id, ProjectUpdate::status(ProjectStatus::Building))
            .await?;

        checkpoint(cancel)?;
        self.advance(id, progress, log, DeploymentEvent::Clone).await?;
        let workspace = self.layout.workspace_dir(id)?;
        let commit = self
            .fetcher
            .fetch(&project, id, &workspace, log, cancel)
            .await?;

        checkpoint(cancel)?;
        self.advance(id, progress, log, DeploymentEvent::Build).await?;
        let domain = self.publisher.domain_for(&project);
        let ctx = BuildContext {
            project: &project,
            domain: &domain,
            public_url: self.publisher.public_url(&domain),
            commit_hash: Some(commit),
        };
        let output = self.builder.build(&ctx, &workspace, log, cancel).await?;

        if project.framework.is_none() {
            if let Some(framework) = &output.framework {
                self.store
                    .update_project(
                        &project.id,
                        ProjectUpdate {
                            framework: Some(framework.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }

        checkpoint(cancel)?;
        self.advance(id, progress, log, DeploymentEvent::Deploy).await?;
        let publication = self
            .publisher
            .deploy(
                &project,
                &output.artifact_dir,
                &domain,
                output.framework.as_deref(),
                log,
            )
            .await?;
        progress.set_published();

        self.advance(id, progress, log, DeploymentEvent::Configure).await?;
        let proxy = self
            .publisher
            .configure_proxy(&project, &publication, log, &CancellationToken::new())
            .await;
        debug!(deployment_id = id, ?proxy, "Proxy step done");
        if let ProxyOutcome::Failed(reason) = &proxy {
            warn!(deployment_id = id, "Continuing without proxy: {}", reason);
        }

        log.deploy_step(&format!("Deployment live at {}", publication.url));
        checkpoint(cancel)?;
        self.advance(id, progress, log, DeploymentEvent::Complete).await?;
        info!(deployment_id = id, project_id = %project.id, "Deployment succeeded: {}", publication.url);
        Ok(publication.url)
    }

    /// Validate the transition, then write it together with the current logs
    async fn advance(
        &self,
        deployment_id: &str,
        progress: &Progress,
        log: &DeploymentLog,
        event: DeploymentEvent,
    ) -> Result<DeploymentStatus, DeployError> {
        let mut fsm = progress.fsm();
        let status = fsm.process(event).map_err(DeployError::InvalidTransition)?;

        let (build_log, deploy_log) = log.snapshot();
        self.store
            .update_deployment_status(
                deployment_id,
                StatusUpdate::new(status).with_logs(build_log, deploy_log),
            )
            .await?;

        progress.set_fsm(fsm);
        debug!(deployment_id, "Deployment is now {}", status);
        Ok(status)
    }

    async fn finish_failed(
        &self,
        deployment: &Deployment,
        log: &DeploymentLog,
        progress: &Progress,
        message: String,
    ) -> DeployOutcome {
        error!(deployment_id = %deployment.id, "Deployment failed: {}", message);
        log.build_step(&format!("Error: {}", message));

        let mut fsm = progress.fsm();
        let stage = fsm.last_stage();
        if let Err(e) = fsm.process(DeploymentEvent::Fail(message.clone())) {
            warn!(deployment_id = %deployment.id, "{}", e);
        }
        self.write_terminal(&deployment.id, DeploymentStatus::Failed, log)
            .await;

        if let Some((project_id, _)) = progress.project() {
            self.set_project_status(&project_id, ProjectStatus::Error).await;
        }

        DeployOutcome {
            success: false,
            deployment_id: deployment.id.clone(),
            status: DeploymentStatus::Failed,
            url: None,
            error: Some(message),
            failed_stage: Some(stage),
        }
    }

    async fn finish_cancelled(
        &self,
        deployment: &Deployment,
        log: &DeploymentLog,
        progress: &Progress,
    ) -> DeployOutcome {
        info!(deployment_id = %deployment.id, "Deployment cancelled");
        log.build_step("Deployment cancelled");
        let published = progress.published();
        if published {
            log.deploy_step("Cancelled after publishing, the new site stays live");
        }

        let mut fsm = progress.fsm();
        if let Err(e) = fsm.process(DeploymentEvent::Cancel) {
            warn!(deployment_id = %deployment.id, "{}", e);
        }
        self.write_terminal(&deployment.id, DeploymentStatus::Cancelled, log)
            .await;

        // A published site keeps the status the publisher gave the project
        if let Some((project_id, previous)) = progress.project() {
            if !published {
                self.set_project_status(&project_id, previous).await;
            }
        }

        DeployOutcome {
            success: false,
            deployment_id: deployment.id.clone(),
            status: DeploymentStatus::Cancelled,
            url: None,
            error: Some(DeployError::Cancelled.to_string()),
            failed_stage: None,
        }
    }

    async fn write_terminal(&self, deployment_id: &str, status: DeploymentStatus, log: &DeploymentLog) {
        let (build_log, deploy_log) = log.snapshot();
        if let Err(e) = self
            .store
            .update_deployment_status(
                deployment_id,
                StatusUpdate::new(status).with_logs(build_log, deploy_log),
            )
            .await
        {
            error!(deployment_id, "Unable to record status {}: {}", status, e);
        }
    }

    async fn set_project_status(&self, project_id: &str, status: ProjectStatus) {
        if let Err(e) = self
            .store
            .update_project(project_id, ProjectUpdate::status(status))
            .await
        {
            warn!(project_id, "Unable to set project status {}: {}", status, e);
        }
    }

    async fn cleanup(&self, deployment_id: &str) {
        let workspace = match self.layout.workspace_dir(deployment_id) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(deployment_id, "No workspace to clean: {}", e);
                return;
            }
        };
        if let Err(e) = workspace.delete().await {
            warn!(deployment_id, "Unable to remove workspace: {}", e);
        }
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), DeployError> {
    if cancel.is_cancelled() {
        return Err(DeployError::Cancelled);
    }
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
