//! Bounded deployment queue.
//!
//! Submissions are admitted one per project: a project with a queued or
//! running deployment in this process, or a non-terminal row in the store,
//! is rejected. Admitted deployments wait for one of `slots` build slots in
//! FIFO order and run on their own task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deploy::log::DeploymentLog;
use crate::deploy::orchestrator::{DeployOutcome, DeploymentOrchestrator};
use crate::errors::DeployError;
use crate::models::{DeploymentStatus, StatusUpdate};
use crate::store::DeploymentStore;

/// Queue options
#[derive(Debug, Clone)]
pub struct Options {
    /// Concurrent builds
    pub slots: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            slots: crate::utils::default_worker_slots(),
        }
    }
}

/// What a cancel request did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "status", rename_all = "snake_case")]
pub enum CancelResult {
    /// The running task was signalled and will record `cancelled` itself
    Signalled,
    /// Not running here; the row was marked `cancelled`
    Recorded,
    /// Already terminal
    AlreadyFinished(DeploymentStatus),
}

#[derive(Default)]
struct Tracking {
    /// project id -> deployment id (None while being admitted)
    projects: HashMap<String, Option<String>>,
    /// deployment id -> cancel token
    deployments: HashMap<String, CancellationToken>,
    closed: bool,
}

type Shared = Arc<Mutex<Tracking>>;

fn lock(tracking: &Shared) -> std::sync::MutexGuard<'_, Tracking> {
    tracking.lock().unwrap_or_else(|e| e.into_inner())
}

/// Holds a project's admission slot; released on drop
struct Reservation {
    tracking: Shared,
    project_id: String,
    deployment_id: Option<String>,
}

impl Reservation {
    fn bind(&mut self, deployment_id: &str, cancel: CancellationToken) {
        let mut tracking = lock(&self.tracking);
        tracking
            .projects
            .insert(self.project_id.clone(), Some(deployment_id.to_string()));
        tracking
            .deployments
            .insert(deployment_id.to_string(), cancel);
        self.deployment_id = Some(deployment_id.to_string());
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut tracking = lock(&self.tracking);
        tracking.projects.remove(&self.project_id);
        if let Some(id) = &self.deployment_id {
            tracking.deployments.remove(id);
        }
    }
}

/// A submitted deployment
pub struct DeployHandle {
    pub deployment_id: String,
    pub project_id: String,
    cancel: CancellationToken,
    outcome: oneshot::Receiver<DeployOutcome>,
}

impl DeployHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the deployment to reach a terminal status
    pub async fn wait(self) -> Result<DeployOutcome, DeployError> {
        self.outcome.await.map_err(|_| {
            DeployError::Internal(format!(
                "deployment {} ended without an outcome",
                self.deployment_id
            ))
        })
    }
}

pub struct DeployQueue {
    orchestrator: Arc<DeploymentOrchestrator>,
    slots: Arc<Semaphore>,
    tracking: Shared,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DeployQueue {
    pub fn new(orchestrator: Arc<DeploymentOrchestrator>, options: Options) -> Self {
        let slots = options.slots.max(1);
        info!("Deploy queue with {} build slots", slots);
        Self {
            orchestrator,
            slots: Arc::new(Semaphore::new(slots)),
            tracking: Arc::new(Mutex::new(Tracking::default())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DeploymentStore> {
        self.orchestrator.store()
    }

    fn reserve(&self, project_id: &str) -> Result<Reservation, DeployError> {
        let mut tracking = lock(&self.tracking);
        if tracking.closed {
            return Err(DeployError::ShutdownError(
                "deploy queue is shutting down".to_string(),
            ));
        }
        if let Some(current) = tracking.projects.get(project_id) {
            return Err(DeployError::AlreadyDeploying {
                project_id: project_id.to_string(),
                deployment_id: current.clone(),
            });
        }
        tracking.projects.insert(project_id.to_string(), None);

        Ok(Reservation {
            tracking: self.tracking.clone(),
            project_id: project_id.to_string(),
            deployment_id: None,
        })
    }

    /// Admit a deployment of `project_id`. Returns once the `pending` row
    /// exists; the build runs in the background.
    pub async fn submit(&self, project_id: &str) -> Result<DeployHandle, DeployError> {
        let mut reservation = self.reserve(project_id)?;

        if self.store().get_project(project_id).await?.is_none() {
            return Err(DeployError::NotFound(format!("project {}", project_id)));
        }
        if let Some(active) = self.store().find_active_deployment(project_id).await? {
            return Err(DeployError::AlreadyDeploying {
                project_id: project_id.to_string(),
                deployment_id: Some(active.id),
            });
        }

        let deployment = self.orchestrator.begin(project_id).await?;
        let cancel = CancellationToken::new();
        reservation.bind(&deployment.id, cancel.clone());

        let (tx, rx) = oneshot::channel();
        let handle = DeployHandle {
            deployment_id: deployment.id.clone(),
            project_id: project_id.to_string(),
            cancel: cancel.clone(),
            outcome: rx,
        };

        let orchestrator = self.orchestrator.clone();
        let slots = self.slots.clone();
        let task = tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = slots.acquire_owned() => permit.ok(),
            };
            debug!(deployment_id = %deployment.id, "Build slot acquired: {}", permit.is_some());

            let outcome = orchestrator.run(deployment, cancel).await;
            drop(permit);
            drop(reservation);

            if tx.send(outcome).is_err() {
                debug!("Deployment outcome dropped, nobody waiting");
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);

        Ok(handle)
    }

    /// Submit and wait for the terminal outcome
    pub async fn deploy_and_wait(&self, project_id: &str) -> Result<DeployOutcome, DeployError> {
        self.submit(project_id).await?.wait().await
    }

    /// Whether `deployment_id` is queued or running in this process
    pub fn is_tracking(&self, deployment_id: &str) -> bool {
        lock(&self.tracking).deployments.contains_key(deployment_id)
    }

    /// Cancel a deployment. In-process deployments are signalled; others
    /// are marked `cancelled` in the store if still non-terminal.
    pub async fn cancel(&self, deployment_id: &str) -> Result<CancelResult, DeployError> {
        if let Some(token) = lock(&self.tracking).deployments.get(deployment_id) {
            token.cancel();
            info!(deployment_id, "Cancellation signalled");
            return Ok(CancelResult::Signalled);
        }

        let deployment = self
            .store()
            .get_deployment(deployment_id)
            .await?
            .ok_or_else(|| DeployError::NotFound(format!("deployment {}", deployment_id)))?;
        if deployment.is_terminal() {
            return Ok(CancelResult::AlreadyFinished(deployment.status));
        }

        let log = DeploymentLog::resume(
            &deployment.id,
            &deployment.build_log,
            &deployment.deploy_log,
        );
        log.build_step("Deployment cancelled");
        let (build_log, deploy_log) = log.snapshot();
        self.store()
            .update_deployment_status(
                deployment_id,
                StatusUpdate::new(DeploymentStatus::Cancelled).with_logs(build_log, deploy_log),
            )
            .await?;

        info!(deployment_id, "Marked deployment cancelled");
        Ok(CancelResult::Recorded)
    }

    /// Stop admitting, cancel everything in flight and wait for the tasks to
    /// record their terminal status
    pub async fn shutdown(&self) {
        let tokens: Vec<CancellationToken> = {
            let mut tracking = lock(&self.tracking);
            tracking.closed = true;
            tracking.deployments.values().cloned().collect()
        };
        if !tokens.is_empty() {
            warn!("Cancelling {} in-flight deployments", tokens.len());
        }
        for token in tokens {
            token.cancel();
        }

        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Deployment task failed: {}", e);
            }
        }
        info!("Deploy queue stopped");
    }
}
