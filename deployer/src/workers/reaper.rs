//! Periodic sweep that fails deployments abandoned by a crashed process

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::deploy::log::DeploymentLog;
use crate::errors::DeployError;
use crate::models::{Deployment, DeploymentStatus, StatusUpdate};
use crate::workers::queue::DeployQueue;

/// Reaper worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,

    /// Time without progress after which an untracked non-terminal
    /// deployment is abandoned
    pub stale_after: Duration,

    /// Initial delay before the first sweep
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            stale_after: Duration::from_secs(3600),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Last observed state of each untracked non-terminal deployment.
///
/// Every status write carries the accumulated logs, so a change of status or
/// log length is progress. A deployment is first seen at the time of the
/// sweep that finds it; one queued in another process without writing
/// anything looks idle and is reaped once `stale_after` passes.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    seen: HashMap<String, Seen>,
}

#[derive(Debug)]
struct Seen {
    fingerprint: (DeploymentStatus, usize, usize),
    since: DateTime<Utc>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the last observed change of `deployment`
    pub fn last_progress(&mut self, deployment: &Deployment, now: DateTime<Utc>) -> DateTime<Utc> {
        let fingerprint = (
            deployment.status,
            deployment.build_log.len(),
            deployment.deploy_log.len(),
        );
        let seen = self
            .seen
            .entry(deployment.id.clone())
            .or_insert(Seen { fingerprint, since: now });
        if seen.fingerprint != fingerprint {
            seen.fingerprint = fingerprint;
            seen.since = now;
        }
        seen.since
    }

    /// Forget deployments that are no longer active
    fn retain(&mut self, active: &HashSet<String>) {
        self.seen.retain(|id, _| active.contains(id));
    }
}

/// Mark deployments without progress for `stale_after` failed. Deployments
/// this process is running are never touched. Returns the ids that were
/// reaped.
pub async fn sweep_once(
    queue: &DeployQueue,
    tracker: &mut ProgressTracker,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<String>, DeployError> {
    let stale_after = chrono::Duration::from_std(stale_after)
        .map_err(|e| DeployError::ConfigError(format!("invalid stale age: {}", e)))?;

    let active = queue.store().list_active_deployments().await?;
    let ids: HashSet<String> = active.iter().map(|d| d.id.clone()).collect();
    tracker.retain(&ids);

    let mut reaped = Vec::new();
    for deployment in active {
        if queue.is_tracking(&deployment.id) {
            continue;
        }
        let since = tracker.last_progress(&deployment, now);
        if now - since < stale_after {
            continue;
        }

        let log = DeploymentLog::resume(
            &deployment.id,
            &deployment.build_log,
            &deployment.deploy_log,
        );
        log.build_step(&format!(
            "Error: deployment abandoned while {}, no progress since {}",
            deployment.status,
            since.to_rfc3339()
        ));
        let (build_log, deploy_log) = log.snapshot();

        match queue
            .store()
            .update_deployment_status(
                &deployment.id,
                StatusUpdate::new(DeploymentStatus::Failed).with_logs(build_log, deploy_log),
            )
            .await
        {
            Ok(()) => {
                warn!(deployment_id = %deployment.id, "Reaped stale deployment");
                reaped.push(deployment.id);
            }
            Err(e) => error!(deployment_id = %deployment.id, "Unable to reap: {}", e),
        }
    }
    Ok(reaped)
}

/// Run the reaper worker
pub async fn run<S, F>(
    options: &Options,
    queue: &DeployQueue,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Reaper worker starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Reaper worker shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    let mut tracker = ProgressTracker::new();
    loop {
        debug!("Sweeping for stale deployments...");
        match sweep_once(queue, &mut tracker, options.stale_after, Utc::now()).await {
            Ok(reaped) if !reaped.is_empty() => {
                info!("Reaped {} stale deployments", reaped.len());
            }
            Ok(_) => {}
            Err(e) => {
                error!("Sweep failed: {}", e);
            }
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reaper worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_resets_on_change() {
        let mut tracker = ProgressTracker::new();
        let mut deployment = Deployment::pending("p1");
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::minutes(30);
        let t2 = t0 + chrono::Duration::minutes(90);

        assert_eq!(tracker.last_progress(&deployment, t0), t0);
        assert_eq!(tracker.last_progress(&deployment, t1), t0);

        deployment.status = DeploymentStatus::Building;
        deployment.build_log.push_str("npm run build\n");
        assert_eq!(tracker.last_progress(&deployment, t2), t2);
    }

    #[test]
    fn test_retain_forgets_finished() {
        let mut tracker = ProgressTracker::new();
        let deployment = Deployment::pending("p1");
        let t0 = Utc::now();
        tracker.last_progress(&deployment, t0);

        tracker.retain(&HashSet::new());
        let later = t0 + chrono::Duration::hours(2);
        assert_eq!(tracker.last_progress(&deployment, later), later);
    }
}
