//! Accumulated build and deploy logs of a deployment

use std::sync::Mutex;

use chrono::Utc;
use tracing::debug;

use crate::deploy::command::{OutputObserver, OutputStream};

/// The two log texts of a deployment. Lines only ever get appended, so every
/// snapshot written to the store is a superset of the previous one.
pub struct DeploymentLog {
    deployment_id: String,
    build: Mutex<String>,
    deploy: Mutex<String>,
}

impl DeploymentLog {
    pub fn new(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            build: Mutex::new(String::new()),
            deploy: Mutex::new(String::new()),
        }
    }

    /// Resume from texts already stored on the deployment row
    pub fn resume(deployment_id: impl Into<String>, build: &str, deploy: &str) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            build: Mutex::new(build.to_string()),
            deploy: Mutex::new(deploy.to_string()),
        }
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Append a timestamped pipeline message to the build log
    pub fn build_step(&self, message: &str) {
        append(&self.build, &stamp(message));
    }

    /// Append a timestamped pipeline message to the deploy log
    pub fn deploy_step(&self, message: &str) {
        append(&self.deploy, &stamp(message));
    }

    pub fn build_log(&self) -> String {
        self.build.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn deploy_log(&self) -> String {
        self.deploy.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// (build, deploy)
    pub fn snapshot(&self) -> (String, String) {
        (self.build_log(), self.deploy_log())
    }
}

impl OutputObserver for DeploymentLog {
    fn on_line(&self, stream: OutputStream, line: &str) {
        debug!(deployment_id = %self.deployment_id, ?stream, "{}", line);
        append(&self.build, line);
    }
}

fn stamp(message: &str) -> String {
    format!("[{}] {}", Utc::now().format("%H:%M:%S"), message)
}

fn append(target: &Mutex<String>, line: &str) {
    let mut text = target.lock().unwrap_or_else(|e| e.into_inner());
    text.push_str(line);
    text.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_lands_in_build_log() {
        let log = DeploymentLog::new("d1");
        log.build_step("Cloning acme/demo");
        log.on_line(OutputStream::Stderr, "npm WARN deprecated");
        log.deploy_step("Published");

        let (build, deploy) = log.snapshot();
        assert!(build.contains("Cloning acme/demo"));
        assert!(build.ends_with("npm WARN deprecated\n"));
        assert!(deploy.contains("Published"));
        assert!(!deploy.contains("npm"));
    }

    #[test]
    fn test_resume_keeps_existing_text() {
        let log = DeploymentLog::resume("d1", "old build\n", "");
        log.build_step("more");
        assert!(log.build_log().starts_with("old build\n"));
    }
}
