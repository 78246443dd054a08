//! nginx virtual hosts for published sites

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::deploy::command::{CommandError, CommandRequest, CommandRunner, CommandSpec};
use crate::deploy::log::DeploymentLog;
use crate::errors::DeployError;
use crate::filesys::file::File;

/// Reverse proxy options
#[derive(Debug, Clone)]
pub struct Options {
    /// Only true in production with the proxy switched on
    pub enabled: bool,
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
    pub validate_command: String,
    pub reload_command: String,
    pub command_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enabled: false,
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
            validate_command: "nginx -t".to_string(),
            reload_command: "nginx -s reload".to_string(),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Render the server block serving `public_dir` under `domain`
pub fn render_server_block(domain: &str, public_dir: &Path) -> String {
    format!(
        r#"# Managed by madahost. Changes are overwritten on the next deployment.
server {{
    listen 80;
    listen [::]:80;
    server_name {domain};

    root "{root}";
    index index.html;

    location ~ /\. {{
        deny all;
        return 404;
    }}

    location / {{
        try_files $uri $uri/ /index.html;
    }}
}}
"#,
        domain = domain,
        root = public_dir.display(),
    )
}

fn valid_hostname(domain: &str) -> bool {
    !domain.is_empty()
        && domain.len() <= 253
        && domain
            .split('.')
            .all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && !label.starts_with('-')
                    && !label.ends_with('-')
                    && label
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            })
}

/// State of the files before a write, for rollback
struct Previous {
    config: Option<String>,
    link_existed: bool,
}

/// Writes, enables and activates virtual hosts
pub struct ProxyConfigurator {
    runner: Arc<dyn CommandRunner>,
    options: Options,
}

impl ProxyConfigurator {
    pub fn new(runner: Arc<dyn CommandRunner>, options: Options) -> Self {
        Self { runner, options }
    }

    pub fn enabled(&self) -> bool {
        self.options.enabled
    }

    /// Virtual host file of `domain`; one per assigned domain
    pub fn config_path(&self, domain: &str) -> PathBuf {
        self.options.sites_available.join(format!("{}.conf", domain))
    }

    pub fn link_path(&self, domain: &str) -> PathBuf {
        self.options.sites_enabled.join(format!("{}.conf", domain))
    }

    /// Write the virtual host for `domain`, enable it, validate and reload.
    /// A failed validation restores the previous files.
    pub async fn activate(
        &self,
        domain: &str,
        public_dir: &Path,
        log: &DeploymentLog,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DeployError> {
        if !valid_hostname(domain) {
            return Err(DeployError::ProxyConfigFailed(format!(
                "refusing to configure invalid hostname {:?}",
                domain
            )));
        }

        let config = File::new(self.config_path(domain));
        let link = self.link_path(domain);

        let previous = Previous {
            config: if config.exists().await {
                config.read_string().await.ok()
            } else {
                None
            },
            link_existed: tokio::fs::symlink_metadata(&link).await.is_ok(),
        };

        self.write(&config, &link, domain, public_dir)
            .await
            .map_err(|e| DeployError::ProxyConfigFailed(e.to_string()))?;
        log.deploy_step(&format!("Wrote proxy config {}", config.path().display()));

        if let Err(e) = self
            .run(&self.options.validate_command, log, cancel)
            .await
        {
            warn!("Proxy config for {} failed validation, rolling back", domain);
            self.rollback(&config, &link, previous).await;
            log.deploy_step("Proxy config rejected, previous configuration restored");
            return Err(DeployError::ProxyConfigFailed(format!("validation failed: {}", e)));
        }

        self.run(&self.options.reload_command, log, cancel)
            .await
            .map_err(|e| DeployError::ProxyConfigFailed(format!("reload failed: {}", e)))?;

        info!("Proxy activated for {}", domain);
        log.deploy_step(&format!("Proxy activated for {}", domain));
        Ok(config.path().to_path_buf())
    }

    async fn write(
        &self,
        config: &File,
        link: &Path,
        domain: &str,
        public_dir: &Path,
    ) -> Result<(), DeployError> {
        config
            .write_string(&render_server_block(domain, public_dir))
            .await?;

        tokio::fs::create_dir_all(&self.options.sites_enabled).await?;
        File::new(link).delete().await?;
        #[cfg(unix)]
        tokio::fs::symlink(config.path(), link).await?;
        #[cfg(not(unix))]
        tokio::fs::copy(config.path(), link).await.map(|_| ())?;
        Ok(())
    }

    async fn rollback(&self, config: &File, link: &Path, previous: Previous) {
        let restored = match previous.config {
            Some(contents) => config.write_string(&contents).await,
            None => config.delete().await,
        };
        if let Err(e) = restored {
            warn!("Unable to restore {}: {}", config.path().display(), e);
        }

        if !previous.link_existed {
            if let Err(e) = File::new(link).delete().await {
                warn!("Unable to remove {}: {}", link.display(), e);
            }
        }
    }

    async fn run(
        &self,
        command: &str,
        log: &DeploymentLog,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let request = CommandRequest::new(CommandSpec::shell(command), &self.options.sites_available)
            .timeout(self.options.command_timeout);

        match self.runner.execute(&request, log, cancel).await {
            Ok(_) => Ok(()),
            Err(e @ CommandError::Failed { .. }) => {
                let tail = e.stderr_tail(3);
                Err(if tail.is_empty() { e.to_string() } else { tail })
            }
            Err(e) => Err(e.to_string()),
        }
    }
}
