//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Environment variable consulted when the settings file has no service key
pub const SERVICE_KEY_ENV: &str = "SUPABASE_SERVICE_KEY";

/// Environment variable consulted when the settings file has no store URL
pub const STORE_URL_ENV: &str = "SUPABASE_URL";

/// Deployer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    pub log_json: bool,

    /// Directory for daily-rolling log files. No file logging when absent.
    pub log_dir: Option<PathBuf>,

    pub environment: Environment,

    pub store: StoreSettings,

    pub paths: PathSettings,

    pub git: GitSettings,

    pub build: BuildSettings,

    pub publish: PublishSettings,

    pub proxy: ProxySettings,

    pub workers: WorkerSettings,

    pub reaper: ReaperSettings,

    pub server: ServerSettings,
}

impl Settings {
    /// Read settings from a JSON file, falling back to defaults when the
    /// file does not exist. Store credentials missing from the file are read
    /// from the environment.
    pub async fn load(path: &Path) -> Result<Self, DeployError> {
        let file = File::new(path);
        let mut settings = if file.exists().await {
            file.read_json::<Settings>().await.map_err(|e| {
                DeployError::ConfigError(format!("unable to read {}: {}", path.display(), e))
            })?
        } else {
            info!("No settings file at {}, using defaults", path.display());
            Settings::default()
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.store.service_key.is_none() {
            self.store.service_key = lookup(SERVICE_KEY_ENV).filter(|k| !k.is_empty());
        }
        if self.store.url.is_empty() {
            if let Some(url) = lookup(STORE_URL_ENV) {
                self.store.url = url;
            }
        }
    }
}

/// Deployment environment. Reverse-proxy activation only happens in production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Supabase,
}

/// Persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,

    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,

    /// Service-role key; never written back out
    #[serde(skip_serializing)]
    pub service_key: Option<String>,
}

/// Filesystem roots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub public_root: PathBuf,
    pub artifact_root: PathBuf,
    pub workspace_root: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            public_root: PathBuf::from("/var/www/madahost"),
            artifact_root: PathBuf::from("/var/lib/madahost/artifacts"),
            workspace_root: PathBuf::from("/var/lib/madahost/workspaces"),
        }
    }
}

/// Repository fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    /// Scheme and host of the source host
    pub host: String,
    pub clone_timeout_secs: u64,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            host: "https://github.com".to_string(),
            clone_timeout_secs: 300,
        }
    }
}

/// Install and build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub install_timeout_secs: u64,
    pub build_timeout_secs: u64,
    /// Shell used for install/build command lines
    pub shell: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            install_timeout_secs: 600,
            build_timeout_secs: 900,
            shell: "sh".to_string(),
        }
    }
}

/// Public URL settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    pub base_domain: String,
    pub url_scheme: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            base_domain: "madahost.app".to_string(),
            url_scheme: "https".to_string(),
        }
    }
}

/// nginx virtual-host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub enabled: bool,
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
    pub validate_command: String,
    pub reload_command: String,
    pub command_timeout_secs: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
            validate_command: "nginx -t".to_string(),
            reload_command: "nginx -s reload".to_string(),
            command_timeout_secs: 30,
        }
    }
}

/// Build pool settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Concurrent builds; CPU count when absent
    pub slots: Option<usize>,
}

/// Stale deployment sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub stale_after_secs: u64,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            stale_after_secs: 3600,
        }
    }
}

/// Trigger API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{ "environment": "production", "proxy": { "enabled": true }, "workers": { "slots": 2 } }"#,
        )
        .unwrap();

        assert_eq!(settings.environment, Environment::Production);
        assert!(settings.proxy.enabled);
        assert_eq!(settings.proxy.validate_command, "nginx -t");
        assert_eq!(settings.workers.slots, Some(2));
        assert_eq!(settings.git.host, "https://github.com");
        assert_eq!(settings.log_level, LogLevel::Info);
    }

    #[test]
    fn test_service_key_from_env_only_when_missing() {
        let mut settings = Settings::default();
        settings.apply_env(|key| (key == SERVICE_KEY_ENV).then(|| "from-env".to_string()));
        assert_eq!(settings.store.service_key.as_deref(), Some("from-env"));

        let mut settings = Settings::default();
        settings.store.service_key = Some("from-file".to_string());
        settings.apply_env(|_| Some("from-env".to_string()));
        assert_eq!(settings.store.service_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_service_key_not_serialized() {
        let mut settings = Settings::default();
        settings.store.service_key = Some("secret".to_string());
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("secret"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).await.unwrap();
        assert_eq!(settings.store.backend, StoreBackend::Memory);
    }
}
