//! Application configuration options

use std::fmt;
use std::time::Duration;

use crate::deploy::{builder, git, proxy, publisher};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{Environment, Settings, StoreBackend};
use crate::workers::{queue, reaper};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Persistence backend
    pub store: StoreOptions,

    /// Filesystem roots
    pub layout: StorageLayout,

    /// Shell used for install/build command lines
    pub shell: String,

    pub git: git::Options,

    pub builder: builder::Options,

    pub publisher: publisher::Options,

    pub proxy: proxy::Options,

    pub queue: queue::Options,

    /// Enable the stale deployment sweep
    pub enable_reaper: bool,

    pub reaper: reaper::Options,

    /// Enable the trigger API
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            store: StoreOptions::default(),
            layout: StorageLayout::default(),
            shell: "sh".to_string(),
            git: git::Options::default(),
            builder: builder::Options::default(),
            publisher: publisher::Options::default(),
            proxy: proxy::Options::default(),
            queue: queue::Options::default(),
            enable_reaper: true,
            reaper: reaper::Options::default(),
            enable_server: true,
            server: ServerOptions::default(),
        }
    }
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            store: StoreOptions {
                backend: settings.store.backend,
                url: settings.store.url.clone(),
                service_key: settings.store.service_key.clone(),
            },
            layout: StorageLayout::from(&settings.paths),
            shell: settings.build.shell.clone(),
            git: git::Options {
                host: settings.git.host.clone(),
                clone_timeout: Duration::from_secs(settings.git.clone_timeout_secs),
            },
            builder: builder::Options {
                install_timeout: Duration::from_secs(settings.build.install_timeout_secs),
                build_timeout: Duration::from_secs(settings.build.build_timeout_secs),
            },
            publisher: publisher::Options {
                base_domain: settings.publish.base_domain.clone(),
                url_scheme: settings.publish.url_scheme.clone(),
            },
            proxy: proxy::Options {
                enabled: settings.environment == Environment::Production
                    && settings.proxy.enabled,
                sites_available: settings.proxy.sites_available.clone(),
                sites_enabled: settings.proxy.sites_enabled.clone(),
                validate_command: settings.proxy.validate_command.clone(),
                reload_command: settings.proxy.reload_command.clone(),
                command_timeout: Duration::from_secs(settings.proxy.command_timeout_secs),
            },
            queue: match settings.workers.slots {
                Some(slots) => queue::Options { slots },
                None => queue::Options::default(),
            },
            enable_reaper: settings.reaper.enabled,
            reaper: reaper::Options {
                interval: Duration::from_secs(settings.reaper.interval_secs),
                stale_after: Duration::from_secs(settings.reaper.stale_after_secs),
                ..Default::default()
            },
            enable_server: settings.server.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
        }
    }
}

/// Lifecycle options for the service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown. Covers in-flight deployments
    /// recording their cancellation.
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Persistence backend options
#[derive(Clone, Default)]
pub struct StoreOptions {
    pub backend: StoreBackend,
    pub url: String,
    pub service_key: Option<String>,
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("backend", &self.backend)
            .field("url", &self.url)
            .field("service_key", &self.service_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Trigger API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_only_enabled_in_production() {
        let mut settings = Settings::default();
        settings.proxy.enabled = true;
        assert!(!AppOptions::from(&settings).proxy.enabled);

        settings.environment = Environment::Production;
        assert!(AppOptions::from(&settings).proxy.enabled);

        settings.proxy.enabled = false;
        assert!(!AppOptions::from(&settings).proxy.enabled);
    }

    #[test]
    fn test_explicit_slots() {
        let mut settings = Settings::default();
        settings.workers.slots = Some(3);
        assert_eq!(AppOptions::from(&settings).queue.slots, 3);
    }

    #[test]
    fn test_service_key_not_in_debug_output() {
        let options = StoreOptions {
            backend: StoreBackend::Supabase,
            url: "https://xyz.supabase.co".to_string(),
            service_key: Some("super-secret".to_string()),
        };
        let debug = format!("{:?}", options);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[redacted]"));
    }
}
