//! Application state management

use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;

use crate::app::options::{AppOptions, StoreOptions};
use crate::deploy::builder::Builder;
use crate::deploy::command::{CommandRunner, ShellCommandRunner};
use crate::deploy::git::GitFetcher;
use crate::deploy::orchestrator::DeploymentOrchestrator;
use crate::deploy::proxy::ProxyConfigurator;
use crate::deploy::publisher::Publisher;
use crate::errors::DeployError;
use crate::http::SupabaseClient;
use crate::storage::settings::StoreBackend;
use crate::store::memory::MemoryStore;
use crate::store::{CredentialSource, DeploymentStore};
use crate::workers::queue::DeployQueue;

/// Main application state
pub struct AppState {
    /// Deployment and project persistence
    pub store: Arc<dyn DeploymentStore>,

    /// Admission and build slots
    pub queue: Arc<DeployQueue>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, DeployError> {
        info!("Initializing application state...");

        options.layout.setup().await?;

        let (store, credentials) = init_store(&options.store)?;
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellCommandRunner::new(&options.shell));

        let fetcher = Arc::new(GitFetcher::new(
            credentials,
            store.clone(),
            runner.clone(),
            options.git.clone(),
        ));
        let builder = Builder::new(options.layout.clone(), runner.clone(), options.builder.clone());
        let proxy = ProxyConfigurator::new(runner, options.proxy.clone());
        let publisher = Publisher::new(
            options.layout.clone(),
            store.clone(),
            proxy,
            options.publisher.clone(),
        );

        let orchestrator = Arc::new(DeploymentOrchestrator::new(
            store.clone(),
            fetcher,
            builder,
            publisher,
            options.layout.clone(),
        ));
        let queue = Arc::new(DeployQueue::new(orchestrator, options.queue.clone()));

        Ok(Self { store, queue })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), DeployError> {
        info!("Shutting down application state...");
        self.queue.shutdown().await;
        Ok(())
    }
}

type Stores = (Arc<dyn DeploymentStore>, Arc<dyn CredentialSource>);

fn init_store(options: &StoreOptions) -> Result<Stores, DeployError> {
    match options.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            let memory = Arc::new(MemoryStore::new());
            let store: Arc<dyn DeploymentStore> = memory.clone();
            let credentials: Arc<dyn CredentialSource> = memory;
            Ok((store, credentials))
        }
        StoreBackend::Supabase => {
            if options.url.is_empty() {
                return Err(DeployError::ConfigError(
                    "store.url is required for the supabase backend".to_string(),
                ));
            }
            let key = options.service_key.clone().ok_or_else(|| {
                DeployError::MissingCredentials("no Supabase service key configured".to_string())
            })?;

            info!("Using Supabase store at {}", options.url);
            let client = Arc::new(SupabaseClient::new(&options.url, SecretString::from(key))?);
            let store: Arc<dyn DeploymentStore> = client.clone();
            let credentials: Arc<dyn CredentialSource> = client;
            Ok((store, credentials))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supabase_requires_key() {
        let options = StoreOptions {
            backend: StoreBackend::Supabase,
            url: "https://xyz.supabase.co".to_string(),
            service_key: None,
        };
        assert!(matches!(
            init_store(&options),
            Err(DeployError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_supabase_requires_url() {
        let options = StoreOptions {
            backend: StoreBackend::Supabase,
            url: String::new(),
            service_key: Some("key".to_string()),
        };
        assert!(matches!(init_store(&options), Err(DeployError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_init_with_memory_store() {
        let root = tempfile::tempdir().unwrap();
        let options = AppOptions {
            layout: crate::storage::layout::StorageLayout::new(root.path()),
            ..Default::default()
        };

        let state = AppState::init(&options).await.unwrap();
        assert!(root.path().join("workspaces").is_dir());
        assert!(!state.queue.is_tracking("missing"));
        state.shutdown().await.unwrap();
    }
}
