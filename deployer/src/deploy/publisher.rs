//! Publishing staged artifacts to the served directory

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::deploy::domain::{derive_domain, new_disambiguator};
use crate::deploy::log::DeploymentLog;
use crate::deploy::proxy::ProxyConfigurator;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::tree;
use crate::models::{Project, ProjectStatus, ProjectUpdate};
use crate::storage::layout::{StorageLayout, METADATA_FILE};
use crate::store::DeploymentStore;

/// Publisher options
#[derive(Debug, Clone)]
pub struct Options {
    pub base_domain: String,
    pub url_scheme: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_domain: "madahost.app".to_string(),
            url_scheme: "https".to_string(),
        }
    }
}

/// Result of the copy/domain step
#[derive(Debug, Clone)]
pub struct Publication {
    pub domain: String,
    pub url: String,
    pub public_dir: Dir,
    /// True when the placeholder entry page was written
    pub synthesized_index: bool,
}

/// Result of the reverse-proxy step. Failures here never fail a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    Skipped,
    Activated(PathBuf),
    Failed(String),
}

pub struct Publisher {
    layout: StorageLayout,
    store: Arc<dyn DeploymentStore>,
    proxy: ProxyConfigurator,
    options: Options,
}

impl Publisher {
    pub fn new(
        layout: StorageLayout,
        store: Arc<dyn DeploymentStore>,
        proxy: ProxyConfigurator,
        options: Options,
    ) -> Self {
        Self {
            layout,
            store,
            proxy,
            options,
        }
    }

    /// The project's domain, or a freshly derived one when it has none
    pub fn domain_for(&self, project: &Project) -> String {
        match &project.domain {
            Some(domain) if !domain.is_empty() => domain.clone(),
            _ => derive_domain(&project.name, &new_disambiguator(), &self.options.base_domain),
        }
    }

    pub fn public_url(&self, domain: &str) -> String {
        format!("{}://{}", self.options.url_scheme, domain)
    }

    /// Copy the artifact into the served directory, replacing the previous
    /// tree in one swap, and record domain and status on the project.
    pub async fn deploy(
        &self,
        project: &Project,
        artifact_dir: &Dir,
        domain: &str,
        framework: Option<&str>,
        log: &DeploymentLog,
    ) -> Result<Publication, DeployError> {
        let public_dir = self.layout.public_dir(&project.id)?;
        let staging = public_dir.sibling(".staging");

        let synthesized_index = self
            .stage(project, artifact_dir, &staging, framework, log)
            .await
            .map_err(|e| DeployError::PublishFailed(e.to_string()))?;

        swap(&staging, &public_dir)
            .await
            .map_err(|e| DeployError::PublishFailed(e.to_string()))?;
        log.deploy_step(&format!("Published to {}", public_dir.path().display()));

        let assigned = project.domain.as_deref() != Some(domain);
        if assigned {
            log.deploy_step(&format!("Assigned domain {}", domain));
        }
        self.store
            .update_project(
                &project.id,
                ProjectUpdate {
                    domain: assigned.then(|| domain.to_string()),
                    status: Some(ProjectStatus::Active),
                    last_deployed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        let url = self.public_url(domain);
        info!(project_id = %project.id, "Published {}", url);
        Ok(Publication {
            domain: domain.to_string(),
            url,
            public_dir,
            synthesized_index,
        })
    }

    async fn stage(
        &self,
        project: &Project,
        artifact_dir: &Dir,
        staging: &Dir,
        framework: Option<&str>,
        log: &DeploymentLog,
    ) -> Result<bool, DeployError> {
        staging.recreate().await?;

        let src = artifact_dir.path().to_path_buf();
        let dst = staging.path().to_path_buf();
        let copied = tree::blocking(move || tree::copy_tree(&src, &dst, &[METADATA_FILE])).await?;
        log.deploy_step(&format!("Copied {} files", copied));

        let index = staging.file("index.html");
        if index.exists().await {
            return Ok(false);
        }

        index
            .write_string(&placeholder_page(&project.name, framework))
            .await?;
        log.deploy_step("No index.html in build output, generated a placeholder page");
        Ok(true)
    }

    /// Write and activate the virtual host when enabled
    pub async fn configure_proxy(
        &self,
        project: &Project,
        publication: &Publication,
        log: &DeploymentLog,
        cancel: &CancellationToken,
    ) -> ProxyOutcome {
        if !self.proxy.enabled() {
            log.deploy_step("Reverse proxy disabled, skipping");
            return ProxyOutcome::Skipped;
        }

        match self
            .proxy
            .activate(
                &publication.domain,
                publication.public_dir.path(),
                log,
                cancel,
            )
            .await
        {
            Ok(path) => ProxyOutcome::Activated(path),
            Err(e) => {
                warn!(project_id = %project.id, "Proxy configuration failed: {}", e);
                log.deploy_step(&format!("Warning: {}", e));
                ProxyOutcome::Failed(e.to_string())
            }
        }
    }

    /// Deploy and configure in one go; returns the public URL
    pub async fn publish(
        &self,
        project: &Project,
        artifact_dir: &Dir,
        log: &DeploymentLog,
        cancel: &CancellationToken,
    ) -> Result<String, DeployError> {
        let domain = self.domain_for(project);
        let publication = self
            .deploy(project, artifact_dir, &domain, project.framework.as_deref(), log)
            .await?;
        self.configure_proxy(project, &publication, log, cancel).await;
        Ok(publication.url)
    }
}

/// Replace `target` with `staging`. The old tree is moved aside first and
/// put back if the final rename fails.
async fn swap(staging: &Dir, target: &Dir) -> Result<(), DeployError> {
    let previous = target.sibling(".previous");
    previous.delete().await?;

    let had_previous = target.exists().await;
    if had_previous {
        tokio::fs::rename(target.path(), previous.path()).await?;
    }

    if let Err(e) = tokio::fs::rename(staging.path(), target.path()).await {
        if had_previous {
            if let Err(restore) = tokio::fs::rename(previous.path(), target.path()).await {
                warn!("Unable to restore {}: {}", target.path().display(), restore);
            }
        }
        return Err(e.into());
    }

    previous.delete().await?;
    Ok(())
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Entry page written when a build produced no `index.html`
pub fn placeholder_page(project_name: &str, framework: Option<&str>) -> String {
    let name = escape_html(project_name);
    let framework = escape_html(framework.unwrap_or("static"));
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{name}</title>
</head>
<body>
  <main>
    <h1>{name}</h1>
    <p>Deployed with MadaHost ({framework}).</p>
    <p>This build did not produce an index.html.</p>
  </main>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DeploymentStore;

    #[test]
    fn test_placeholder_is_escaped() {
        let page = placeholder_page("<script>alert('x')</script>", Some("vite"));
        assert!(page.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!page.contains("<script>"));
        assert!(page.contains("(vite)"));
    }

    #[tokio::test]
    async fn test_publish_assigns_domain_once() {
        use crate::deploy::command::ShellCommandRunner;
        use crate::store::memory::MemoryStore;

        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let store = Arc::new(MemoryStore::new());
        let project = Project::new("u1", "Landing Page", "octo/landing", "main");
        store.insert_project(project.clone()).await;

        let publisher = Publisher::new(
            layout.clone(),
            store.clone(),
            ProxyConfigurator::new(
                Arc::new(ShellCommandRunner::default()),
                crate::deploy::proxy::Options::default(),
            ),
            Options::default(),
        );

        let artifact = layout.artifact_dir(&project.id).unwrap();
        artifact.create().await.unwrap();
        artifact.file("index.html").write_string("<h1>hi</h1>").await.unwrap();
        artifact.file(METADATA_FILE).write_string("{}").await.unwrap();

        let log = DeploymentLog::new("d1");
        let url = publisher
            .publish(&project, &artifact, &log, &CancellationToken::new())
            .await
            .unwrap();

        let stored = store.get_project(&project.id).await.unwrap().unwrap();
        let domain = stored.domain.clone().unwrap();
        assert_eq!(url, format!("https://{}", domain));
        assert_eq!(stored.status, ProjectStatus::Active);

        let public = layout.public_dir(&project.id).unwrap();
        assert!(public.file("index.html").exists().await);
        assert!(!public.file(METADATA_FILE).exists().await);

        // A stored domain is reused
        let url_again = publisher
            .publish(&stored, &artifact, &log, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(url, url_again);
        assert!(log.deploy_log().contains("Reverse proxy disabled"));
    }

    #[tokio::test]
    async fn test_swap_replaces_tree() {
        let root = tempfile::tempdir().unwrap();
        let target = Dir::new(root.path().join("p1"));
        target.create().await.unwrap();
        target.file("old.html").write_string("old").await.unwrap();

        let staging = target.sibling(".staging");
        staging.create().await.unwrap();
        staging.file("index.html").write_string("new").await.unwrap();

        swap(&staging, &target).await.unwrap();
        assert!(target.file("index.html").exists().await);
        assert!(!target.file("old.html").exists().await);
        assert!(!staging.exists().await);
        assert!(!target.sibling(".previous").exists().await);
    }
}
