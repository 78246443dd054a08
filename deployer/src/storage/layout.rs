//! Storage layout configuration

use std::path::{Path, PathBuf};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::tree::{ensure_within, safe_segment};
use crate::storage::settings::PathSettings;

/// Name of the metadata record kept next to staged artifacts
pub const METADATA_FILE: &str = ".deployment.json";

/// Filesystem roots of the pipeline
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Served static sites, one directory per project
    pub public_root: PathBuf,

    /// Staged build output, one directory per project
    pub artifact_root: PathBuf,

    /// Ephemeral clones, one directory per deployment
    pub workspace_root: PathBuf,
}

impl StorageLayout {
    /// Create a layout with all three roots under `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            public_root: base_dir.join("public"),
            artifact_root: base_dir.join("artifacts"),
            workspace_root: base_dir.join("workspaces"),
        }
    }

    /// Served directory of a project
    pub fn public_dir(&self, project_id: &str) -> Result<Dir, DeployError> {
        keyed(&self.public_root, project_id)
    }

    /// Artifact directory of a project
    pub fn artifact_dir(&self, project_id: &str) -> Result<Dir, DeployError> {
        keyed(&self.artifact_root, project_id)
    }

    /// Workspace of a deployment
    pub fn workspace_dir(&self, deployment_id: &str) -> Result<Dir, DeployError> {
        keyed(&self.workspace_root, deployment_id)
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), DeployError> {
        Dir::new(&self.public_root).create().await?;
        Dir::new(&self.artifact_root).create().await?;
        Dir::new(&self.workspace_root).create().await?;
        Ok(())
    }
}

fn keyed(root: &Path, key: &str) -> Result<Dir, DeployError> {
    let path = root.join(safe_segment(key)?);
    ensure_within(root, &path)?;
    Ok(Dir::new(path))
}

impl From<&PathSettings> for StorageLayout {
    fn from(paths: &PathSettings) -> Self {
        Self {
            public_root: paths.public_root.clone(),
            artifact_root: paths.artifact_root.clone(),
            workspace_root: paths.workspace_root.clone(),
        }
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::from(&PathSettings::default())
    }
}
