//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists (symlinks are not followed)
    pub async fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DeployError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DeployError> {
        match fs::remove_dir_all(&self.path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }

    /// Delete and create again, empty
    pub async fn recreate(&self) -> Result<(), DeployError> {
        self.delete().await?;
        self.create().await
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Sibling directory with `suffix` appended to the name
    pub fn sibling(&self, suffix: &str) -> Dir {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        Dir::new(self.path.with_file_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recreate_empties_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = Dir::new(root.path().join("p1"));
        dir.create().await.unwrap();
        dir.file("old.txt").write_string("x").await.unwrap();

        dir.recreate().await.unwrap();
        assert!(dir.exists().await);
        assert!(!dir.file("old.txt").exists().await);
    }

    #[test]
    fn test_sibling() {
        let dir = Dir::new("/srv/public/p1");
        assert_eq!(dir.sibling(".staging").path(), Path::new("/srv/public/p1.staging"));
    }
}
