//! Directory tree copy, asset collection and hashing.
//!
//! These walk with `walkdir` and are synchronous; async callers go through
//! [`blocking`]. Symlinks are never followed and never copied.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::errors::DeployError;

/// Directories never scanned for static assets
pub const SKIP_DIRS: &[&str] = &[".git", "node_modules"];

/// Extensions picked up by the static-asset fallback
pub const STATIC_EXTENSIONS: &[&str] = &[
    "html", "htm", "css", "js", "mjs", "json", "map", "txt", "xml", "webmanifest", "png", "jpg",
    "jpeg", "gif", "svg", "ico", "webp", "avif", "woff", "woff2", "ttf", "otf", "eot",
];

/// Run a blocking tree operation off the async runtime
pub async fn blocking<T, F>(f: F) -> Result<T, DeployError>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeployError::Internal(format!("filesystem task failed: {}", e)))?
        .map_err(DeployError::from)
}

fn is_excluded_root_entry(entry: &DirEntry, exclude_root: &[&str]) -> bool {
    entry.depth() == 1
        && entry
            .file_name()
            .to_str()
            .map(|name| exclude_root.contains(&name))
            .unwrap_or(false)
}

/// Recursively copy `src` into `dst`, skipping the top-level entries named in
/// `exclude_root`. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path, exclude_root: &[&str]) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;

    let walker = WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded_root_entry(e, exclude_root));

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        } else {
            debug!("Skipping non-regular entry {}", entry.path().display());
        }
    }

    Ok(copied)
}

pub fn is_static_asset(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| STATIC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIP_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Copy every static asset under `src` flat into `dst`. On name collisions the
/// first file in sorted walk order wins. Returns the number of files copied.
pub fn collect_static_assets(src: &Path, dst: &Path) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;

    let walker = WalkDir::new(src)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() || !is_static_asset(entry.path()) {
            continue;
        }

        let target = dst.join(entry.file_name());
        if target.exists() {
            debug!("Asset {} shadowed by an earlier file", entry.path().display());
            continue;
        }
        fs::copy(entry.path(), &target)?;
        copied += 1;
    }

    Ok(copied)
}

/// SHA-256 over every regular file under `root` (relative path and contents,
/// in sorted path order), ignoring the top-level entries in `exclude_root`.
pub fn digest_tree(root: &Path, exclude_root: &[&str]) -> io::Result<String> {
    let mut files = BTreeMap::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded_root_entry(e, exclude_root));

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key, entry.path().to_path_buf());
        }
    }

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    for (rel, path) in files {
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);

        let mut file = fs::File::open(&path)?;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        hasher.update([0u8]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Validate a user-supplied relative path: no root, no prefix, no `..`.
/// `.` components are dropped, so `"."` resolves to the empty path.
pub fn safe_relative_path(raw: &str) -> Result<PathBuf, DeployError> {
    let mut clean = PathBuf::new();
    for component in Path::new(raw.trim()).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(DeployError::ValidationError(format!(
                    "path must be relative and stay inside its root: {}",
                    raw
                )))
            }
        }
    }
    Ok(clean)
}

/// A single directory-name segment safe to join under a root
pub fn safe_segment(raw: &str) -> Result<&str, DeployError> {
    let valid = !raw.is_empty()
        && raw != "."
        && raw != ".."
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(raw)
    } else {
        Err(DeployError::ValidationError(format!(
            "invalid path segment: {:?}",
            raw
        )))
    }
}

/// Fail unless `path` lies under `root`, compared component-wise
pub fn ensure_within(root: &Path, path: &Path) -> Result<(), DeployError> {
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir));
    if escapes || !path.starts_with(root) {
        return Err(DeployError::ValidationError(format!(
            "{} is outside {}",
            path.display(),
            root.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_copy_tree_excludes_root_entries() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "index.html", "<h1>hi</h1>");
        write(src.path(), "assets/app.js", "console.log(1)");
        write(src.path(), ".deployment.json", "{}");
        write(src.path(), "nested/.deployment.json", "{}");

        let copied = copy_tree(src.path(), dst.path(), &[".deployment.json"]).unwrap();
        assert_eq!(copied, 3);
        assert!(dst.path().join("assets/app.js").is_file());
        assert!(!dst.path().join(".deployment.json").exists());
        assert!(dst.path().join("nested/.deployment.json").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_skips_symlinks() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "index.html", "ok");
        std::os::unix::fs::symlink("/etc/passwd", src.path().join("passwd")).unwrap();

        copy_tree(src.path(), dst.path(), &[]).unwrap();
        assert!(!dst.path().join("passwd").exists());
    }

    #[test]
    fn test_collect_static_assets_flattens_and_skips() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "index.html", "root");
        write(src.path(), "css/site.css", "body{}");
        write(src.path(), "README.md", "# readme");
        write(src.path(), "node_modules/pkg/index.js", "x");
        write(src.path(), ".git/config.json", "{}");

        let copied = collect_static_assets(src.path(), dst.path()).unwrap();
        assert_eq!(copied, 2);
        assert!(dst.path().join("site.css").is_file());
        assert!(!dst.path().join("README.md").exists());
        assert!(!dst.path().join("index.js").exists());
    }

    #[test]
    fn test_digest_ignores_metadata_and_tracks_content() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "index.html", "a");
        let first = digest_tree(root.path(), &[".deployment.json"]).unwrap();

        write(root.path(), ".deployment.json", "{\"at\":1}");
        assert_eq!(first, digest_tree(root.path(), &[".deployment.json"]).unwrap());

        write(root.path(), "index.html", "b");
        assert_ne!(first, digest_tree(root.path(), &[".deployment.json"]).unwrap());
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(safe_relative_path("dist").unwrap(), PathBuf::from("dist"));
        assert_eq!(
            safe_relative_path("./.output/public").unwrap(),
            PathBuf::from(".output/public")
        );
        assert_eq!(safe_relative_path(".").unwrap(), PathBuf::new());
        assert!(safe_relative_path("../etc").is_err());
        assert!(safe_relative_path("/etc").is_err());
        assert!(safe_relative_path("dist/../../x").is_err());
    }

    #[test]
    fn test_safe_segment_and_within() {
        assert!(safe_segment("3f2c-aa").is_ok());
        assert!(safe_segment("..").is_err());
        assert!(safe_segment("a/b").is_err());
        assert!(ensure_within(Path::new("/srv/www"), Path::new("/srv/www/p1")).is_ok());
        assert!(ensure_within(Path::new("/srv/www"), Path::new("/srv/www/../etc")).is_err());
        assert!(ensure_within(Path::new("/srv/www"), Path::new("/srv/wwwx")).is_err());
    }
}
