//! Storage layout tests

use madahost::errors::DeployError;
use madahost::storage::layout::StorageLayout;

#[test]
fn test_keyed_directories() {
    let layout = StorageLayout::new("/srv/madahost");
    tokio_test::assert_ok!(layout.public_dir("0b6e3c1a-7f2d-4c59-9a0e-2d1f4b8c6e73"));
    tokio_test::assert_err!(layout.workspace_dir("../escape"));
    assert_eq!(
        layout.public_dir("p1").unwrap().path(),
        std::path::Path::new("/srv/madahost/public/p1")
    );
    assert_eq!(
        layout.artifact_dir("p1").unwrap().path(),
        std::path::Path::new("/srv/madahost/artifacts/p1")
    );
    assert_eq!(
        layout.workspace_dir("d1").unwrap().path(),
        std::path::Path::new("/srv/madahost/workspaces/d1")
    );
}

#[test]
fn test_rejects_traversal_keys() {
    let layout = StorageLayout::new("/srv/madahost");
    for key in ["..", "../etc", "a/b", ""] {
        assert!(
            matches!(layout.public_dir(key), Err(DeployError::ValidationError(_))),
            "{:?}",
            key
        );
    }
}

#[tokio::test]
async fn test_setup_creates_roots() {
    let root = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(root.path());
    layout.setup().await.unwrap();

    assert!(root.path().join("public").is_dir());
    assert!(root.path().join("artifacts").is_dir());
    assert!(root.path().join("workspaces").is_dir());
}
