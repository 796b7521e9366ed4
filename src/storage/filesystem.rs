//! Local filesystem blob store.

use super::{Stat, Storage, StorageError, StorageResult, validate_path};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// Blob store rooted at a local directory. Paths are relative to the root;
/// parent directories are created on save.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> StorageResult<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

/// Map `io::ErrorKind::NotFound` onto [`StorageError::NotFound`].
fn not_found_or_io(path: &str, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io(err)
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    fn name(&self) -> &'static str {
        "fs"
    }

    #[instrument(skip(self), fields(storage = "fs"))]
    async fn open(&self, path: &str) -> StorageResult<Bytes> {
        let full = self.full_path(path)?;
        let data = fs::read(&full)
            .await
            .map_err(|e| not_found_or_io(path, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(storage = "fs", size = data.len()))]
    async fn save(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let full = self.full_path(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, &data).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(storage = "fs"))]
    async fn delete(&self, path: &str) -> StorageResult<()> {
        let full = self.full_path(path)?;
        fs::remove_file(&full)
            .await
            .map_err(|e| not_found_or_io(path, e))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let full = self.full_path(path)?;
        Ok(fs::try_exists(&full).await?)
    }

    async fn stat(&self, path: &str) -> StorageResult<Stat> {
        let full = self.full_path(path)?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|e| not_found_or_io(path, e))?;
        Ok(Stat {
            size: metadata.len(),
            modified: metadata.modified().ok().map(Into::into),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStorage::new(tmp.path());

        store
            .save("e8/9d/key.png", Bytes::from_static(b"data"))
            .await
            .unwrap();

        assert!(tmp.path().join("e8/9d/key.png").exists());
        assert_eq!(store.open("e8/9d/key.png").await.unwrap(), "data");
    }

    #[tokio::test]
    async fn stat_reports_size_and_mtime() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStorage::new(tmp.path());
        store.save("a.jpg", Bytes::from_static(b"12345")).await.unwrap();

        let stat = store.stat("a.jpg").await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(stat.modified.is_some());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStorage::new(tmp.path());
        assert!(matches!(
            store.delete("missing.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStorage::new(tmp.path().join("root"));
        assert!(matches!(
            store.save("../escape.png", Bytes::new()).await,
            Err(StorageError::InvalidPath(_))
        ));
    }
}
