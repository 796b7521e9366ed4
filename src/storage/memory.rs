//! In-process blob store.

use super::{Stat, Storage, StorageError, StorageResult, validate_path};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    modified: DateTime<Utc>,
}

/// Blob store backed by a `HashMap`. Used for tests and for running the
/// CLI without touching disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Stored paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, path: &str) -> StorageResult<Bytes> {
        validate_path(path)?;
        self.entries
            .read()
            .get(path)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn save(&self, path: &str, data: Bytes) -> StorageResult<()> {
        validate_path(path)?;
        let entry = Entry {
            data,
            modified: Utc::now(),
        };
        self.entries.write().insert(path.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        self.entries
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        validate_path(path)?;
        Ok(self.entries.read().contains_key(path))
    }

    async fn stat(&self, path: &str) -> StorageResult<Stat> {
        validate_path(path)?;
        self.entries
            .read()
            .get(path)
            .map(|entry| Stat {
                size: entry.data.len() as u64,
                modified: Some(entry.modified),
            })
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_open() {
        let store = MemoryStorage::new();
        store
            .save("a/b.png", Bytes::from_static(b"png"))
            .await
            .unwrap();

        assert_eq!(store.open("a/b.png").await.unwrap(), "png");
        assert!(store.exists("a/b.png").await.unwrap());
        assert_eq!(store.stat("a/b.png").await.unwrap().size, 3);
        assert_eq!(store.paths(), vec!["a/b.png"]);
    }

    #[tokio::test]
    async fn missing_paths_are_not_found() {
        let store = MemoryStorage::new();
        assert!(matches!(
            store.open("nope.png").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("nope.png").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(!store.exists("nope.png").await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = MemoryStorage::new();
        store.save("x.gif", Bytes::from_static(b"gif")).await.unwrap();
        store.delete("x.gif").await.unwrap();
        assert!(store.is_empty());
    }
}
