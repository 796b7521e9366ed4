//! Blob storage for source images and cached derivatives.
//!
//! Two independent [`Storage`] instances are wired into a
//! [`Context`](crate::context::Context): the *source* store holds the
//! originals, the *destination* store holds derivatives at their shard
//! paths. Drivers only have to provide five calls; everything above them is
//! driver-agnostic.

mod filesystem;
mod memory;

pub use filesystem::FilesystemStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Metadata returned by [`Storage::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// A blob store addressed by slash-separated relative paths.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Short driver name for logs.
    fn name(&self) -> &'static str;

    /// Read the whole blob. Missing paths are [`StorageError::NotFound`].
    async fn open(&self, path: &str) -> StorageResult<Bytes>;

    /// Write a blob, overwriting any previous content.
    async fn save(&self, path: &str, data: Bytes) -> StorageResult<()>;

    /// Remove a blob. Missing paths are [`StorageError::NotFound`].
    async fn delete(&self, path: &str) -> StorageResult<()>;

    async fn exists(&self, path: &str) -> StorageResult<bool>;

    async fn stat(&self, path: &str) -> StorageResult<Stat>;
}

/// Reject empty, absolute and parent-relative paths before they reach a
/// driver.
pub(crate) fn validate_path(path: &str) -> StorageResult<()> {
    if path.is_empty() {
        return Err(StorageError::InvalidPath("empty path".to_string()));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(StorageError::InvalidPath(format!(
            "absolute path not allowed: {path}"
        )));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(StorageError::InvalidPath(format!(
            "path traversal not allowed: {path}"
        )));
    }
    Ok(())
}
