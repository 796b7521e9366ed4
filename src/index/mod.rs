//! Key/value index mapping fingerprints to derivative paths.
//!
//! The orchestrator only ever talks to a [`KeyValueStore`]. Drivers sit at
//! the bottom ([`MemoryIndex`], [`DummyIndex`]); decorators compose on top:
//!
//! ```text
//! Prefixed ──▶ ReplicaFallback ──▶ [driver, driver, ...]
//! ```
//!
//! - [`Prefixed`] prepends a namespace to every key so the rest of the crate
//!   works with bare fingerprints.
//! - [`ReplicaFallback`] tries an ordered list of connections one at a
//!   time, skipping replicas that answer with the read-only signature.

mod memory;
mod prefixed;
mod replica;

pub use memory::{DummyIndex, MemoryIndex};
pub use prefixed::Prefixed;
pub use replica::ReplicaFallback;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Error text a replica returns when it refuses writes.
pub const READ_ONLY_REPLICA_SIGNATURE: &str = "READONLY You can't write against a read only replica.";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("{signature} ({0})", signature = READ_ONLY_REPLICA_SIGNATURE)]
    ReadOnlyReplica(String),

    #[error("index backend error: {0}")]
    Backend(String),

    #[error("no index replicas configured")]
    NoReplicas,
}

impl IndexError {
    /// Whether a replica-fallback decorator may retry on the next replica.
    pub fn is_read_only_replica(&self) -> bool {
        match self {
            IndexError::ReadOnlyReplica(_) => true,
            IndexError::Backend(msg) => msg.contains(READ_ONLY_REPLICA_SIGNATURE),
            IndexError::NoReplicas => false,
        }
    }
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// A key/value driver with set support.
///
/// Sets keep insertion order and ignore duplicate members.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> IndexResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> IndexResult<()>;

    async fn exists(&self, key: &str) -> IndexResult<bool>;

    async fn delete(&self, key: &str) -> IndexResult<()>;

    async fn append_to_set(&self, key: &str, values: &[String]) -> IndexResult<()>;

    /// Members of a set; empty when the key is absent.
    async fn get_set(&self, key: &str) -> IndexResult<Vec<String>>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> IndexResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        (**self).set(key, value).await
    }

    async fn exists(&self, key: &str) -> IndexResult<bool> {
        (**self).exists(key).await
    }

    async fn delete(&self, key: &str) -> IndexResult<()> {
        (**self).delete(key).await
    }

    async fn append_to_set(&self, key: &str, values: &[String]) -> IndexResult<()> {
        (**self).append_to_set(key, values).await
    }

    async fn get_set(&self, key: &str) -> IndexResult<Vec<String>> {
        (**self).get_set(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_signature_is_detected_in_backend_messages() {
        let err = IndexError::Backend(format!("redis: {READ_ONLY_REPLICA_SIGNATURE}"));
        assert!(err.is_read_only_replica());
        assert!(IndexError::ReadOnlyReplica("replica-1".into()).is_read_only_replica());
        assert!(!IndexError::Backend("connection refused".into()).is_read_only_replica());
        assert!(!IndexError::NoReplicas.is_read_only_replica());
    }
}
