use super::{IndexError, IndexResult, KeyValueStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Ordered failover over several index connections.
///
/// Every call walks the replicas in order, one at a time. A replica that
/// answers with the read-only signature is skipped; any other error stops
/// the walk and is returned. The first success wins and later replicas are
/// never consulted. When every replica was skipped, the last error is
/// returned.
#[derive(Clone)]
pub struct ReplicaFallback {
    replicas: Vec<Arc<dyn KeyValueStore>>,
}

impl ReplicaFallback {
    pub fn new(replicas: Vec<Arc<dyn KeyValueStore>>) -> Self {
        Self { replicas }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}

/// Decide whether a replica failure lets the walk continue. Returns the
/// error to remember, or propagates it when fatal.
fn fall_through(position: usize, err: IndexError) -> IndexResult<IndexError> {
    if err.is_read_only_replica() {
        warn!(replica = position, error = %err, "index replica is read-only, trying next");
        Ok(err)
    } else {
        Err(err)
    }
}

macro_rules! walk_replicas {
    ($self:ident, |$store:ident| $call:expr) => {{
        let mut last = IndexError::NoReplicas;
        for (position, $store) in $self.replicas.iter().enumerate() {
            match $call.await {
                Ok(value) => return Ok(value),
                Err(err) => last = fall_through(position, err)?,
            }
        }
        Err(last)
    }};
}

#[async_trait]
impl KeyValueStore for ReplicaFallback {
    async fn get(&self, key: &str) -> IndexResult<Option<String>> {
        walk_replicas!(self, |store| store.get(key))
    }

    async fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        walk_replicas!(self, |store| store.set(key, value))
    }

    async fn exists(&self, key: &str) -> IndexResult<bool> {
        walk_replicas!(self, |store| store.exists(key))
    }

    async fn delete(&self, key: &str) -> IndexResult<()> {
        walk_replicas!(self, |store| store.delete(key))
    }

    async fn append_to_set(&self, key: &str, values: &[String]) -> IndexResult<()> {
        walk_replicas!(self, |store| store.append_to_set(key, values))
    }

    async fn get_set(&self, key: &str) -> IndexResult<Vec<String>> {
        walk_replicas!(self, |store| store.get_set(key))
    }
}
