//! In-process index drivers.

use super::{IndexError, IndexResult, KeyValueStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(Vec<String>),
}

/// Index backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryIndex {
    async fn get(&self, key: &str) -> IndexResult<Option<String>> {
        match self.entries.read().get(key) {
            None => Ok(None),
            Some(Value::Str(value)) => Ok(Some(value.clone())),
            Some(Value::Set(_)) => Err(IndexError::Backend(format!(
                "{key} holds a set, not a string"
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), Value::Str(value.to_string()));
        Ok(())
    }

    async fn exists(&self, key: &str) -> IndexResult<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn delete(&self, key: &str) -> IndexResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn append_to_set(&self, key: &str, values: &[String]) -> IndexResult<()> {
        let mut entries = self.entries.write();
        let slot = entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(Vec::new()));
        let Value::Set(members) = slot else {
            return Err(IndexError::Backend(format!(
                "{key} holds a string, not a set"
            )));
        };
        for value in values {
            if !members.contains(value) {
                members.push(value.clone());
            }
        }
        Ok(())
    }

    async fn get_set(&self, key: &str) -> IndexResult<Vec<String>> {
        match self.entries.read().get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.clone()),
            Some(Value::Str(_)) => Err(IndexError::Backend(format!(
                "{key} holds a string, not a set"
            ))),
        }
    }
}

/// Index that stores nothing: every lookup misses. Disables caching.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyIndex;

#[async_trait]
impl KeyValueStore for DummyIndex {
    async fn get(&self, _key: &str) -> IndexResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> IndexResult<()> {
        Ok(())
    }

    async fn exists(&self, _key: &str) -> IndexResult<bool> {
        Ok(false)
    }

    async fn delete(&self, _key: &str) -> IndexResult<()> {
        Ok(())
    }

    async fn append_to_set(&self, _key: &str, _values: &[String]) -> IndexResult<()> {
        Ok(())
    }

    async fn get_set(&self, _key: &str) -> IndexResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let index = MemoryIndex::new();
        index.set("k", "v").await.unwrap();
        assert_eq!(index.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(index.exists("k").await.unwrap());

        index.delete("k").await.unwrap();
        assert_eq!(index.get("k").await.unwrap(), None);
        assert!(!index.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn sets_keep_insertion_order_and_dedup() {
        let index = MemoryIndex::new();
        index
            .append_to_set("s", &["b".into(), "a".into()])
            .await
            .unwrap();
        index
            .append_to_set("s", &["a".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(index.get_set("s").await.unwrap(), vec!["b", "a", "c"]);
        assert!(index.get_set("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn type_mismatch_is_backend_error() {
        let index = MemoryIndex::new();
        index.set("k", "v").await.unwrap();
        assert!(matches!(
            index.append_to_set("k", &["x".into()]).await,
            Err(IndexError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn dummy_never_remembers() {
        let index = DummyIndex;
        index.set("k", "v").await.unwrap();
        assert_eq!(index.get("k").await.unwrap(), None);
        assert!(!index.exists("k").await.unwrap());
    }
}
