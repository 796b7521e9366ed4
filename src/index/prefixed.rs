use super::{IndexResult, KeyValueStore};
use async_trait::async_trait;

/// Namespaces every key with a fixed prefix before delegating.
///
/// Set *members* are stored untouched; only keys are prefixed.
#[derive(Debug)]
pub struct Prefixed<S> {
    inner: S,
    prefix: String,
}

impl<S: KeyValueStore> Prefixed<S> {
    pub fn new(inner: S, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for Prefixed<S> {
    async fn get(&self, key: &str) -> IndexResult<Option<String>> {
        self.inner.get(&self.key(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        self.inner.set(&self.key(key), value).await
    }

    async fn exists(&self, key: &str) -> IndexResult<bool> {
        self.inner.exists(&self.key(key)).await
    }

    async fn delete(&self, key: &str) -> IndexResult<()> {
        self.inner.delete(&self.key(key)).await
    }

    async fn append_to_set(&self, key: &str, values: &[String]) -> IndexResult<()> {
        self.inner.append_to_set(&self.key(key), values).await
    }

    async fn get_set(&self, key: &str) -> IndexResult<Vec<String>> {
        self.inner.get_set(&self.key(key)).await
    }
}
