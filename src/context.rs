//! The collaborators every request needs, bundled once at startup.

use crate::config::{Config, IndexKind, ShardConfig, StorageKind, StoreConfig};
use crate::error::{Result, ResultExt};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::imaging::Engine;
use crate::index::{DummyIndex, KeyValueStore, MemoryIndex, Prefixed};
use crate::metrics::{NoopRecorder, Recorder, TracingRecorder};
use crate::storage::{FilesystemStorage, MemoryStorage, Storage};
use std::sync::Arc;
use std::time::Duration;

/// Knobs the processor and cascade delete read per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub shard: ShardConfig,
    pub cascade_delete: bool,
    /// Deadline for background persistence.
    pub persist_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shard: ShardConfig::default(),
            cascade_delete: false,
            persist_timeout: Duration::from_millis(2000),
        }
    }
}

/// Shared handles for the lifetime of the process. Cloning is cheap.
#[derive(Clone)]
pub struct Context {
    pub source: Arc<dyn Storage>,
    pub destination: Arc<dyn Storage>,
    pub index: Arc<dyn KeyValueStore>,
    pub engine: Arc<Engine>,
    pub fetcher: Option<Arc<dyn Fetcher>>,
    pub recorder: Arc<dyn Recorder>,
    pub settings: Settings,
}

impl Context {
    /// Context without remote sources, discarding stage timings.
    pub fn new(
        source: Arc<dyn Storage>,
        destination: Arc<dyn Storage>,
        index: Arc<dyn KeyValueStore>,
        engine: Engine,
    ) -> Self {
        Self {
            source,
            destination,
            index,
            engine: Arc::new(engine),
            fetcher: None,
            recorder: Arc::new(NoopRecorder),
            settings: Settings::default(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = Engine::from_config(&config.engine)?;
        let fetcher = HttpFetcher::new(
            &config.options.default_user_agent,
            Duration::from_millis(config.options.fetch_timeout_ms),
        )
        .context("build", "http client")?;

        let settings = Settings {
            shard: config.shard,
            cascade_delete: config.options.enable_cascade_delete,
            persist_timeout: Duration::from_millis(config.options.persist_timeout_ms),
        };

        Ok(Self::new(
            open_store(&config.storage.source),
            open_store(&config.storage.destination),
            open_index(config),
            engine,
        )
        .with_fetcher(Arc::new(fetcher))
        .with_recorder(Arc::new(TracingRecorder))
        .with_settings(settings))
    }
}

fn open_store(config: &StoreConfig) -> Arc<dyn Storage> {
    match config.kind {
        StorageKind::Fs => Arc::new(FilesystemStorage::new(&config.root)),
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
    }
}

fn open_index(config: &Config) -> Arc<dyn KeyValueStore> {
    let driver: Arc<dyn KeyValueStore> = match config.index.kind {
        IndexKind::Memory => Arc::new(MemoryIndex::new()),
        IndexKind::Dummy => Arc::new(DummyIndex),
    };
    if config.index.prefix.is_empty() {
        driver
    } else {
        Arc::new(Prefixed::new(driver, config.index.prefix.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn from_config_wires_settings() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.source.root = tmp.path().join("src").display().to_string();
        config.storage.destination.kind = StorageKind::Memory;
        config.options.enable_cascade_delete = true;
        config.options.persist_timeout_ms = 500;
        config.shard = ShardConfig {
            width: 2,
            depth: 1,
            rest_only: false,
        };

        let ctx = Context::from_config(&config).unwrap();
        assert!(ctx.settings.cascade_delete);
        assert_eq!(ctx.settings.persist_timeout, Duration::from_millis(500));
        assert_eq!(ctx.settings.shard.width, 2);
        assert_eq!(ctx.source.name(), "fs");
        assert_eq!(ctx.destination.name(), "memory");
        assert!(ctx.fetcher.is_some());
        assert_eq!(ctx.engine.backend_names(), vec!["native"]);
    }

    #[tokio::test]
    async fn prefix_applies_to_index_keys() {
        let mut config = Config::default();
        config.index.prefix = "picstash:".into();
        let index = open_index(&config);
        index.set("k", "v").await.unwrap();
        assert_eq!(index.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn dummy_index_remembers_nothing() {
        let mut config = Config::default();
        config.index.kind = IndexKind::Dummy;
        let index = open_index(&config);
        index.set("k", "v").await.unwrap();
        assert_eq!(index.get("k").await.unwrap(), None);
    }

    #[test]
    fn default_settings() {
        let settings = Settings::default();
        assert!(!settings.cascade_delete);
        assert_eq!(settings.persist_timeout, Duration::from_secs(2));
    }
}
