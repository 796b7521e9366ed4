//! Cache-or-compute orchestration.
//!
//! For every request the [`Processor`] decides between three outcomes:
//!
//! 1. **Not modified**: a conditional request whose key is already indexed
//!    short-circuits with [`Error::NotModified`].
//! 2. **Cached**: the index maps the key to a derivative that still exists
//!    in the destination store. Nothing is recomputed.
//! 3. **Processed**: the key is unknown, the caller forced a recompute, or
//!    the index points at a derivative that was removed out of band. The
//!    source is loaded, transformed, and persisted.
//!
//! Persisting writes the derivative to the destination store, indexes
//! `key -> destination path`, and (with cascade delete enabled) records the
//! key in the children set of the source path. With `async_persist` the
//! whole step runs in a background task bounded by the persist deadline;
//! its failure is logged and never reaches the caller. A timeout can leave
//! a derivative written but not indexed: the next request for the key is
//! then a plain miss and reprocesses.
//!
//! Two concurrent misses for the same key both process and both persist;
//! the last index write wins.

use crate::cache::{CacheStats, children_key, shard_path};
use crate::context::Context;
use crate::error::{Error, Result, ResultExt};
use crate::file::{ETAG, ImageFile};
use crate::metrics::{Stage, extension_label};
use crate::parameters::{Parameters, build_operations};
use bytes::Bytes;
use parking_lot::Mutex;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// One derivative request.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub key: String,
    pub params: Parameters,
    /// Recompute even when the key is indexed.
    pub force: bool,
    /// Conditional revalidation value (`If-Modified-Since`).
    pub modified_since: Option<String>,
    /// Read cached bytes; otherwise a cache hit only references the blob.
    pub load: bool,
    /// Persist in the background after answering.
    pub async_persist: bool,
}

impl ProcessRequest {
    /// Request keyed by the fingerprint of `params`.
    pub fn new(params: Parameters) -> Self {
        Self {
            key: crate::cache::fingerprint(&params),
            params,
            force: false,
            modified_since: None,
            load: true,
            async_persist: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn modified_since(mut self, value: impl Into<String>) -> Self {
        self.modified_since = Some(value.into());
        self
    }

    pub fn load(mut self, load: bool) -> Self {
        self.load = load;
        self
    }

    pub fn async_persist(mut self, async_persist: bool) -> Self {
        self.async_persist = async_persist;
        self
    }
}

pub struct Processor {
    pub(crate) ctx: Context,
    stats: CacheStats,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl Processor {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            stats: CacheStats::default(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Indexed destination path for `key`.
    pub async fn get_key(&self, key: &str) -> Result<Option<String>> {
        self.ctx.index.get(key).await.context("get", key)
    }

    pub async fn key_exists(&self, key: &str) -> Result<bool> {
        self.ctx.index.exists(key).await.context("check", key)
    }

    #[instrument(skip_all, fields(key = %request.key))]
    pub async fn process(&self, request: &ProcessRequest) -> Result<ImageFile> {
        let key = request.key.as_str();

        if !request.force
            && let Some(since) = &request.modified_since
            && self.key_exists(key).await?
        {
            info!(modified_since = %since, "key already indexed, not modified");
            self.stats.not_modified();
            return Err(Error::NotModified);
        }

        if request.force {
            info!("force activated, key will be reprocessed");
            self.stats.forced();
            return self.process_image(request).await;
        }

        let Some(filepath) = self.get_key(key).await? else {
            info!("key not found in index");
            self.stats.miss();
            return self.process_image(request).await;
        };

        let start = Instant::now();
        match self.file_from_storage(key, &filepath, request.load).await? {
            Some(file) => {
                let elapsed = start.elapsed();
                self.ctx
                    .recorder
                    .observe(Stage::Load, &extension_label(&filepath), elapsed);
                info!(
                    filepath = %filepath,
                    size = file.content().len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "derivative served from cache"
                );
                self.stats.hit();
                Ok(file)
            }
            None => {
                warn!(filepath = %filepath, "indexed derivative missing, reprocessing");
                self.stats.stale();
                self.process_image(request).await
            }
        }
    }

    /// The cached derivative at `filepath`, or `None` when the destination
    /// store no longer has it.
    async fn file_from_storage(
        &self,
        key: &str,
        filepath: &str,
        load: bool,
    ) -> Result<Option<ImageFile>> {
        let destination = self.ctx.destination.clone();
        let mut file = if load {
            match ImageFile::from_storage(destination, filepath).await {
                Ok(file) => file,
                Err(Error::NotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            }
        } else {
            if !destination
                .exists(filepath)
                .await
                .context("check", filepath)?
            {
                return Ok(None);
            }
            ImageFile::reference(destination, filepath)
        };
        file.key = key.to_string();
        file.set_header(ETAG, key);
        Ok(Some(file))
    }

    async fn load_source(&self, params: &Parameters) -> Result<(ImageFile, Option<String>)> {
        if let Some(url) = params.url() {
            let fetcher = self
                .ctx
                .fetcher
                .as_ref()
                .ok_or_else(|| Error::Validation("remote sources are disabled".into()))?;
            let file = fetcher.fetch(url).await.context("fetch", url)?;
            return Ok((file, None));
        }

        let path = params
            .path()
            .ok_or_else(|| Error::Validation("path or url required".into()))?;
        if !self
            .ctx
            .source
            .exists(path)
            .await
            .context("check", path)?
        {
            return Err(Error::file_not_exists(path));
        }
        let file = ImageFile::from_storage(self.ctx.source.clone(), path).await?;
        Ok((file, Some(path.to_string())))
    }

    async fn process_image(&self, request: &ProcessRequest) -> Result<ImageFile> {
        let key = request.key.as_str();
        let engine = self.ctx.engine.clone();

        let start = Instant::now();
        let (source, source_path) = self.load_source(&request.params).await?;
        let elapsed = start.elapsed();
        self.ctx
            .recorder
            .observe(Stage::Load, &extension_label(&source.filepath), elapsed);
        info!(
            image = %source.filepath,
            size = source.source.len(),
            duration_ms = elapsed.as_millis() as u64,
            "source loaded"
        );

        let format = engine.resolve_format(request.params.format()?, &source);
        let operations = build_operations(
            &self.ctx.source,
            &request.params,
            format,
            engine.default_quality(),
        )
        .await?;
        let output = source.with_format(format);
        let label = extension_label(&output.filepath);
        let target = output.filepath.clone();

        let start = Instant::now();
        let mut file = tokio::task::spawn_blocking(move || engine.transform(output, &operations))
            .await
            .map_err(|e| Error::upstream("transform", &target, e))??;
        let elapsed = start.elapsed();
        self.ctx.recorder.observe(Stage::Transform, &label, elapsed);

        let shard = self.ctx.settings.shard;
        file.filepath = format!(
            "{}.{}",
            shard_path(key, shard.width, shard.depth, shard.rest_only),
            format.extension()
        );
        file.storage = Some(self.ctx.destination.clone());
        file.key = key.to_string();
        file.set_header(ETAG, key);

        info!(
            image = %file.filepath,
            size = file.content().len(),
            duration_ms = elapsed.as_millis() as u64,
            "image processed"
        );

        if request.async_persist {
            self.persist_in_background(source_path, file.clone());
        } else {
            store(&self.ctx, source_path.as_deref(), &file).await?;
        }
        Ok(file)
    }

    fn persist_in_background(&self, source_path: Option<String>, file: ImageFile) {
        let ctx = self.ctx.clone();
        let deadline = ctx.settings.persist_timeout;
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(deadline, store(&ctx, source_path.as_deref(), &file)).await
            {
                Ok(Ok(())) => debug!(key = %file.key, "background store done"),
                Ok(Err(e)) => error!(key = %file.key, error = %e, "background store failed"),
                Err(_) => warn!(
                    key = %file.key,
                    deadline_ms = deadline.as_millis() as u64,
                    "background store timed out"
                ),
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every background store started so far.
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "background store task panicked");
            }
        }
    }

    /// Persist a processed derivative and index it under its key.
    pub async fn store(&self, source_path: Option<&str>, file: &ImageFile) -> Result<()> {
        store(&self.ctx, source_path, file).await
    }

    /// Save a new source image.
    pub async fn upload(&self, filename: &str, data: Bytes) -> Result<ImageFile> {
        self.ctx
            .source
            .save(filename, data.clone())
            .await
            .context("save", filename)?;
        info!(filename, size = data.len(), "source uploaded");

        let mut file = ImageFile::new(filename, data);
        file.storage = Some(self.ctx.source.clone());
        Ok(file)
    }
}

async fn store(ctx: &Context, source_path: Option<&str>, file: &ImageFile) -> Result<()> {
    let start = Instant::now();
    file.save().await?;
    debug!(
        file = %file.filepath,
        duration_ms = start.elapsed().as_millis() as u64,
        "saved file to storage"
    );

    let start = Instant::now();
    ctx.index
        .set(&file.key, &file.filepath)
        .await
        .context("set", &file.key)?;
    ctx.recorder.observe(
        Stage::Store,
        &extension_label(&file.filepath),
        start.elapsed(),
    );
    debug!(key = %file.key, filepath = %file.filepath, "saved key to index");

    if ctx.settings.cascade_delete
        && let Some(path) = source_path
    {
        let set = children_key(path);
        ctx.index
            .append_to_set(&set, std::slice::from_ref(&file.key))
            .await
            .context("append to", &set)?;
        debug!(set = %set, key = %file.key, "recorded derivative of {path}");
    }
    Ok(())
}
