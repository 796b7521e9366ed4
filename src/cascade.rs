//! Cascade delete: remove a source image and every derivative cached from
//! it.
//!
//! Derivatives are found through the children set recorded at store time
//! (`md5(path):children`), so only derivatives processed while cascade
//! delete was enabled are reached. Children are deleted one at a time in
//! set order; the first failure stops the cascade and is returned. Children
//! already handled stay deleted, the rest and the set itself are left in
//! place.

use crate::cache::children_key;
use crate::error::{Error, Result, ResultExt};
use crate::processor::Processor;
use crate::storage::StorageError;
use tracing::{info, instrument, warn};

/// What a delete request names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// A source path: cascade over its derivatives.
    Path(String),
    /// A single derivative key.
    Key(String),
}

impl DeleteTarget {
    /// A path wins over a key. Neither is [`Error::Unprocessable`].
    pub fn from_request(path: Option<&str>, key: Option<&str>) -> Result<Self> {
        let path = path.map(|p| p.trim_start_matches('/')).filter(|p| !p.is_empty());
        match (path, key.filter(|k| !k.is_empty())) {
            (Some(path), _) => Ok(DeleteTarget::Path(path.to_string())),
            (None, Some(key)) => Ok(DeleteTarget::Key(key.to_string())),
            (None, None) => Err(Error::Unprocessable),
        }
    }
}

impl Processor {
    pub async fn delete_target(&self, target: &DeleteTarget) -> Result<()> {
        match target {
            DeleteTarget::Path(path) => self.delete(path).await,
            DeleteTarget::Key(key) => self.delete_child(key).await,
        }
    }

    /// Delete a source image and its indexed derivatives.
    ///
    /// Deleting a path that is already gone is [`Error::NotFound`].
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        let source = &self.ctx.source;
        if !source.exists(path).await.context("check", path)? {
            info!("file does not exist on source storage");
            return Err(Error::NotFound(format!(
                "unable to delete {path}: file does not exist"
            )));
        }
        source.delete(path).await.context("delete", path)?;
        info!("deleted file on source storage");

        let set = children_key(path);
        let index = &self.ctx.index;
        if !index.exists(&set).await.context("check", &set)? {
            info!(set = %set, "no derivatives recorded");
            return Ok(());
        }

        let children = index.get_set(&set).await.context("get", &set)?;
        for key in &children {
            self.delete_child(key).await?;
        }

        index.delete(&set).await.context("delete", &set)?;
        info!(set = %set, count = children.len(), "deleted derivatives");
        Ok(())
    }

    /// Delete one derivative blob and its index entry.
    ///
    /// A blob already missing from the destination store is skipped; the
    /// index entry is removed either way.
    #[instrument(skip(self))]
    pub async fn delete_child(&self, key: &str) -> Result<()> {
        let index = &self.ctx.index;
        if let Some(filepath) = index.get(key).await.context("get", key)? {
            match self.ctx.destination.delete(&filepath).await {
                Ok(()) => {}
                // Stale entry: the blob went away out of band. Drop the
                // index entry anyway instead of failing the delete.
                Err(StorageError::NotFound(_)) => {
                    warn!(filepath = %filepath, "derivative already gone from storage")
                }
                Err(e) => return Err(e).context("delete", &filepath),
            }
        }
        index.delete(key).await.context("delete", key)?;
        info!("deleted child");
        Ok(())
    }
}
