//! The image value passed between storage, the engine and the processor.

use crate::error::{Error, Result, ResultExt};
use crate::storage::Storage;
use crate::types::Format;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const LAST_MODIFIED: &str = "Last-Modified";
pub const ETAG: &str = "ETag";

/// `Last-Modified` header date layout (RFC 7231, always GMT).
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// An image plus the metadata that travels with it.
///
/// Transforms never mutate an `ImageFile`; each stage returns a new one
/// whose `processed` buffer wins over `source`.
#[derive(Clone, Default)]
pub struct ImageFile {
    pub source: Bytes,
    pub processed: Option<Bytes>,
    pub key: String,
    pub headers: BTreeMap<String, String>,
    pub filepath: String,
    pub storage: Option<Arc<dyn Storage>>,
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("filepath", &self.filepath)
            .field("key", &self.key)
            .field("source_len", &self.source.len())
            .field("processed_len", &self.processed.as_ref().map(Bytes::len))
            .field("headers", &self.headers)
            .field("storage", &self.storage.as_ref().map(|s| s.name()))
            .finish()
    }
}

impl ImageFile {
    pub fn new(filepath: impl Into<String>, source: Bytes) -> Self {
        let mut file = Self {
            filepath: filepath.into(),
            source,
            ..Self::default()
        };
        if let Some(format) = file.format() {
            file.set_header(CONTENT_TYPE, format.content_type());
        }
        file
    }

    /// Load a file and its metadata from a blob store.
    pub async fn from_storage(storage: Arc<dyn Storage>, path: &str) -> Result<Self> {
        let source = storage.open(path).await.context("open", path)?;
        let stat = storage.stat(path).await.context("stat", path)?;

        let mut file = Self::new(path, source);
        if let Some(modified) = stat.modified {
            file.set_header(LAST_MODIFIED, http_date(modified));
        }
        file.storage = Some(storage);
        Ok(file)
    }

    /// Reference a file in a blob store without reading it.
    pub fn reference(storage: Arc<dyn Storage>, path: impl Into<String>) -> Self {
        let mut file = Self {
            filepath: path.into(),
            storage: Some(storage),
            ..Self::default()
        };
        if let Some(format) = Format::from_path(&file.filepath) {
            file.set_header(CONTENT_TYPE, format.content_type());
        }
        file
    }

    /// Processed bytes if any, else the source.
    pub fn content(&self) -> &Bytes {
        self.processed.as_ref().unwrap_or(&self.source)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_string(), value.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    /// Format from the path extension, falling back to the content type
    /// header and finally to the magic bytes.
    pub fn format(&self) -> Option<Format> {
        Format::from_path(&self.filepath)
            .or_else(|| self.content_type().and_then(Format::from_content_type))
            .or_else(|| Format::detect(self.content()))
    }

    pub fn filename(&self) -> &str {
        self.filepath.rsplit('/').next().unwrap_or(&self.filepath)
    }

    /// Path without its extension.
    pub fn stem_path(&self) -> &str {
        let name_start = self.filepath.len() - self.filename().len();
        match self.filename().rfind('.') {
            Some(dot) if dot > 0 => &self.filepath[..name_start + dot],
            _ => &self.filepath,
        }
    }

    /// Rewrite the extension and `Content-Type` for a new output format.
    pub fn with_format(mut self, format: Format) -> Self {
        if self.format() != Some(format) || Format::from_path(&self.filepath).is_none() {
            self.filepath = format!("{}.{}", self.stem_path(), format.extension());
        }
        self.set_header(CONTENT_TYPE, format.content_type());
        self
    }

    /// Copy of this file with `processed` replaced.
    pub fn with_processed(&self, processed: impl Into<Bytes>) -> Self {
        Self {
            processed: Some(processed.into()),
            ..self.clone()
        }
    }

    /// Save the current content to the owning store.
    pub async fn save(&self) -> Result<()> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| Error::Validation(format!("{} has no storage", self.filepath)))?;
        storage
            .save(&self.filepath, self.content().clone())
            .await
            .context("save", &self.filepath)
    }
}

pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE).to_string()
}
