//! Operation pipeline over the registered backends.
//!
//! The engine owns an ordered list of backends, each registered for a set
//! of formats with a weight. For every stage of a chain it walks the
//! backends registered for the output format in ascending weight and stops
//! at the first one that performs the operation. A backend that answers
//! [`BackendError::NotImplemented`] hands the stage to the next one; any
//! other error aborts the chain.
//!
//! Each stage reads the previous stage's output. The returned file keeps
//! the original `source` and carries the last output in `processed`.

use super::backend::{BackendError, ImageBackend};
use super::gifsicle_backend::{self, GifsicleBackend};
use super::params::{EngineOperation, Operation, Options, Quality};
use super::rust_backend::RustBackend;
use crate::config::{BackendKind, EngineConfig};
use crate::error::{Error, Result, ResultExt};
use crate::file::ImageFile;
use crate::types::Format;
use bytes::Bytes;
use std::time::Instant;
use tracing::{debug, info, warn};

struct BackendEntry {
    backend: Box<dyn ImageBackend>,
    formats: Vec<Format>,
    weight: i32,
}

pub struct Engine {
    default_format: Format,
    default_quality: Quality,
    format: Option<Format>,
    backends: Vec<BackendEntry>,
}

impl Engine {
    /// An engine with no backends registered.
    pub fn new(default_format: Format, default_quality: Quality, format: Option<Format>) -> Self {
        Self {
            default_format,
            default_quality,
            format,
            backends: Vec::new(),
        }
    }

    /// Register a backend for `formats`. Lower weights are tried first;
    /// equal weights keep registration order.
    pub fn with_backend(
        mut self,
        backend: impl ImageBackend + 'static,
        formats: &[Format],
        weight: i32,
    ) -> Self {
        self.backends.push(BackendEntry {
            backend: Box::new(backend),
            formats: formats.to_vec(),
            weight,
        });
        self.backends.sort_by_key(|entry| entry.weight);
        self
    }

    /// PNG by default, quality 95, the native backend for every format.
    pub fn native() -> Self {
        Self::new(Format::Png, Quality::DEFAULT, None).with_backend(
            RustBackend::new(),
            &Format::ALL,
            0,
        )
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let quality = Quality::try_new(config.quality).map_err(Error::Validation)?;
        let mut engine = Self::new(config.default_format, quality, config.format);

        for backend in &config.backends {
            let formats: Vec<Format> = backend
                .mimetypes
                .iter()
                .filter_map(|m| Format::from_content_type(m))
                .collect();
            engine = match backend.kind {
                BackendKind::Native => {
                    engine.with_backend(RustBackend::new(), &formats, backend.weight)
                }
                BackendKind::Gifsicle => {
                    let executable = backend
                        .path
                        .as_deref()
                        .unwrap_or(gifsicle_backend::DEFAULT_EXECUTABLE);
                    match GifsicleBackend::locate(executable) {
                        Some(path) => engine.with_backend(
                            GifsicleBackend::new(path),
                            &formats,
                            backend.weight,
                        ),
                        None => {
                            warn!(executable, "gifsicle not found, backend disabled");
                            engine
                        }
                    }
                }
            };
        }

        info!(backends = %engine.backend_names().join(" "), "engine ready");
        Ok(engine)
    }

    pub fn default_quality(&self) -> Quality {
        self.default_quality
    }

    pub fn default_format(&self) -> Format {
        self.default_format
    }

    /// Backend names in dispatch order.
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|e| e.backend.name()).collect()
    }

    /// Output format for a request: the requested format, else the forced
    /// engine format, else the input's own format, else the default.
    pub fn resolve_format(&self, requested: Option<Format>, input: &ImageFile) -> Format {
        requested
            .or(self.format)
            .or_else(|| input.format())
            .unwrap_or(self.default_format)
    }

    /// Run `operations` in order, each stage reading the previous output.
    ///
    /// `output` must already carry the output path and `Content-Type`; the
    /// content type selects the backends.
    pub fn transform(&self, output: ImageFile, operations: &[EngineOperation]) -> Result<ImageFile> {
        let format = output
            .content_type()
            .and_then(Format::from_content_type)
            .or_else(|| output.format())
            .ok_or_else(|| {
                Error::Validation(format!("unable to detect format of {}", output.filepath))
            })?;

        let mut current: Option<Bytes> = None;
        for stage in operations {
            let input = match &current {
                Some(bytes) => ImageFile {
                    source: bytes.clone(),
                    processed: None,
                    ..output.clone()
                },
                None => output.clone(),
            };
            let processed = self.run_stage(&input, stage, format)?;
            current = Some(processed);
        }

        Ok(ImageFile {
            processed: current,
            ..output
        })
    }

    fn run_stage(&self, input: &ImageFile, stage: &EngineOperation, format: Format) -> Result<Bytes> {
        if stage.operation == Operation::Noop {
            return Ok(input.source.clone());
        }

        let start = Instant::now();
        for entry in self.backends.iter().filter(|e| e.formats.contains(&format)) {
            match operate(entry.backend.as_ref(), input, stage.operation, &stage.options) {
                Ok(bytes) => {
                    debug!(
                        backend = entry.backend.name(),
                        operation = %stage.operation,
                        filepath = %input.filepath,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "processed image"
                    );
                    return Ok(Bytes::from(bytes));
                }
                Err(BackendError::NotImplemented) => continue,
                Err(e) => return Err(e).context(stage.operation.as_str(), &input.filepath),
            }
        }

        Err(Error::Unsupported(format!(
            "unable to {} {}: no backend implements it for {}",
            stage.operation,
            input.filepath,
            format.content_type()
        )))
    }
}

fn operate(
    backend: &dyn ImageBackend,
    file: &ImageFile,
    operation: Operation,
    options: &Options,
) -> std::result::Result<Vec<u8>, BackendError> {
    match operation {
        Operation::Resize => backend.resize(file, options),
        Operation::Thumbnail => backend.thumbnail(file, options),
        Operation::Fit => backend.fit(file, options),
        Operation::Rotate => backend.rotate(file, options),
        Operation::Flip => backend.flip(file, options),
        Operation::Flat => backend.flat(file, options),
        Operation::Noop => Ok(file.source.to_vec()),
    }
}
