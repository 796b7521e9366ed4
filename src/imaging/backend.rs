//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait lists the six pixel operations the
//! [`Engine`](super::engine::Engine) can dispatch. Every method takes the
//! current stage's image plus its [`Options`] and returns encoded bytes in
//! `options.format`.
//!
//! Backends are not required to implement everything: the default method
//! bodies return [`BackendError::NotImplemented`], and the engine moves on
//! to the next backend registered for the format.
//!
//! | Backend | resize | thumbnail | fit | rotate | flip | flat |
//! |---|---|---|---|---|---|---|
//! | [`RustBackend`](super::rust_backend::RustBackend) | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ |
//! | [`GifsicleBackend`](super::gifsicle_backend::GifsicleBackend) | ✓ | ✓ | | | | |

use super::params::Options;
use crate::file::ImageFile;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("method not implemented by this backend")]
    NotImplemented,
    #[error("{0}")]
    Validation(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image processing backends.
///
/// Implementations are synchronous and CPU-bound; callers run them off the
/// async runtime.
pub trait ImageBackend: Send + Sync {
    /// Short name for logs and configuration.
    fn name(&self) -> &'static str;

    /// Stretch to exactly `width × height`.
    fn resize(&self, _file: &ImageFile, _options: &Options) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::NotImplemented)
    }

    /// Resize to cover `width × height`, then center crop.
    fn thumbnail(&self, _file: &ImageFile, _options: &Options) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::NotImplemented)
    }

    /// Resize to fit inside `width × height`, keeping the aspect ratio.
    fn fit(&self, _file: &ImageFile, _options: &Options) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::NotImplemented)
    }

    fn rotate(&self, _file: &ImageFile, _options: &Options) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::NotImplemented)
    }

    fn flip(&self, _file: &ImageFile, _options: &Options) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::NotImplemented)
    }

    /// Composite `options.images` onto the file.
    fn flat(&self, _file: &ImageFile, _options: &Options) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::NotImplemented)
    }
}

impl<T: ImageBackend + ?Sized> ImageBackend for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resize(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        (**self).resize(file, options)
    }

    fn thumbnail(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        (**self).thumbnail(file, options)
    }

    fn fit(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        (**self).fit(file, options)
    }

    fn rotate(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        (**self).rotate(file, options)
    }

    fn flip(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        (**self).flip(file, options)
    }

    fn flat(&self, file: &ImageFile, options: &Options) -> Result<Vec<u8>, BackendError> {
        (**self).flat(file, options)
    }
}
