//! Crate-level error taxonomy.
//!
//! Each layer has its own `thiserror` enum ([`StorageError`],
//! [`IndexError`], [`FetchError`], [`BackendError`]). Crossing into the
//! orchestrator they are folded into [`Error`], which keeps the six classes
//! the boundary layer needs to tell apart:
//!
//! | Kind | Status | Raised when |
//! |---|---|---|
//! | `NotFound` | 404 | source file or key absent |
//! | `NotModified` | 304 | conditional request, key already cached |
//! | `Validation` | 400 | bad quality/degree/axis/numeric parameter |
//! | `Unprocessable` | 400 | delete request with neither path nor key |
//! | `Unsupported` | 501 | no backend implements the operation |
//! | `Upstream` | 502 | blob store, index, fetch or codec failure |
//!
//! [`ResultExt::context`] attaches the "unable to `<verb>` `<target>`"
//! annotation while converting.

use crate::fetch::FetchError;
use crate::imaging::BackendError;
use crate::index::IndexError;
use crate::storage::StorageError;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),
    #[error("not modified")]
    NotModified,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unsupported(String),
    #[error("unable to process delete request: path or key required")]
    Unprocessable,
    #[error("unable to {action} {target}: {source}")]
    Upstream {
        action: String,
        target: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NotModified,
    Validation,
    Unsupported,
    Unprocessable,
    Upstream,
}

impl ErrorKind {
    /// HTTP status the boundary layer should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::NotModified => 304,
            ErrorKind::Validation | ErrorKind::Unprocessable => 400,
            ErrorKind::Unsupported => 501,
            ErrorKind::Upstream => 502,
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NotModified => ErrorKind::NotModified,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Unprocessable => ErrorKind::Unprocessable,
            Error::Upstream { .. } => ErrorKind::Upstream,
        }
    }

    pub fn upstream(
        action: impl Into<String>,
        target: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Upstream {
            action: action.into(),
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn file_not_exists(target: &str) -> Self {
        Error::NotFound(format!("{target}: file does not exist"))
    }
}

/// Layer errors that know how to become an [`Error`] once the failing
/// operation and its target are known.
pub trait IntoCrateError {
    fn into_error(self, action: &str, target: &str) -> Error;
}

impl IntoCrateError for StorageError {
    fn into_error(self, action: &str, target: &str) -> Error {
        match self {
            StorageError::NotFound(_) => {
                Error::NotFound(format!("unable to {action} {target}: file does not exist"))
            }
            StorageError::InvalidPath(msg) => Error::Validation(msg),
            other => Error::upstream(action, target, other),
        }
    }
}

impl IntoCrateError for IndexError {
    fn into_error(self, action: &str, target: &str) -> Error {
        Error::upstream(action, target, self)
    }
}

impl IntoCrateError for FetchError {
    fn into_error(self, action: &str, target: &str) -> Error {
        match self {
            FetchError::InvalidUrl(msg) => Error::Validation(msg),
            FetchError::NotFound(url) => Error::NotFound(format!("{url}: file does not exist")),
            other => Error::upstream(action, target, other),
        }
    }
}

impl IntoCrateError for BackendError {
    fn into_error(self, action: &str, target: &str) -> Error {
        match self {
            BackendError::NotImplemented => {
                Error::Unsupported(format!("unable to {action} {target}: not implemented"))
            }
            BackendError::Validation(msg) => Error::Validation(msg),
            other => Error::upstream(action, target, other),
        }
    }
}

pub trait ResultExt<T> {
    /// Annotate a layer error with the operation and target that failed.
    fn context(self, action: &str, target: &str) -> Result<T>;
}

impl<T, E: IntoCrateError> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, action: &str, target: &str) -> Result<T> {
        self.map_err(|e| e.into_error(action, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::NotFound("x".into()).kind().status_code(), 404);
        assert_eq!(Error::NotModified.kind().status_code(), 304);
        assert_eq!(Error::Validation("q".into()).kind().status_code(), 400);
        assert_eq!(Error::Unprocessable.kind().status_code(), 400);
        assert_eq!(Error::Unsupported("op".into()).kind().status_code(), 501);
        let upstream = Error::upstream("save", "a.png", "disk full");
        assert_eq!(upstream.kind().status_code(), 502);
    }

    #[test]
    fn storage_not_found_keeps_classification() {
        let res: std::result::Result<(), _> = Err(StorageError::NotFound("a.png".into()));
        let err = res.context("open", "a.png").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "unable to open a.png: file does not exist");
    }

    #[test]
    fn io_failures_become_upstream_with_context() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let res: std::result::Result<(), _> = Err(StorageError::Io(io));
        let err = res.context("save", "cache/a.png").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.to_string().starts_with("unable to save cache/a.png:"));
    }

    #[test]
    fn backend_not_implemented_is_unsupported() {
        let res: std::result::Result<(), _> = Err(BackendError::NotImplemented);
        let err = res.context("flat", "a.gif").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn index_errors_are_upstream() {
        let res: std::result::Result<(), _> = Err(IndexError::Backend("refused".into()));
        let err = res.context("get", "abc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }
}
