//! Remote sources.
//!
//! A request can name its source with `url=` instead of `path=`. The
//! processor hands the URL to a [`Fetcher`]; the default implementation
//! downloads it with `reqwest`.

use crate::file::{CONTENT_TYPE, ImageFile, LAST_MODIFIED};
use async_trait::async_trait;
use reqwest::{StatusCode, Url, header};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("remote file not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<ImageFile, FetchError>;
}

/// Parse and check that a URL is absolute http(s).
pub fn parse_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl(format!(
            "{raw}: unsupported scheme {other}"
        ))),
    }
}

/// Path component of a URL without its leading slash; used as the
/// fetched file's logical path.
pub fn url_filepath(url: &Url) -> String {
    url.path().trim_start_matches('/').to_string()
}

/// Downloads sources over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, raw: &str) -> Result<ImageFile, FetchError> {
        let url = parse_url(raw)?;
        debug!(url = %url, "fetching remote source");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(raw.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: raw.to_string(),
            });
        }

        let header_value = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let content_type = header_value(header::CONTENT_TYPE);
        let last_modified = header_value(header::LAST_MODIFIED);

        let body = response.bytes().await?;
        let mut file = ImageFile::new(url_filepath(&url), body);
        if let Some(content_type) = content_type {
            file.set_header(CONTENT_TYPE, content_type);
        }
        if let Some(last_modified) = last_modified {
            file.set_header(LAST_MODIFIED, last_modified);
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url_accepts_http_and_https() {
        assert!(parse_url("http://example.com/a.png").is_ok());
        assert!(parse_url("https://example.com/a.png").is_ok());
    }

    #[test]
    fn parse_url_rejects_garbage_and_other_schemes() {
        assert!(matches!(
            parse_url("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_url("file:///etc/passwd"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn url_filepath_strips_leading_slash() {
        let url = parse_url("https://cdn.example.com/img/cat.jpg?x=1").unwrap();
        assert_eq!(url_filepath(&url), "img/cat.jpg");
    }

    #[test]
    fn client_builds_with_user_agent() {
        assert!(HttpFetcher::new("picstash/test", Duration::from_secs(5)).is_ok());
    }
}
