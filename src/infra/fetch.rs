//! Loading of image sources that do not live in the vault.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL `{url}`: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} for `{url}`")]
    Status { status: u16, url: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Fetches `http(s)` URLs over the network and `file` URLs from disk.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("clipdoc/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::Url {
            url: url.to_string(),
            source,
        })?;
        match parsed.scheme() {
            "http" | "https" => {
                let resp = self.client.get(parsed).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
                Ok(resp.bytes().await?)
            }
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| FetchError::UnsupportedScheme {
                        scheme: "file".to_string(),
                    })?;
                Ok(Bytes::from(tokio::fs::read(path).await?))
            }
            other => Err(FetchError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn fetches_http_resources() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/pic.png");
                then.status(200).body("PNGDATA");
            })
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).expect("client");
        let bytes = fetcher
            .fetch(&server.url("/pic.png"))
            .await
            .expect("fetched");
        assert_eq!(&bytes[..], b"PNGDATA");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn reports_http_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.png");
                then.status(404);
            })
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).expect("client");
        let err = fetcher
            .fetch(&server.url("/missing.png"))
            .await
            .expect_err("404 is an error");
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn reads_file_urls_and_rejects_other_schemes() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"abc").expect("write");
        let url = Url::from_file_path(&path).expect("file url");

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).expect("client");
        let bytes = fetcher.fetch(url.as_str()).await.expect("file read");
        assert_eq!(&bytes[..], b"abc");

        let err = fetcher
            .fetch("app://local/elsewhere.png")
            .await
            .expect_err("unsupported");
        assert!(matches!(err, FetchError::UnsupportedScheme { .. }));
    }
}
