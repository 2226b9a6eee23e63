//! Artifact downloads with streaming SHA-256.

use std::path::Path;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Errors raised while downloading an artifact.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The request failed or returned an error status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Reading the body or writing the file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An open response body.
pub struct DownloadBody {
    /// Byte stream of the artifact.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Content length, when the server sent one.
    pub length: Option<u64>,
}

impl std::fmt::Debug for DownloadBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadBody")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Opens artifact byte streams.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Start downloading `url`.
    async fn download(&self, url: &str) -> Result<DownloadBody, DownloadError>;
}

/// reqwest-backed downloader.
///
/// `GITHUB_TOKEN` is sent as a bearer token to GitHub hosts only.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    token: Option<String>,
}

impl HttpDownloader {
    /// A downloader reading `GITHUB_TOKEN` from the environment.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    /// Override the bearer token.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn is_github(url: &str) -> bool {
        reqwest::Url::parse(url).ok().is_some_and(|u| {
            u.host_str().is_some_and(|h| {
                h == "github.com" || h.ends_with(".github.com") || h.ends_with(".githubusercontent.com")
            })
        })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<DownloadBody, DownloadError> {
        tracing::debug!(%url, "downloading");
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT);
        if let Some(token) = self.token.as_deref().filter(|_| Self::is_github(url)) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?.error_for_status()?;
        let length = response.content_length();
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(DownloadBody {
            reader: Box::new(StreamReader::new(stream)),
            length,
        })
    }
}

/// Copy `reader` into a new file at `dest`, hashing as it goes.
///
/// `progress` is called with the running byte count after every chunk.
/// Returns the lowercase hex SHA-256 of everything written.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if reading or writing fails.
pub async fn stream_to_file(
    mut reader: impl AsyncRead + Unpin,
    dest: &Path,
    mut progress: impl FnMut(u64),
) -> Result<String, DownloadError> {
    let mut file = File::create(dest).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut downloaded: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        hasher.update(&buf[..n]);
        downloaded += n as u64;
        progress(downloaded);
    }

    file.flush().await?;
    Ok(hex::encode(hasher.finalize()))
}
