//! Fetching registry documents that are not cached yet.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tokio::io::AsyncReadExt;
use toolpin_schema::{RegistryKind, RegistryRef, Runtime};

use super::RegistryError;
use crate::io::download::Downloader;
use crate::template::{self, Vars};

/// Retrieves the raw bytes of a registry document.
#[async_trait]
pub trait RegistryFetcher: Send + Sync {
    /// Fetch the document `registry` points at.
    ///
    /// `registry` is already normalized, so `standard` has been expanded.
    async fn fetch(&self, registry: &RegistryRef) -> Result<Vec<u8>, RegistryError>;
}

/// Fetches `github_content` registries from raw.githubusercontent.com.
#[derive(Debug, Clone)]
pub struct GitHubContentFetcher {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubContentFetcher {
    /// A fetcher using `client`, authenticating with `GITHUB_TOKEN` when set.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: "https://raw.githubusercontent.com".to_string(),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    /// Point the fetcher at another host (mirrors, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Override the bearer token.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(&self, registry: &RegistryRef) -> Result<String, RegistryError> {
        let field = |v: &Option<String>, name: &str| {
            v.clone().ok_or_else(|| RegistryError::Validation {
                registry: registry.name.clone(),
                reason: format!("{name} is required"),
            })
        };
        Ok(format!(
            "{}/{}/{}/{}/{}",
            self.base_url,
            field(&registry.repo_owner, "repo_owner")?,
            field(&registry.repo_name, "repo_name")?,
            field(&registry.git_ref, "ref")?,
            field(&registry.path, "path")?.trim_start_matches('/'),
        ))
    }
}

#[async_trait]
impl RegistryFetcher for GitHubContentFetcher {
    async fn fetch(&self, registry: &RegistryRef) -> Result<Vec<u8>, RegistryError> {
        if registry.kind != RegistryKind::GithubContent {
            return Err(RegistryError::Validation {
                registry: registry.name.clone(),
                reason: format!("{} registries cannot be fetched", registry.kind.as_str()),
            });
        }
        let url = self.url(registry)?;
        let fetch_err = |e: reqwest::Error| RegistryError::Fetch {
            registry: registry.name.clone(),
            reason: e.to_string(),
        };

        tracing::debug!(registry = %registry.name, %url, "fetching registry");
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(fetch_err)?
            .error_for_status()
            .map_err(fetch_err)?;
        Ok(response.bytes().await.map_err(fetch_err)?.to_vec())
    }
}

/// Fetches `http` registries through a [`Downloader`].
///
/// The URL template is rendered with the registry's `version`. A `tar.gz`
/// registry is a bundle holding the document at `path`, or at
/// `registry.yaml` (then `registry.json`) when no path is declared.
pub struct HttpRegistryFetcher {
    downloader: Arc<dyn Downloader>,
}

impl std::fmt::Debug for HttpRegistryFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistryFetcher").finish_non_exhaustive()
    }
}

impl HttpRegistryFetcher {
    /// A fetcher downloading through `downloader`.
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self { downloader }
    }
}

/// Rendered document URL of an `http` registry.
///
/// # Errors
///
/// Returns [`RegistryError::Validation`] if the URL or version is unset, the
/// template fails, or the result is not a URL.
pub fn render_http_url(registry: &RegistryRef) -> Result<Url, RegistryError> {
    let invalid = |reason: String| RegistryError::Validation {
        registry: registry.name.clone(),
        reason,
    };
    let (Some(url), Some(version)) = (registry.url.as_deref(), registry.version.as_deref()) else {
        return Err(invalid("url and version are required".to_string()));
    };
    let vars = Vars::new(version, &Runtime::current(), None, false, registry.http_format());
    let rendered = template::render(url, &vars).map_err(|e| invalid(e.to_string()))?;
    Url::parse(&rendered).map_err(|e| invalid(format!("invalid url {rendered:?}: {e}")))
}

/// Pull the registry document out of a gzipped tarball.
fn document_from_tarball(bytes: &[u8], path: Option<&str>) -> std::io::Result<Option<Vec<u8>>> {
    let wanted: Vec<&str> = match path {
        Some(p) => vec![p.trim_start_matches("./")],
        None => vec!["registry.yaml", "registry.json"],
    };
    let mut found: Vec<Option<Vec<u8>>> = vec![None; wanted.len()];
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(bytes));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().trim_start_matches("./").to_string();
        if let Some(i) = wanted.iter().position(|w| *w == name) {
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut buf)?;
            found[i] = Some(buf);
        }
    }
    Ok(found.into_iter().flatten().next())
}

#[async_trait]
impl RegistryFetcher for HttpRegistryFetcher {
    async fn fetch(&self, registry: &RegistryRef) -> Result<Vec<u8>, RegistryError> {
        let fetch_err = |reason: String| RegistryError::Fetch {
            registry: registry.name.clone(),
            reason,
        };
        if registry.kind != RegistryKind::Http {
            return Err(RegistryError::Validation {
                registry: registry.name.clone(),
                reason: format!("{} registries cannot be fetched over http", registry.kind.as_str()),
            });
        }
        let url = render_http_url(registry)?;

        tracing::debug!(registry = %registry.name, %url, "fetching registry");
        let mut body = self
            .downloader
            .download(url.as_str())
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let mut bytes = Vec::new();
        body.reader
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        if registry.http_format() != "tar.gz" {
            return Ok(bytes);
        }
        let path = registry.path.clone().filter(|p| !p.is_empty());
        tokio::task::spawn_blocking(move || document_from_tarball(&bytes, path.as_deref()))
            .await
            .map_err(|e| fetch_err(e.to_string()))?
            .map_err(|e| fetch_err(format!("failed to read the registry archive: {e}")))?
            .ok_or_else(|| fetch_err("registry file not found in archive".to_string()))
    }
}
