//! Subcommand implementations.

pub mod install;
pub mod policy;
pub mod which;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use toolpin_core::Manifest;
use toolpin_core::manifest::find_manifest;

/// Load the manifest at `path`, or the nearest one above the working directory.
pub async fn load_manifest(path: Option<&Path>) -> Result<Manifest> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().context("Failed to read the working directory")?;
            match find_manifest(&cwd) {
                Some(p) => p,
                None => bail!("No toolpin.yaml found in {} or its parents", cwd.display()),
            }
        }
    };
    tracing::debug!(manifest = %path.display(), "loading manifest");
    Manifest::load(&path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))
}

/// HTTP client shared by every network collaborator.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(toolpin_core::USER_AGENT)
        .build()
        .context("Failed to build the HTTP client")
}
