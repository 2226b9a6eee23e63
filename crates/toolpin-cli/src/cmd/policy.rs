//! Policy commands and policy selection for installs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use toolpin_core::InstallerConfig;
use toolpin_core::gate::{Policy, PolicyTrust, find_policy_file};

use super::load_manifest;

/// What `toolpin policy` should do with a repository policy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustAction {
    /// Trust the file's current content.
    Allow,
    /// Ignore the file without warning.
    Deny,
}

/// The repository policy file `path` names, or the one next to the manifest.
async fn policy_file(config: Option<&Path>, path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let manifest = load_manifest(config).await?;
            match find_policy_file(&manifest.dir) {
                Some(p) => p,
                None => bail!("No policy file found next to {}", manifest.path.display()),
            }
        }
    };
    tokio::fs::canonicalize(&path)
        .await
        .with_context(|| format!("Failed to resolve {}", path.display()))
}

/// Allow or deny a repository policy file.
pub async fn trust(config: Option<&Path>, path: Option<&Path>, action: TrustAction) -> Result<()> {
    let policy = policy_file(config, path).await?;
    let trust = PolicyTrust::new(&InstallerConfig::from_env()?.root_dir);
    match action {
        TrustAction::Allow => {
            Policy::load(&policy)
                .await
                .with_context(|| format!("Refusing to allow an invalid policy {}", policy.display()))?;
            trust.allow(&policy).await?;
        }
        TrustAction::Deny => trust.deny(&policy).await?,
    }
    println!("{}", policy.display());
    Ok(())
}

/// The policy an install runs under.
///
/// An explicit file is trusted as-is. Otherwise a repository policy in
/// `manifest_dir` applies once allowed, and the default policy applies
/// when there is none or it is not allowed.
pub async fn select_policy(explicit: Option<&Path>, manifest_dir: &Path, root: &Path) -> Result<Policy> {
    if let Some(path) = explicit {
        return Policy::load(path)
            .await
            .with_context(|| format!("Failed to load policy {}", path.display()));
    }
    let Some(found) = find_policy_file(manifest_dir) else {
        return Ok(Policy::default());
    };
    let found = tokio::fs::canonicalize(&found)
        .await
        .with_context(|| format!("Failed to resolve {}", found.display()))?;
    let trusted = PolicyTrust::new(root)
        .load_trusted(&found)
        .await
        .with_context(|| format!("Failed to load policy {}", found.display()))?;
    Ok(trusted.unwrap_or_default())
}
