//! Trust records for repository policy files.
//!
//! A policy file committed next to a manifest only takes effect after the
//! user allows it. Allowing stores the file's SHA-256 under
//! `<root>/policies/<absolute path>.sha256`; any later edit makes the record
//! stale and the file is ignored again until it is re-allowed. Denying drops
//! the record and leaves a marker under `<root>/policy-warnings/` so the
//! ignored file stops producing a warning.
//!
//! Policy files named explicitly (`--policy`, `TOOLPIN_POLICY_CONFIG`) are
//! trusted as-is and never pass through here.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{GateError, Policy};
use crate::paths;
use crate::registry::load::write_atomic;

/// Names a repository policy file may have, relative to the manifest directory.
pub const POLICY_FILE_NAMES: [&str; 3] = ["toolpin-policy.yaml", ".toolpin-policy.yaml", ".toolpin/policy.yaml"];

/// The first repository policy file present in `dir`.
pub fn find_policy_file(dir: &Path) -> Option<PathBuf> {
    POLICY_FILE_NAMES
        .iter()
        .map(|name| name.split('/').fold(dir.to_path_buf(), |acc, seg| acc.join(seg)))
        .find(|p| p.is_file())
}

/// Whether a policy file may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustState {
    /// Allowed, and unchanged since.
    Allowed,
    /// Allowed once, but edited since.
    Changed,
    /// Explicitly denied.
    Denied,
    /// Never allowed or denied.
    Unknown,
}

/// Allow and deny records kept under the root directory.
#[derive(Debug, Clone)]
pub struct PolicyTrust {
    root: PathBuf,
}

impl PolicyTrust {
    /// Records under `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// `policy` as a relative path that mirrors its absolute location.
    fn mirror(policy: &Path) -> PathBuf {
        policy
            .components()
            .filter_map(|c| match c {
                Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
                Component::Prefix(prefix) => Some(prefix.as_os_str().to_string_lossy().replace(':', "_")),
                _ => None,
            })
            .collect()
    }

    fn record_path(&self, policy: &Path) -> PathBuf {
        let mut path = paths::policies_dir(&self.root).join(Self::mirror(policy));
        path.as_mut_os_string().push(".sha256");
        path
    }

    fn warning_path(&self, policy: &Path) -> PathBuf {
        paths::policy_warnings_dir(&self.root).join(Self::mirror(policy))
    }

    async fn digest(policy: &Path) -> Result<String, GateError> {
        let bytes = tokio::fs::read(policy).await.map_err(|e| file_err(policy, &e))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Trust the current content of `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::File`] if the policy cannot be read or the record
    /// cannot be written.
    pub async fn allow(&self, policy: &Path) -> Result<(), GateError> {
        let digest = Self::digest(policy).await?;
        let record = self.record_path(policy);
        write_atomic(&record, digest.into_bytes())
            .await
            .map_err(|e| file_err(&record, &e))?;
        remove_if_present(&self.warning_path(policy)).await?;
        tracing::info!(policy = %policy.display(), "allowed the policy file");
        Ok(())
    }

    /// Stop trusting `policy` and silence the warning about it.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::File`] if a record cannot be removed or written.
    pub async fn deny(&self, policy: &Path) -> Result<(), GateError> {
        remove_if_present(&self.record_path(policy)).await?;
        let marker = self.warning_path(policy);
        write_atomic(&marker, Vec::new())
            .await
            .map_err(|e| file_err(&marker, &e))?;
        tracing::info!(policy = %policy.display(), "denied the policy file");
        Ok(())
    }

    /// Current trust of `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::File`] if the policy or a record cannot be read.
    pub async fn state(&self, policy: &Path) -> Result<TrustState, GateError> {
        let record = self.record_path(policy);
        let recorded = match tokio::fs::read_to_string(&record).await {
            Ok(recorded) => recorded,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let denied = tokio::fs::try_exists(self.warning_path(policy)).await.unwrap_or(false);
                return Ok(if denied { TrustState::Denied } else { TrustState::Unknown });
            }
            Err(e) => return Err(file_err(&record, &e)),
        };
        if recorded.trim() == Self::digest(policy).await? {
            Ok(TrustState::Allowed)
        } else {
            Ok(TrustState::Changed)
        }
    }

    /// Compile `policy` if it is trusted, or warn and return `None`.
    ///
    /// # Errors
    ///
    /// Returns a [`GateError`] if trust cannot be determined or a trusted
    /// policy fails to load.
    pub async fn load_trusted(&self, policy: &Path) -> Result<Option<Policy>, GateError> {
        let state = self.state(policy).await?;
        match state {
            TrustState::Allowed => Policy::load(policy).await.map(Some),
            TrustState::Denied => {
                tracing::debug!(policy = %policy.display(), "ignoring the denied policy file");
                Ok(None)
            }
            TrustState::Changed | TrustState::Unknown => {
                tracing::warn!(
                    policy = %policy.display(),
                    changed = state == TrustState::Changed,
                    "the policy file is ignored until it is allowed with `toolpin policy allow`; \
                     run `toolpin policy deny` to keep ignoring it without this warning"
                );
                Ok(None)
            }
        }
    }
}

fn file_err(path: &Path, e: &std::io::Error) -> GateError {
    GateError::File {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

async fn remove_if_present(path: &Path) -> Result<(), GateError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(file_err(path, &e)),
    }
}
