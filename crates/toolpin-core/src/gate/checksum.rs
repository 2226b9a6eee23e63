//! Trusted artifact digests.
//!
//! `toolpin-checksums.json` sits next to the manifest:
//!
//! ```json
//! {
//!   "checksums": [
//!     {
//!       "id": "github_release/github.com/cli/cli/v2.17.0/gh_2.17.0_macOS_amd64.tar.gz",
//!       "checksum": "8e8f3c1b...",
//!       "algorithm": "sha256"
//!     }
//!   ]
//! }
//! ```
//!
//! Digests first seen while enforcement is on but not required are recorded
//! and written back by [`ChecksumFile::save`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::GateError;

/// File name of the checksum file.
pub const CHECKSUM_FILE_NAME: &str = "toolpin-checksums.json";

/// Lookup of trusted digests by checksum ID.
pub trait ChecksumStore: Send + Sync {
    /// Recorded SHA-256 (lowercase hex) for `id`.
    fn get(&self, id: &str) -> Option<String>;

    /// Remember a digest seen for the first time.
    fn record(&self, _id: &str, _digest: &str) {}

    /// Whether `digest` matches the recorded one. Unknown IDs never verify.
    fn verify(&self, id: &str, digest: &str) -> bool {
        self.get(id).is_some_and(|expected| expected.eq_ignore_ascii_case(digest))
    }
}

/// One entry of the checksum file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumEntry {
    /// Checksum ID.
    pub id: String,
    /// Hex digest.
    pub checksum: String,
    /// Digest algorithm; only `sha256` is produced.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

fn default_algorithm() -> String {
    "sha256".to_string()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChecksumDocument {
    #[serde(default)]
    checksums: Vec<ChecksumEntry>,
}

/// Checksum store backed by `toolpin-checksums.json`.
#[derive(Debug, Default)]
pub struct ChecksumFile {
    entries: Mutex<BTreeMap<String, String>>,
    dirty: AtomicBool,
}

impl ChecksumFile {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `entries`; non-sha256 entries are ignored.
    pub fn from_entries(entries: impl IntoIterator<Item = ChecksumEntry>) -> Self {
        let map = entries
            .into_iter()
            .filter(|e| {
                let ok = e.algorithm.eq_ignore_ascii_case("sha256");
                if !ok {
                    tracing::warn!(id = %e.id, algorithm = %e.algorithm, "ignoring checksum with unsupported algorithm");
                }
                ok
            })
            .map(|e| (e.id, e.checksum.to_ascii_lowercase()))
            .collect();
        Self {
            entries: Mutex::new(map),
            dirty: AtomicBool::new(false),
        }
    }

    /// Read the checksum file at `path`; a missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::File`] if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, GateError> {
        let file_err = |reason: String| GateError::File {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(file_err(e.to_string())),
        };
        let doc: ChecksumDocument =
            serde_json::from_slice(&bytes).map_err(|e| file_err(e.to_string()))?;
        Ok(Self::from_entries(doc.checksums))
    }

    /// Whether digests were recorded since loading.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Entries sorted by ID.
    pub fn entries(&self) -> Vec<ChecksumEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, checksum)| ChecksumEntry {
                id: id.clone(),
                checksum: checksum.clone(),
                algorithm: default_algorithm(),
            })
            .collect()
    }

    /// Write every entry to `path` (tmp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns [`GateError::File`] if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), GateError> {
        let file_err = |reason: String| GateError::File {
            path: path.to_path_buf(),
            reason,
        };
        let doc = ChecksumDocument {
            checksums: self.entries(),
        };
        let mut json = serde_json::to_vec_pretty(&doc).map_err(|e| file_err(e.to_string()))?;
        json.push(b'\n');
        crate::registry::load::write_atomic(path, json)
            .await
            .map_err(|e| file_err(e.to_string()))?;
        self.dirty.store(false, Ordering::Relaxed);
        Ok(())
    }
}

impl ChecksumStore for ChecksumFile {
    fn get(&self, id: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn record(&self, id: &str, digest: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), digest.to_ascii_lowercase());
        self.dirty.store(true, Ordering::Relaxed);
    }
}

/// Result of a passing checksum check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumOutcome {
    /// The digest matched the recorded one.
    Verified,
    /// No digest was recorded; the new one was stored.
    Recorded,
}

/// Check the digest of a downloaded artifact.
///
/// # Errors
///
/// Returns [`GateError::ChecksumMismatch`] when the recorded digest differs,
/// and [`GateError::ChecksumMissing`] when none is recorded and `require` is set.
pub fn check_checksum(
    store: &dyn ChecksumStore,
    id: &str,
    actual: &str,
    require: bool,
) -> Result<ChecksumOutcome, GateError> {
    match store.get(id) {
        Some(expected) if expected.eq_ignore_ascii_case(actual) => Ok(ChecksumOutcome::Verified),
        Some(expected) => Err(GateError::ChecksumMismatch {
            id: id.to_string(),
            expected,
            actual: actual.to_string(),
        }),
        None if require => Err(GateError::ChecksumMissing { id: id.to_string() }),
        None => {
            store.record(id, actual);
            Ok(ChecksumOutcome::Recorded)
        }
    }
}
