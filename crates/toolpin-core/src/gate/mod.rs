//! Installation gate: checksum and policy checks.
//!
//! Nothing is installed unless its registry and package pass the
//! [`PolicyStore`], and, when checksum enforcement is on, the downloaded
//! artifact's SHA-256 matches the [`ChecksumStore`] entry for its checksum ID,
//! or, for an artifact with no entry yet, the checksum file its registry
//! definition points at.

pub mod checksum;
pub mod policy;
pub mod published;
pub mod trust;

use std::path::PathBuf;

use thiserror::Error;

pub use checksum::{CHECKSUM_FILE_NAME, ChecksumEntry, ChecksumFile, ChecksumOutcome, ChecksumStore, check_checksum};
pub use policy::{Policy, PolicyStore, PolicyTarget};
pub use published::{ChecksumAlgorithm, ChecksumFileError, PublishedChecksum};
pub use trust::{POLICY_FILE_NAMES, PolicyTrust, TrustState, find_policy_file};

/// Errors raised by the gate.
#[derive(Error, Debug)]
pub enum GateError {
    /// Enforcement requires a checksum and none is recorded.
    #[error("checksum for {id} is required but not found")]
    ChecksumMissing {
        /// Checksum ID.
        id: String,
    },

    /// The artifact does not match its recorded checksum.
    #[error("checksum mismatch for {id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum ID.
        id: String,
        /// Recorded digest.
        expected: String,
        /// Digest of the downloaded artifact.
        actual: String,
    },

    /// The checksum file published for the artifact cannot be used.
    #[error("published checksum for {id}: {source}")]
    PublishedChecksum {
        /// Checksum ID.
        id: String,
        /// What went wrong.
        source: ChecksumFileError,
    },

    /// No policy rule allows the package.
    #[error("package {name}@{version} from registry {registry} is not allowed by the policy")]
    PackageDenied {
        /// Registry name.
        registry: String,
        /// Package name.
        name: String,
        /// Package version.
        version: String,
    },

    /// No policy rule allows the registry.
    #[error("registry {registry} is not allowed by the policy")]
    RegistryDenied {
        /// Registry name.
        registry: String,
    },

    /// The policy document is malformed.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// The checksum or policy file could not be read or written.
    #[error("failed to access {}: {reason}", path.display())]
    File {
        /// File path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
}
