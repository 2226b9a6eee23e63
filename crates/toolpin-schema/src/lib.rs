//! Shared document types for toolpin.
//!
//! Everything here is plain data with serde derives: registry package
//! definitions, the manifest, the policy document, and the `GOOS`/`GOARCH`
//! runtime packages are resolved for. No I/O happens in this crate.

pub mod manifest;
pub mod package;
pub mod policy;
pub mod runtime;
pub mod types;

// Re-exports
pub use manifest::{ChecksumConfig, Config, ManifestError, ManifestPackage, RegistryKind, RegistryRef};
pub use package::{
    Alias, ChecksumPattern, ChecksumSource, DefinitionError, File, FormatOverride, Override,
    PackageDefinition, PackageType, RegistryDocument, Replacements, VersionOverride,
};
pub use policy::{PolicyDocument, PolicyPackage, PolicyRegistry};
pub use runtime::Runtime;
pub use types::*;
