//! toolpin core - declarative CLI tool version management.
//!
//! A manifest pins tools by registry, name and version. This crate turns
//! those pins into installed executables:
//!
//! - **Resolution**: registry lookup, version/platform override merging
//!   ([`merge`]), and template rendering ([`template`]) produce an
//!   [`EffectivePackage`] per manifest entry.
//! - **Gating**: checksum and policy checks ([`gate`]) decide whether an
//!   artifact may be installed.
//! - **Installation**: [`Installer`] loads registries and installs packages
//!   in bounded-parallel phases, linking every command to a shared proxy.
//!
//! # Directory Layout
//!
//! ```text
//! <root>/
//! ├── bin/            # Command links to ../toolpin-proxy
//! ├── pkgs/           # Unpacked artifacts
//! ├── registries/     # Cached registry documents
//! ├── metadata/       # Usage timestamps
//! └── toolpin-proxy   # Link to the proxy executable
//! ```

pub mod config;
pub mod constraint;
pub mod error;
pub mod gate;
pub mod installer;
pub mod io;
pub mod manifest;
pub mod merge;
pub mod package;
pub mod paths;
pub mod registry;
pub mod resolve;
pub mod template;
pub mod vacuum;
pub mod version_range;

pub mod reporter;

pub use config::{ConfigError, InstallerConfig};
pub use error::{InstallAllError, InstallError};
pub use installer::{Installer, PackageOutcome, PackageState};
pub use manifest::Manifest;
pub use package::EffectivePackage;
pub use reporter::{NullReporter, Reporter, TracingReporter};
pub use resolve::{find_command, resolve_effective_package};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("toolpin/", env!("CARGO_PKG_VERSION"));
