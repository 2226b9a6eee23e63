//! Installer error types.

use std::path::PathBuf;

use thiserror::Error;
use toolpin_schema::DefinitionError;

use crate::constraint::ConstraintError;
use crate::gate::GateError;
use crate::installer::link::LinkError;
use crate::io::{DownloadError, GoError, UnpackError};
use crate::package::RenderError;
use crate::registry::RegistryError;
use crate::resolve::ResolveError;

/// Why a single package failed to install.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The package could not be resolved.
    #[error("failed to resolve package: {0}")]
    Resolve(#[from] ResolveError),

    /// The merged definition is incomplete.
    #[error("invalid package definition: {0}")]
    Definition(#[from] DefinitionError),

    /// A constraint in the definition failed to evaluate.
    #[error("invalid constraint: {0}")]
    Constraint(#[from] ConstraintError),

    /// A template or URL failed to render.
    #[error("failed to render package: {0}")]
    Render(#[from] RenderError),

    /// The checksum or policy gate refused the package.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// Downloading the artifact failed.
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    /// Unpacking the artifact failed.
    #[error("unpack failed: {0}")]
    Unpack(#[from] UnpackError),

    /// Building a Go package failed.
    #[error(transparent)]
    Go(#[from] GoError),

    /// A command link could not be created.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A declared file is not in the unpacked package.
    #[error("file {file} is not found at {}", path.display())]
    FileNotFound {
        /// Command name.
        file: String,
        /// Where it was expected.
        path: PathBuf,
    },

    /// A declared file exists but cannot be used as an executable.
    #[error("file {file} at {} is not executable: {reason}", path.display())]
    NotExecutable {
        /// Command name.
        file: String,
        /// Resolved path.
        path: PathBuf,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Another writer filled the install path first.
    #[error("{} already exists", .0.display())]
    DestinationExists(PathBuf),

    /// The package is refused outright.
    #[error("refusing to install: {0}")]
    Refused(String),

    /// The run was cancelled before the package finished.
    #[error("installation cancelled")]
    Cancelled,

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure, with the step it happened in.
    #[error("{context}: {message}")]
    Context {
        /// Step that failed.
        context: &'static str,
        /// Underlying message.
        message: String,
    },
}

impl InstallError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }
}

/// Why `install_all` failed as a whole.
#[derive(Error, Debug)]
pub enum InstallAllError {
    /// Registries could not be loaded; no package was attempted.
    #[error("failed to load {} registr{}", failed.len(), if failed.len() == 1 { "y" } else { "ies" })]
    Registries {
        /// Every registry failure, in completion order.
        failed: Vec<RegistryError>,
    },

    /// The proxy could not be installed; no package was attempted.
    #[error("failed to install the proxy: {0}")]
    Proxy(#[source] InstallError),

    /// Some packages failed. Each was reported individually already.
    #[error("failed to install {failed} package(s)")]
    Failed {
        /// Number of failed packages.
        failed: usize,
    },
}
