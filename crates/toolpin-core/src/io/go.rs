//! Building `go` and `go_install` packages.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while building a Go package.
#[derive(Error, Debug)]
pub enum GoError {
    /// No `go` binary on `PATH`.
    #[error("go is not installed: {0}")]
    NotFound(String),

    /// `go install` exited unsuccessfully.
    #[error("go install {target} failed: {stderr}")]
    Failed {
        /// `path@version` that was being installed.
        target: String,
        /// Captured standard error.
        stderr: String,
    },

    /// Spawning the process failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compiles Go packages into a bin directory.
#[async_trait]
pub trait GoToolchain: Send + Sync {
    /// Run `go install <go_path>@<version>` with `GOBIN=<bin_dir>`.
    async fn install(&self, go_path: &str, version: &str, bin_dir: &Path) -> Result<(), GoError>;
}

/// Shells out to the `go` command.
#[derive(Debug, Clone, Default)]
pub struct CommandGoToolchain {
    go: Option<PathBuf>,
}

impl CommandGoToolchain {
    /// Use the `go` found on `PATH` at install time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `go` binary.
    pub fn with_binary(go: PathBuf) -> Self {
        Self { go: Some(go) }
    }

    fn binary(&self) -> Result<PathBuf, GoError> {
        match &self.go {
            Some(go) => Ok(go.clone()),
            None => which::which("go").map_err(|e| GoError::NotFound(e.to_string())),
        }
    }
}

#[async_trait]
impl GoToolchain for CommandGoToolchain {
    async fn install(&self, go_path: &str, version: &str, bin_dir: &Path) -> Result<(), GoError> {
        let go = self.binary()?;
        let target = format!("{go_path}@{version}");
        tokio::fs::create_dir_all(bin_dir).await?;
        tracing::info!(%target, bin_dir = %bin_dir.display(), "go install");

        let output = tokio::process::Command::new(go)
            .arg("install")
            .arg(&target)
            .env("GOBIN", bin_dir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(GoError::Failed {
                target,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = CommandGoToolchain::with_binary(dir.path().join("no-such-go"));
        let err = toolchain
            .install("golang.org/x/tools/cmd/goimports", "v0.1.0", &dir.path().join("bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, GoError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_install_captures_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("go");
        std::fs::write(&fake, "#!/bin/sh\necho \"cannot find module $2\" >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = CommandGoToolchain::with_binary(fake)
            .install("example.com/nope", "v1.0.0", &dir.path().join("bin"))
            .await
            .unwrap_err();
        match err {
            GoError::Failed { target, stderr } => {
                assert_eq!(target, "example.com/nope@v1.0.0");
                assert_eq!(stderr, "cannot find module example.com/nope@v1.0.0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
