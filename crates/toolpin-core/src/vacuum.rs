//! Usage timestamps for cache eviction.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use crate::paths;

/// Name of the per-package timestamp file.
pub const TIMESTAMP_FILE_NAME: &str = "timestamp.txt";

/// Records that an installed package was used.
pub trait VacuumClient: Send + Sync {
    /// Note that `pkg_path` was just installed or used. Never fails the caller.
    fn touch(&self, pkg_path: &Path);
}

/// Writes `<root>/metadata/<pkg path>/timestamp.txt`.
#[derive(Debug, Clone)]
pub struct TimestampVacuum {
    root: PathBuf,
}

impl TimestampVacuum {
    /// A client for the tree at `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Where the timestamp for `pkg_path` is stored, if it lies under the root.
    pub fn timestamp_path(&self, pkg_path: &Path) -> Option<PathBuf> {
        let rel = pkg_path.strip_prefix(&self.root).ok()?;
        Some(paths::metadata_dir(&self.root).join(rel).join(TIMESTAMP_FILE_NAME))
    }

    fn write(&self, pkg_path: &Path) -> std::io::Result<()> {
        let Some(path) = self.timestamp_path(pkg_path) else {
            return Err(std::io::Error::other(format!(
                "{} is outside {}",
                pkg_path.display(),
                self.root.display()
            )));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl VacuumClient for TimestampVacuum {
    fn touch(&self, pkg_path: &Path) {
        if let Err(e) = self.write(pkg_path) {
            tracing::warn!(path = %pkg_path.display(), error = %e, "failed to record package usage");
        }
    }
}

/// Discards every touch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVacuum;

impl VacuumClient for NoopVacuum {
    fn touch(&self, _: &Path) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_writes_rfc3339() {
        let dir = tempfile::tempdir().unwrap();
        let vacuum = TimestampVacuum::new(dir.path());
        let pkg = dir.path().join("pkgs/github_release/github.com/cli/cli/v2.17.0/gh.tar.gz");

        vacuum.touch(&pkg);

        let ts = dir
            .path()
            .join("metadata/pkgs/github_release/github.com/cli/cli/v2.17.0/gh.tar.gz/timestamp.txt");
        let text = std::fs::read_to_string(ts).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&text).is_ok());
        assert!(text.ends_with('Z'));
    }

    #[test]
    fn test_outside_root_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let vacuum = TimestampVacuum::new(&dir.path().join("root"));
        vacuum.touch(Path::new("/elsewhere/pkg"));
        assert!(!dir.path().join("root/metadata").exists());
    }
}
