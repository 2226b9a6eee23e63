//! Command links.
//!
//! Every command in `bin/` is a symlink to the shared proxy. An existing
//! link is repaired in place; anything that is not a symlink is left alone.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while creating a link.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Something other than a symlink sits where the link belongs.
    #[error("{} already exists and is not a symlink; remove it manually", path.display())]
    Occupied {
        /// The occupied path.
        path: PathBuf,
    },

    /// Filesystem error.
    #[error("failed to link {}: {source}", path.display())]
    Io {
        /// The link path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// What [`ensure_link`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The link already pointed at the target.
    Unchanged,
    /// A new link was created.
    Created,
    /// A link to another target was replaced.
    Replaced,
}

/// Make `link` a symlink to `target`.
///
/// # Errors
///
/// Returns [`LinkError::Occupied`] if a regular file, directory, or other
/// non-symlink exists at `link`. It is never removed.
pub fn ensure_link(link: &Path, target: &Path) -> Result<LinkOutcome, LinkError> {
    let io_err = |source| LinkError::Io {
        path: link.to_path_buf(),
        source,
    };

    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let current = std::fs::read_link(link).map_err(io_err)?;
            if current == target {
                return Ok(LinkOutcome::Unchanged);
            }
            tracing::info!(
                link = %link.display(),
                old = %current.display(),
                new = %target.display(),
                "relinking"
            );
            replace_link(link, target).map_err(io_err)?;
            Ok(LinkOutcome::Replaced)
        }
        Ok(_) => Err(LinkError::Occupied {
            path: link.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = link.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            tracing::info!(link = %link.display(), target = %target.display(), "creating link");
            match symlink(target, link) {
                Ok(()) => Ok(LinkOutcome::Created),
                // Another task created it first.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => ensure_link(link, target),
                Err(e) => Err(io_err(e)),
            }
        }
        Err(e) => Err(io_err(e)),
    }
}

/// Swap the link by renaming a fresh one over it.
///
/// The fresh link gets a unique name beside `link`, so concurrent swaps in
/// one directory never share a temp path.
fn replace_link(link: &Path, target: &Path) -> io::Result<()> {
    let parent = link
        .parent()
        .ok_or_else(|| io::Error::other("link has no parent directory"))?;
    let name = link
        .file_name()
        .ok_or_else(|| io::Error::other("link has no file name"))?;
    let tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name.to_string_lossy()))
        .suffix(".tmp")
        .make_in(parent, |path| symlink(target, path))?
        .into_temp_path();
    if let Err(e) = tmp.persist(link) {
        let path = e.path.to_path_buf();
        if let Err(cleanup) = e.path.close() {
            tracing::debug!(path = %path.display(), error = %cleanup, "failed to remove the temporary link");
        }
        return Err(e.error);
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_then_unchanged() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("bin/gh");
        let target = Path::new("../toolpin-proxy");

        assert_eq!(ensure_link(&link, target).unwrap(), LinkOutcome::Created);
        assert_eq!(std::fs::read_link(&link).unwrap(), target);
        assert_eq!(ensure_link(&link, target).unwrap(), LinkOutcome::Unchanged);
    }

    #[test]
    fn test_wrong_target_is_replaced() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("gh");
        std::os::unix::fs::symlink("/usr/bin/gh", &link).unwrap();

        let target = Path::new("../toolpin-proxy");
        assert_eq!(ensure_link(&link, target).unwrap(), LinkOutcome::Replaced);
        assert_eq!(std::fs::read_link(&link).unwrap(), target);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_regular_file_is_left_alone() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("gh");
        std::fs::write(&link, "user binary").unwrap();

        let err = ensure_link(&link, Path::new("../toolpin-proxy")).unwrap_err();
        assert!(matches!(err, LinkError::Occupied { .. }));
        assert_eq!(std::fs::read_to_string(&link).unwrap(), "user binary");
    }

    #[test]
    fn test_directory_is_left_alone() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("gh");
        std::fs::create_dir(&link).unwrap();
        assert!(matches!(
            ensure_link(&link, Path::new("../toolpin-proxy")),
            Err(LinkError::Occupied { .. })
        ));
        assert!(link.is_dir());
    }

    #[test]
    fn test_replace_ignores_foreign_temp_files() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("gh");
        std::os::unix::fs::symlink("/usr/bin/gh", &link).unwrap();
        let stray = dir.path().join(format!(".gh.tmp.{}", std::process::id()));
        std::fs::write(&stray, "someone else's file").unwrap();

        assert_eq!(ensure_link(&link, Path::new("../toolpin-proxy")).unwrap(), LinkOutcome::Replaced);
        assert_eq!(std::fs::read_to_string(&stray).unwrap(), "someone else's file");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_concurrent_replacements() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("gh");
        std::os::unix::fs::symlink("/usr/bin/gh", &link).unwrap();

        std::thread::scope(|scope| {
            for i in 0..8 {
                let link = &link;
                scope.spawn(move || {
                    let target = PathBuf::from(format!("../proxy-{i}"));
                    replace_link(link, &target).unwrap();
                });
            }
        });

        let target = std::fs::read_link(&link).unwrap();
        assert!(target.to_string_lossy().starts_with("../proxy-"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
