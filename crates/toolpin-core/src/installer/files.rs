//! Checking the files a package declares.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::InstallError;

/// How many paths are listed when a declared file is missing.
const MAX_LISTED_PATHS: usize = 30;

/// Check that `path` is a file with the owner execute bit.
///
/// A missing bit is added unless `strict` is set.
///
/// # Errors
///
/// Returns [`InstallError::FileNotFound`] when nothing is at `path`,
/// [`InstallError::NotExecutable`] for a directory, or in strict mode for a
/// file without the execute bit.
pub fn check_file(pkg_path: &Path, file: &str, path: &Path, strict: bool) -> Result<(), InstallError> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log_package_contents(pkg_path);
            return Err(InstallError::FileNotFound {
                file: file.to_string(),
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        return Err(InstallError::NotExecutable {
            file: file.to_string(),
            path: path.to_path_buf(),
            reason: "it is a directory",
        });
    }
    ensure_executable(file, path, &meta, strict)
}

#[cfg(unix)]
fn ensure_executable(
    file: &str,
    path: &Path,
    meta: &std::fs::Metadata,
    strict: bool,
) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = meta.permissions().mode();
    if mode & 0o100 != 0 {
        return Ok(());
    }
    if strict {
        return Err(InstallError::NotExecutable {
            file: file.to_string(),
            path: path.to_path_buf(),
            reason: "the owner execute bit is not set",
        });
    }
    tracing::debug!(path = %path.display(), "adding the execute permission");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o100))?;
    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_: &str, _: &Path, _: &std::fs::Metadata, _: bool) -> Result<(), InstallError> {
    Ok(())
}

fn log_package_contents(pkg_path: &Path) {
    let found: Vec<String> = WalkDir::new(pkg_path)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .take(MAX_LISTED_PATHS)
        .filter_map(|e| e.path().strip_prefix(pkg_path).ok().map(|p| p.display().to_string()))
        .collect();
    tracing::error!(
        pkg_path = %pkg_path.display(),
        ?found,
        "declared file is missing; the package contains these paths"
    );
}
