//! Archive extraction.
//!
//! Handles tar.gz, tar.zst, tar, zip, single-file gzip, and raw executables.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use zip::ZipArchive;
use zstd::stream::Decoder as ZstdDecoder;

/// Errors raised while unpacking an artifact.
#[derive(Error, Debug)]
pub enum UnpackError {
    /// Reading the archive or writing the tree failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The format is not one the unpacker understands.
    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// The archive is corrupt or contains an unsafe path.
    #[error("Archive error: {0}")]
    Archive(String),
}

/// Turns a downloaded artifact into an install tree.
#[async_trait]
pub trait Unpacker: Send + Sync {
    /// Unpack `archive` (downloaded as `asset`) into `dest`.
    ///
    /// An empty `format` is detected from the asset name.
    async fn unpack(&self, archive: &Path, asset: &str, format: &str, dest: &Path) -> Result<(), UnpackError>;
}

/// Unpacker for the formats registries commonly use.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveUnpacker;

#[async_trait]
impl Unpacker for ArchiveUnpacker {
    async fn unpack(&self, archive: &Path, asset: &str, format: &str, dest: &Path) -> Result<(), UnpackError> {
        let archive = archive.to_path_buf();
        let asset = asset.to_string();
        let format = format.to_string();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || unpack(&archive, &asset, &format, &dest))
            .await
            .map_err(io::Error::other)?
    }
}

/// Archive formats the unpacker handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tarball.
    TarGz,
    /// Zstandard-compressed tarball.
    TarZst,
    /// Plain tarball.
    Tar,
    /// Zip archive.
    Zip,
    /// A single gzip-compressed file.
    Gz,
    /// The executable itself.
    Raw,
}

impl ArchiveFormat {
    /// Format for a registry `format` value, detecting from `asset` when empty.
    ///
    /// # Errors
    ///
    /// Returns [`UnpackError::UnsupportedFormat`] for unknown formats.
    pub fn resolve(format: &str, asset: &str) -> Result<Self, UnpackError> {
        match format {
            "" => Ok(Self::detect(asset)),
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "tar.zst" | "tzst" => Ok(Self::TarZst),
            "tar" => Ok(Self::Tar),
            "zip" => Ok(Self::Zip),
            "gz" => Ok(Self::Gz),
            "raw" => Ok(Self::Raw),
            other => Err(UnpackError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Detect from a file name; anything unrecognised is raw.
    pub fn detect(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Self::TarZst
        } else if name.ends_with(".tar") {
            Self::Tar
        } else if name.ends_with(".zip") {
            Self::Zip
        } else if name.ends_with(".gz") {
            Self::Gz
        } else {
            Self::Raw
        }
    }
}

fn unpack(archive: &Path, asset: &str, format: &str, dest: &Path) -> Result<(), UnpackError> {
    let format = ArchiveFormat::resolve(format, asset)?;
    tracing::debug!(asset, ?format, dest = %dest.display(), "unpacking");
    fs::create_dir_all(dest)?;
    let reader = || File::open(archive).map(BufReader::new);
    let base = asset.rsplit('/').next().unwrap_or(asset);
    match format {
        ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(reader()?), dest),
        ArchiveFormat::TarZst => extract_tar(ZstdDecoder::new(reader()?)?, dest),
        ArchiveFormat::Tar => extract_tar(reader()?, dest),
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::Gz => {
            let name = base.strip_suffix(".gz").unwrap_or(base);
            let target = dest.join(name);
            let mut out = File::create(&target)?;
            io::copy(&mut flate2::read::GzDecoder::new(reader()?), &mut out)?;
            make_executable(&target)
        }
        ArchiveFormat::Raw => {
            let target = dest.join(base);
            fs::copy(archive, &target)?;
            make_executable(&target)
        }
    }
}

/// Relative path of an archive entry, or `None` if it would escape the root.
///
/// Entries naming the root itself (`./`) come back empty.
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => out.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<(), UnpackError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        // Zip Slip
        let relative_path = sanitize(&entry_path).ok_or_else(|| {
            UnpackError::Archive(format!("Invalid path in archive: {}", entry_path.display()))
        })?;
        if relative_path.as_os_str().is_empty() {
            continue;
        }
        let absolute_path = dest.join(&relative_path);

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }
        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&absolute_path)?;
    }
    Ok(())
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), UnpackError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| UnpackError::Archive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| UnpackError::Archive(e.to_string()))?;
        let Some(relative_path) = file.enclosed_name() else {
            return Err(UnpackError::Archive(format!("Invalid path in archive: {}", file.name())));
        };
        let absolute_path = dest.join(&relative_path);

        if file.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }
        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), UnpackError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_: &Path) -> Result<(), UnpackError> {
    Ok(())
}
