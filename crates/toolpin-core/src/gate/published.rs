//! Checksum files published by upstream projects.
//!
//! A registry definition may point at the checksum file a project releases
//! next to its assets. When the checksum store has no entry for an artifact,
//! the installer downloads that file, looks the asset up in it and checks the
//! artifact against it before recording the digest.
//!
//! Layouts (`file_format`):
//!
//! | Format   | Content                                                     |
//! |----------|-------------------------------------------------------------|
//! | (empty)  | `<digest> <file>` per line, or one bare digest               |
//! | `raw`    | the whole file is the digest                                 |
//! | `regexp` | `pattern.checksum` captures the digest, `pattern.file` the name |

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use toolpin_schema::{ChecksumPattern, ChecksumSource};

use super::GateError;

/// Errors raised while reading a published checksum file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChecksumFileError {
    /// Nothing in the file looks like a checksum.
    #[error("no checksum could be extracted from the checksum file")]
    Empty,

    /// The file lists checksums, but not for this asset.
    #[error("the checksum file has no entry for {0}")]
    AssetNotListed(String),

    /// `file_format` is not one we read.
    #[error("unknown checksum file format {0:?}")]
    UnknownFormat(String),

    /// The `regexp` format has no usable pattern.
    #[error("invalid checksum pattern: {0}")]
    Pattern(String),

    /// `algorithm` is not one we compute.
    #[error("unsupported checksum algorithm {0:?}")]
    UnsupportedAlgorithm(String),
}

/// Digest algorithm of a published checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    /// SHA-256, the default.
    #[default]
    Sha256,
    /// SHA-512.
    Sha512,
}

impl ChecksumAlgorithm {
    /// Parse a registry `algorithm` value; unset means SHA-256.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumFileError::UnsupportedAlgorithm`] for anything else.
    pub fn parse(name: Option<&str>) -> Result<Self, ChecksumFileError> {
        match name.map(str::trim).unwrap_or_default().to_ascii_lowercase().as_str() {
            "" | "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(ChecksumFileError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Lowercase hex digest of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be read.
    pub async fn digest_file(self, path: &Path) -> std::io::Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)?;
            Ok(match self {
                Self::Sha256 => {
                    let mut hasher = Sha256::new();
                    std::io::copy(&mut file, &mut hasher)?;
                    hex::encode(hasher.finalize())
                }
                Self::Sha512 => {
                    let mut hasher = Sha512::new();
                    std::io::copy(&mut file, &mut hasher)?;
                    hex::encode(hasher.finalize())
                }
            })
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

/// The digest a checksum file lists for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedChecksum {
    /// Algorithm the digest was computed with.
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex digest.
    pub digest: String,
}

impl PublishedChecksum {
    /// Look `asset` up in the checksum file `content`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChecksumFileError`] if the algorithm or format is unknown,
    /// the file yields no checksum, or the asset is not listed.
    pub fn find(content: &str, asset: &str, source: &ChecksumSource) -> Result<Self, ChecksumFileError> {
        let algorithm = ChecksumAlgorithm::parse(source.algorithm.as_deref())?;
        let list = parse_checksum_file(content, source)?;
        let digest = match list.single {
            Some(digest) => digest,
            None => {
                let base = asset.rsplit('/').next().unwrap_or(asset);
                list.by_file
                    .get(asset)
                    .or_else(|| list.by_file.get(base))
                    .cloned()
                    .ok_or_else(|| ChecksumFileError::AssetNotListed(asset.to_string()))?
            }
        };
        Ok(Self {
            algorithm,
            digest: digest.trim().to_ascii_lowercase(),
        })
    }

    /// Check the artifact at `archive` against this digest.
    ///
    /// `sha256` is the artifact's SHA-256, already computed while streaming;
    /// other algorithms re-read the file.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::ChecksumMismatch`] if the digests differ and
    /// [`GateError::File`] if the artifact cannot be read.
    pub async fn verify(&self, id: &str, archive: &Path, sha256: &str) -> Result<(), GateError> {
        let actual = match self.algorithm {
            ChecksumAlgorithm::Sha256 => sha256.to_ascii_lowercase(),
            other => other.digest_file(archive).await.map_err(|e| GateError::File {
                path: archive.to_path_buf(),
                reason: e.to_string(),
            })?,
        };
        if actual == self.digest {
            return Ok(());
        }
        Err(GateError::ChecksumMismatch {
            id: id.to_string(),
            expected: self.digest.clone(),
            actual,
        })
    }
}

/// Checksums read from one file: either a single digest or a file-name map.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChecksumList {
    /// The file holds one digest for whatever asset it accompanies.
    pub single: Option<String>,
    /// Digest by asset file name.
    pub by_file: HashMap<String, String>,
}

/// Parse a checksum file laid out as `source.file_format` says.
///
/// # Errors
///
/// Returns [`ChecksumFileError::Empty`] if nothing was extracted, and the
/// format or pattern errors described on [`ChecksumFileError`].
pub fn parse_checksum_file(content: &str, source: &ChecksumSource) -> Result<ChecksumList, ChecksumFileError> {
    let list = match source.file_format.as_deref().unwrap_or_default() {
        "" => parse_lines(content),
        "raw" => ChecksumList {
            single: Some(content.trim().to_string()).filter(|s| !s.is_empty()),
            ..ChecksumList::default()
        },
        "regexp" => {
            let pattern = source
                .pattern
                .as_ref()
                .ok_or_else(|| ChecksumFileError::Pattern("the regexp format needs a pattern".to_string()))?;
            parse_regexp(content, pattern)?
        }
        other => return Err(ChecksumFileError::UnknownFormat(other.to_string())),
    };
    if list.single.is_none() && list.by_file.is_empty() {
        return Err(ChecksumFileError::Empty);
    }
    Ok(list)
}

/// `sha256sum`-style lines. A lone token with no separator is a bare digest.
fn parse_lines(content: &str) -> ChecksumList {
    let lines: Vec<&str> = content.trim().lines().collect();
    if let [only] = lines.as_slice()
        && !only.contains([' ', '\t'])
    {
        return ChecksumList {
            single: Some(only.to_string()),
            ..ChecksumList::default()
        };
    }
    let by_file = lines
        .iter()
        .filter_map(|line| {
            let (digest, rest) = line.split_once([' ', '\t'])?;
            let path = rest.trim();
            let name = path.rsplit('/').next().unwrap_or(path).trim_start_matches('*');
            (!digest.is_empty() && !name.is_empty()).then(|| (name.to_string(), digest.to_string()))
        })
        .collect();
    ChecksumList {
        single: None,
        by_file,
    }
}

fn compile(pattern: &str) -> Result<Regex, ChecksumFileError> {
    Regex::new(pattern).map_err(|e| ChecksumFileError::Pattern(e.to_string()))
}

fn capture(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)?.get(1).map(|m| m.as_str().to_string())
}

fn parse_regexp(content: &str, pattern: &ChecksumPattern) -> Result<ChecksumList, ChecksumFileError> {
    let checksum = compile(&pattern.checksum)?;
    let Some(file) = pattern.file.as_deref().filter(|f| !f.is_empty()) else {
        return Ok(ChecksumList {
            single: content.lines().find_map(|line| capture(&checksum, line)),
            ..ChecksumList::default()
        });
    };
    let file = compile(file)?;
    let by_file = content
        .lines()
        .filter_map(|line| Some((capture(&file, line)?, capture(&checksum, line)?)))
        .collect();
    Ok(ChecksumList {
        single: None,
        by_file,
    })
}
