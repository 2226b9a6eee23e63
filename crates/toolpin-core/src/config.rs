//! Installer settings.
//!
//! Everything the installer would otherwise read from globals lives on
//! [`InstallerConfig`], which is handed to the installer when it is built.

use std::path::PathBuf;

use thiserror::Error;
use toolpin_schema::{ManifestError, ManifestPackage, Runtime};

use crate::paths;

/// Parallelism used when none (or an unusable value) is configured.
pub const DEFAULT_MAX_PARALLELISM: usize = 5;

/// Malformed manifest, import, or environment. Aborts before any install starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The home directory cannot be resolved and no root was configured.
    #[error("cannot determine the root directory; set TOOLPIN_ROOT_DIR")]
    NoRootDir,

    /// A file could not be read or parsed.
    #[error("failed to read {path}: {reason}")]
    File {
        /// The offending file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// An `import` glob is malformed.
    #[error("invalid import pattern {pattern}: {reason}")]
    Import {
        /// The glob as written.
        pattern: String,
        /// What went wrong.
        reason: String,
    },

    /// A registry or package entry is invalid.
    #[error(transparent)]
    Entry(#[from] ManifestError),

    /// Two registries share a name.
    #[error("registry {0} is declared more than once")]
    DuplicateRegistry(String),

    /// Two packages share a registry and name.
    #[error("package {name} from registry {registry} is declared more than once")]
    DuplicatePackage {
        /// Registry of the duplicates.
        registry: String,
        /// Package name of the duplicates.
        name: String,
    },
}

/// Settings for one installer run.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Root of the installation tree.
    pub root_dir: PathBuf,
    /// Maximum number of concurrent registry or package tasks.
    pub max_parallelism: usize,
    /// Test mode: a missing file or executable bit is fatal instead of repaired.
    pub strict: bool,
    /// Only create command links; packages are installed lazily by the proxy.
    pub only_link: bool,
    /// Refuse artifacts with no recorded checksum.
    pub require_checksum: bool,
    /// Platform packages are resolved for.
    pub runtime: Runtime,
    /// Package that provides the shared proxy executable.
    pub proxy: Option<ManifestPackage>,
}

impl InstallerConfig {
    /// Defaults for a tree at `root_dir` on the running platform.
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            strict: false,
            only_link: false,
            require_checksum: false,
            runtime: Runtime::current(),
            proxy: None,
        }
    }

    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoRootDir`] if no root directory can be found.
    pub fn from_env() -> Result<Self, ConfigError> {
        let root = paths::try_toolpin_root().ok_or(ConfigError::NoRootDir)?;
        Ok(Self::from_lookup(root, |key| std::env::var(key).ok()))
    }

    /// Build settings from `lookup`, which maps variable names to values.
    ///
    /// `TOOLPIN_ROOT_DIR`, when present, wins over `root_dir`.
    pub fn from_lookup(root_dir: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::new(
            lookup("TOOLPIN_ROOT_DIR")
                .filter(|v| !v.is_empty())
                .map_or(root_dir, PathBuf::from),
        );
        if let Some(raw) = lookup("TOOLPIN_MAX_PARALLELISM") {
            cfg.max_parallelism = parse_max_parallelism(&raw);
        }
        if let Some(goos) = lookup("TOOLPIN_GOOS").filter(|v| !v.is_empty()) {
            cfg.runtime.goos = goos;
        }
        if let Some(goarch) = lookup("TOOLPIN_GOARCH").filter(|v| !v.is_empty()) {
            cfg.runtime.goarch = goarch;
        }
        cfg
    }

    /// Set the worker width.
    pub fn with_max_parallelism(mut self, n: usize) -> Self {
        self.max_parallelism = n.max(1);
        self
    }

    /// Set the target platform.
    pub fn with_runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = runtime;
        self
    }

    /// Set the proxy package.
    pub fn with_proxy(mut self, proxy: ManifestPackage) -> Self {
        self.proxy = Some(proxy);
        self
    }
}

/// Parse a worker width, falling back to the default for unusable values.
pub fn parse_max_parallelism(raw: &str) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
            tracing::warn!(
                value = raw,
                default = DEFAULT_MAX_PARALLELISM,
                "TOOLPIN_MAX_PARALLELISM must be a positive integer; using the default"
            );
            DEFAULT_MAX_PARALLELISM
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    #[rstest]
    #[case("8", 8)]
    #[case(" 2 ", 2)]
    #[case("0", DEFAULT_MAX_PARALLELISM)]
    #[case("-3", DEFAULT_MAX_PARALLELISM)]
    #[case("many", DEFAULT_MAX_PARALLELISM)]
    fn test_parse_max_parallelism(#[case] raw: &str, #[case] expected: usize) {
        assert_eq!(parse_max_parallelism(raw), expected);
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("TOOLPIN_ROOT_DIR", "/opt/toolpin"),
            ("TOOLPIN_MAX_PARALLELISM", "3"),
            ("TOOLPIN_GOOS", "windows"),
        ]
        .into_iter()
        .collect();
        let cfg = InstallerConfig::from_lookup(PathBuf::from("/default"), |k| {
            env.get(k).map(ToString::to_string)
        });
        assert_eq!(cfg.root_dir, PathBuf::from("/opt/toolpin"));
        assert_eq!(cfg.max_parallelism, 3);
        assert_eq!(cfg.runtime.goos, "windows");
        assert_eq!(cfg.runtime.goarch, Runtime::current().goarch);
    }

    #[test]
    fn test_defaults() {
        let cfg = InstallerConfig::from_lookup(PathBuf::from("/default"), |_| None);
        assert_eq!(cfg.root_dir, PathBuf::from("/default"));
        assert_eq!(cfg.max_parallelism, DEFAULT_MAX_PARALLELISM);
        assert!(!cfg.strict);
        assert!(cfg.proxy.is_none());
    }
}
