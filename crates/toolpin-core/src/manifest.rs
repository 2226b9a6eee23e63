//! Manifest loading.
//!
//! A manifest (`toolpin.yaml`, or `toolpin.toml`) declares registries and
//! packages. Package entries with an `import` glob pull in the packages of
//! further files, resolved relative to the manifest's directory. The loaded
//! [`Manifest`] has every import expanded and every `name@version` split.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use toolpin_schema::{ChecksumConfig, Config, ManifestPackage, RegistryRef};

use crate::config::ConfigError;

/// File names searched for when no manifest path is given.
pub const MANIFEST_FILE_NAMES: &[&str] = &["toolpin.yaml", "toolpin.yml", "toolpin.toml"];

/// A loaded, validated manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Path of the manifest file.
    pub path: PathBuf,
    /// Directory relative paths are resolved against.
    pub dir: PathBuf,
    /// Declared registries.
    pub registries: Vec<RegistryRef>,
    /// Declared packages, imports expanded.
    pub packages: Vec<ManifestPackage>,
    /// Checksum settings.
    pub checksum: ChecksumConfig,
}

fn parse_config(path: &Path, text: &str) -> Result<Config, ConfigError> {
    let err = |reason: String| ConfigError::File {
        path: path.to_path_buf(),
        reason,
    };
    if path.extension().is_some_and(|e| e == "toml") {
        toml::from_str(text).map_err(|e| err(e.to_string()))
    } else {
        serde_yaml::from_str(text).map_err(|e| err(e.to_string()))
    }
}

async fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    parse_config(path, &text)
}

impl Manifest {
    /// Read the manifest at `path` and expand its imports.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any file is unreadable or malformed, a
    /// registry is invalid or declared twice, or a package is declared twice.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = read_config(path).await?;
        let dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let mut packages = Vec::new();
        for pkg in &config.packages {
            match pkg.import.as_deref().filter(|i| !i.is_empty()) {
                Some(pattern) => {
                    for import in expand_import(&dir, pattern)? {
                        tracing::debug!(path = %import.display(), "importing packages");
                        let imported = read_config(&import).await?;
                        packages.extend(imported.packages.into_iter().filter(|p| p.import.is_none()));
                    }
                }
                None => packages.push(pkg.clone()),
            }
        }

        Self::new(path.to_path_buf(), dir, config.registries, packages, config.checksum)
    }

    /// Validate already-parsed parts of a manifest.
    ///
    /// # Errors
    ///
    /// See [`Manifest::load`].
    pub fn new(
        path: PathBuf,
        dir: PathBuf,
        registries: Vec<RegistryRef>,
        packages: Vec<ManifestPackage>,
        checksum: ChecksumConfig,
    ) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        for registry in &registries {
            registry.validate()?;
            if !names.insert(registry.name.as_str()) {
                return Err(ConfigError::DuplicateRegistry(registry.name.clone()));
            }
        }

        let packages = packages
            .iter()
            .map(ManifestPackage::normalize)
            .collect::<Result<Vec<_>, _>>()?;
        let mut seen = HashSet::new();
        for pkg in &packages {
            if !seen.insert((pkg.registry.as_str(), pkg.name.as_str())) {
                return Err(ConfigError::DuplicatePackage {
                    registry: pkg.registry.clone(),
                    name: pkg.name.to_string(),
                });
            }
        }

        Ok(Self {
            path,
            dir,
            registries,
            packages,
            checksum,
        })
    }

    /// Registries that at least one package refers to, in declaration order.
    pub fn used_registries(&self) -> Vec<&RegistryRef> {
        let used: HashSet<&str> = self.packages.iter().map(|p| p.registry.as_str()).collect();
        self.registries
            .iter()
            .filter(|r| used.contains(r.name.as_str()))
            .collect()
    }

    /// Declaration of `name`.
    pub fn registry(&self, name: &str) -> Option<&RegistryRef> {
        self.registries.iter().find(|r| r.name == name)
    }
}

fn expand_import(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let full = dir.join(pattern);
    let err = |reason: String| ConfigError::Import {
        pattern: pattern.to_string(),
        reason,
    };
    let mut found = Vec::new();
    for entry in glob::glob(&full.to_string_lossy()).map_err(|e| err(e.to_string()))? {
        found.push(entry.map_err(|e| err(e.to_string()))?);
    }
    found.sort();
    Ok(found)
}

/// Find a manifest in `start` or the nearest ancestor that has one.
pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        MANIFEST_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MANIFEST: &str = r"
registries:
  - name: standard
    type: standard
    ref: v4.155.0
  - name: local
    type: local
    path: registry.yaml
checksum:
  enabled: true
packages:
  - name: cli/cli@v2.17.0
  - name: BurntSushi/ripgrep
    version: 13.0.0
    registry: local
  - import: tools/*.yaml
";

    #[tokio::test]
    async fn test_load_with_imports() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("tools")).unwrap();
        fs::write(dir.path().join("toolpin.yaml"), MANIFEST).unwrap();
        fs::write(
            dir.path().join("tools/b.yaml"),
            "packages:\n  - name: junegunn/fzf@0.45.0\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("tools/a.yaml"),
            "packages:\n  - name: suzuki-shunsuke/tfcmt@v4.0.0\n",
        )
        .unwrap();

        let manifest = Manifest::load(&dir.path().join("toolpin.yaml")).await.unwrap();
        let names: Vec<(&str, &str)> = manifest
            .packages
            .iter()
            .map(|p| (p.name.as_str(), p.version.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("cli/cli", "v2.17.0"),
                ("BurntSushi/ripgrep", "13.0.0"),
                ("suzuki-shunsuke/tfcmt", "v4.0.0"),
                ("junegunn/fzf", "0.45.0"),
            ]
        );
        assert!(manifest.checksum.enabled);
        assert_eq!(manifest.dir, dir.path());
        assert_eq!(manifest.used_registries().len(), 2);
    }

    #[tokio::test]
    async fn test_load_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toolpin.toml");
        fs::write(
            &path,
            r#"
[[registries]]
name = "standard"
type = "standard"
ref = "v4.155.0"

[[packages]]
name = "cli/cli@v2.17.0"
"#,
        )
        .unwrap();
        let manifest = Manifest::load(&path).await.unwrap();
        assert_eq!(manifest.packages[0].registry, "standard");
        assert_eq!(manifest.packages[0].version, "v2.17.0");
    }

    #[tokio::test]
    async fn test_duplicate_package() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toolpin.yaml");
        fs::write(
            &path,
            "registries:\n  - {name: standard, type: standard, ref: v4.0.0}\npackages:\n  - name: cli/cli@v2.17.0\n  - name: cli/cli\n    version: v2.18.0\n",
        )
        .unwrap();
        assert!(matches!(
            Manifest::load(&path).await,
            Err(ConfigError::DuplicatePackage { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_registry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toolpin.yaml");
        fs::write(&path, "registries:\n  - {name: mine, type: local}\n").unwrap();
        assert!(matches!(Manifest::load(&path).await, Err(ConfigError::Entry(_))));
    }

    #[tokio::test]
    async fn test_unknown_registry_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toolpin.yaml");
        fs::write(&path, "registries:\n  - {name: mine, type: gitlab, path: x}\n").unwrap();
        assert!(matches!(Manifest::load(&path).await, Err(ConfigError::File { .. })));
    }

    #[test]
    fn test_find_manifest_walks_up() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("toolpin.yaml"), "packages: []\n").unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_manifest(&nested), Some(dir.path().join("toolpin.yaml")));
    }
}
