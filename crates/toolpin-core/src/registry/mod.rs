//! Registry lookup.
//!
//! A registry document is a flat list of definitions. [`RegistryIndex`] turns
//! it into a name map (every alias is an extra key) once per run, and
//! [`Registries`] holds one index per registry name declared in the manifest.

pub mod fetch;
pub mod load;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use toolpin_schema::{PackageDefinition, RegistryDocument};

pub use fetch::{GitHubContentFetcher, HttpRegistryFetcher, RegistryFetcher, render_http_url};
pub use load::{load_registry, registry_file_path};

/// Errors raised while loading or querying registries.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The manifest references a registry it does not declare (or that failed to load).
    #[error("registry {0} is not found")]
    RegistryNotFound(String),

    /// The registry has no definition under this name or alias.
    #[error("package {name} is not found in registry {registry}")]
    PackageNotFound {
        /// Registry name.
        registry: String,
        /// Requested package name.
        name: String,
    },

    /// Two definitions share a name or alias.
    #[error("registry {registry} defines {name} more than once")]
    DuplicateName {
        /// Registry name.
        registry: String,
        /// Duplicated name or alias.
        name: String,
    },

    /// The registry reference is malformed.
    #[error("registry {registry} is invalid: {reason}")]
    Validation {
        /// Registry name.
        registry: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Reading or writing the cached document failed.
    #[error("failed to access registry file {}: {source}", path.display())]
    Io {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The document is not valid YAML/JSON for a registry.
    #[error("failed to parse registry file {}: {reason}", path.display())]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Fetching the document from its source failed.
    #[error("failed to fetch registry {registry}: {reason}")]
    Fetch {
        /// Registry name.
        registry: String,
        /// What went wrong.
        reason: String,
    },
}

/// Name map of one registry's definitions.
#[derive(Debug, Clone, Default)]
pub struct RegistryIndex {
    name: String,
    packages: HashMap<String, Arc<PackageDefinition>>,
}

impl RegistryIndex {
    /// Flatten `document` into a name map.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if any name or alias appears twice.
    pub fn from_document(registry: &str, document: RegistryDocument) -> Result<Self, RegistryError> {
        let mut packages = HashMap::with_capacity(document.packages.len());
        for def in document.packages {
            let def = Arc::new(def);
            for name in def.lookup_names() {
                if packages.insert(name.clone(), Arc::clone(&def)).is_some() {
                    return Err(RegistryError::DuplicateName {
                        registry: registry.to_string(),
                        name,
                    });
                }
            }
        }
        Ok(Self {
            name: registry.to_string(),
            packages,
        })
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Definition registered under `name` (or an alias).
    pub fn get(&self, name: &str) -> Option<&PackageDefinition> {
        self.packages.get(name).map(AsRef::as_ref)
    }

    /// Number of keys, aliases included.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the registry defines nothing.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Loaded registries by name.
#[derive(Debug, Clone, Default)]
pub struct Registries {
    indexes: HashMap<String, Arc<RegistryIndex>>,
}

impl Registries {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the index for its registry name.
    pub fn insert(&mut self, index: RegistryIndex) {
        self.indexes.insert(index.name.clone(), Arc::new(index));
    }

    /// Index of one registry.
    pub fn get(&self, registry: &str) -> Option<&RegistryIndex> {
        self.indexes.get(registry).map(AsRef::as_ref)
    }

    /// Whether a registry of this name is loaded.
    pub fn contains(&self, registry: &str) -> bool {
        self.indexes.contains_key(registry)
    }

    /// Find `name` in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RegistryNotFound`] or
    /// [`RegistryError::PackageNotFound`].
    pub fn lookup(&self, registry: &str, name: &str) -> Result<&PackageDefinition, RegistryError> {
        self.get(registry)
            .ok_or_else(|| RegistryError::RegistryNotFound(registry.to_string()))?
            .get(name)
            .ok_or_else(|| RegistryError::PackageNotFound {
                registry: registry.to_string(),
                name: name.to_string(),
            })
    }
}

impl FromIterator<RegistryIndex> for Registries {
    fn from_iter<I: IntoIterator<Item = RegistryIndex>>(iter: I) -> Self {
        let mut registries = Self::new();
        for index in iter {
            registries.insert(index);
        }
        registries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> RegistryDocument {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_index_includes_aliases() {
        let index = RegistryIndex::from_document(
            "standard",
            doc(r"
packages:
  - type: github_release
    repo_owner: cli
    repo_name: cli
    asset: gh.tar.gz
    aliases:
      - name: github/cli
  - type: http
    name: hashicorp/terraform
    url: https://releases.hashicorp.com/terraform/{{trimV .Version}}/terraform.zip
"),
        )
        .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.get("github/cli"), index.get("cli/cli"));
        assert!(index.get("hashicorp/terraform").is_some());
        assert!(index.get("terraform").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = RegistryIndex::from_document(
            "standard",
            doc(r"
packages:
  - repo_owner: cli
    repo_name: cli
  - name: cli/cli
    type: http
    url: https://example.com/gh
"),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { ref name, .. } if name == "cli/cli"));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let err = RegistryIndex::from_document(
            "local",
            doc(r"
packages:
  - repo_owner: a
    repo_name: tool
    aliases: [{name: tool}]
  - repo_owner: b
    repo_name: tool
    aliases: [{name: tool}]
"),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { ref name, .. } if name == "tool"));
    }

    #[test]
    fn test_lookup_errors() {
        let registries: Registries = [RegistryIndex::from_document(
            "standard",
            doc("packages: [{repo_owner: cli, repo_name: cli}]"),
        )
        .unwrap()]
        .into_iter()
        .collect();

        assert!(registries.lookup("standard", "cli/cli").is_ok());
        assert!(matches!(
            registries.lookup("standard", "junegunn/fzf"),
            Err(RegistryError::PackageNotFound { .. })
        ));
        assert!(matches!(
            registries.lookup("local", "cli/cli"),
            Err(RegistryError::RegistryNotFound(_))
        ));
    }
}
