//! Manifest (`toolpin.yaml`) document types.
//!
//! A manifest lists the registries packages may come from and the packages
//! a project pins. Loading, imports and path resolution live in
//! `toolpin-core`; this module only knows the shape and the invariants of
//! individual entries.

use serde::{Deserialize, Serialize};

use crate::types::{PackageName, Version};

/// Owner of the registry the `standard` shorthand expands to.
pub const STANDARD_REGISTRY_OWNER: &str = "aquaproj";
/// Repository of the registry the `standard` shorthand expands to.
pub const STANDARD_REGISTRY_REPO: &str = "aqua-registry";
/// Document path inside the standard registry repository.
pub const STANDARD_REGISTRY_PATH: &str = "registry.yaml";
/// Registry name packages use when they do not name one.
pub const STANDARD_REGISTRY_NAME: &str = "standard";

/// Top-level manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Registries packages may be resolved from.
    pub registries: Vec<RegistryRef>,
    /// Pinned packages.
    pub packages: Vec<ManifestPackage>,
    /// Checksum enforcement settings.
    pub checksum: ChecksumConfig,
}

/// Checksum enforcement settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChecksumConfig {
    /// Verify downloaded artifacts against the checksum file.
    pub enabled: bool,
    /// Refuse to install artifacts with no checksum entry.
    pub require_checksum: bool,
}

/// Archive format of an `http` registry document.
pub const HTTP_REGISTRY_FORMATS: [&str; 3] = ["", "raw", "tar.gz"];

/// How a registry document is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    /// Shorthand for the community registry at a given ref.
    #[default]
    Standard,
    /// A file in a GitHub repository at a given ref.
    GithubContent,
    /// A file on the local filesystem.
    Local,
    /// A versioned document (or `tar.gz` bundle) behind a URL template.
    Http,
}

impl RegistryKind {
    /// Manifest spelling of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::GithubContent => "github_content",
            Self::Local => "local",
            Self::Http => "http",
        }
    }
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registry declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RegistryRef {
    /// Name packages refer to this registry by.
    pub name: String,
    /// How the document is obtained.
    #[serde(rename = "type")]
    pub kind: RegistryKind,
    /// GitHub repository owner (`github_content`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_owner: Option<String>,
    /// GitHub repository name (`github_content`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    /// Git ref the document is read at.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Path of the document (inside the repository, on disk for `local`, or
    /// inside the archive for a `tar.gz` `http` registry).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// URL template of the document (`http`); must reference `{{.Version}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Version rendered into `url` (`http`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// `raw` (default) or `tar.gz` (`http`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Errors reported by [`RegistryRef::validate`] and [`ManifestPackage::normalize`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ManifestError {
    /// A registry declaration lacks a field its kind requires.
    #[error("registry {registry} ({kind}) requires {field}")]
    RegistryField {
        /// Name of the registry.
        registry: String,
        /// Kind of the registry.
        kind: RegistryKind,
        /// The missing field.
        field: &'static str,
    },

    /// A registry field is set to a value its kind rejects.
    #[error("registry {registry} has an invalid {field}: {reason}")]
    RegistryValue {
        /// Name of the registry.
        registry: String,
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A package entry has an empty name.
    #[error("package name is empty")]
    EmptyPackageName,

    /// `name@version` and an explicit `version` were both given.
    #[error("package {0} sets a version both inline and in the version field")]
    AmbiguousVersion(String),
}

impl RegistryRef {
    /// Expand the `standard` shorthand into its `github_content` form.
    ///
    /// Other kinds are returned unchanged.
    pub fn normalize(&self) -> Self {
        if self.kind != RegistryKind::Standard {
            return self.clone();
        }
        Self {
            name: self.name.clone(),
            kind: RegistryKind::GithubContent,
            repo_owner: Some(STANDARD_REGISTRY_OWNER.to_string()),
            repo_name: Some(STANDARD_REGISTRY_REPO.to_string()),
            git_ref: self.git_ref.clone(),
            path: Some(STANDARD_REGISTRY_PATH.to_string()),
            ..Self::default()
        }
    }

    /// Whether this declaration points at the community registry.
    pub fn is_standard(&self) -> bool {
        let n = self.normalize();
        n.kind == RegistryKind::GithubContent
            && n.repo_owner.as_deref() == Some(STANDARD_REGISTRY_OWNER)
            && n.repo_name.as_deref() == Some(STANDARD_REGISTRY_REPO)
            && n.path.as_deref() == Some(STANDARD_REGISTRY_PATH)
    }

    /// Checks the fields the kind requires.
    ///
    /// An `http` registry needs a `url` that references `{{.Version}}`, a
    /// `version` that cannot escape the cache directory, and a format of
    /// `raw` or `tar.gz` when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::RegistryField`] naming the first missing field
    /// and [`ManifestError::RegistryValue`] for a rejected value.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let missing = |field| ManifestError::RegistryField {
            registry: self.name.clone(),
            kind: self.kind,
            field,
        };
        let invalid = |field, reason| ManifestError::RegistryValue {
            registry: self.name.clone(),
            field,
            reason,
        };
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        match self.kind {
            RegistryKind::Local => {
                if !set(&self.path) {
                    return Err(missing("path"));
                }
            }
            RegistryKind::GithubContent => {
                if !set(&self.repo_owner) {
                    return Err(missing("repo_owner"));
                }
                if !set(&self.repo_name) {
                    return Err(missing("repo_name"));
                }
                if !set(&self.git_ref) {
                    return Err(missing("ref"));
                }
                if !set(&self.path) {
                    return Err(missing("path"));
                }
            }
            RegistryKind::Standard => {
                if !set(&self.git_ref) {
                    return Err(missing("ref"));
                }
            }
            RegistryKind::Http => {
                let url = self.url.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| missing("url"))?;
                let version = self
                    .version
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| missing("version"))?;
                if version.contains("..") || version.contains(['/', '\\']) {
                    return Err(invalid("version", "must be a single path segment"));
                }
                if !url.contains("{{.Version}}") && !url.contains("{{ .Version }}") {
                    return Err(invalid("url", "must contain {{.Version}}"));
                }
                if !HTTP_REGISTRY_FORMATS.contains(&self.http_format()) {
                    return Err(invalid("format", "must be raw or tar.gz"));
                }
            }
        }
        Ok(())
    }

    /// Declared format of an `http` registry, empty when unset.
    pub fn http_format(&self) -> &str {
        self.format.as_deref().unwrap_or("")
    }
}

fn default_registry() -> String {
    STANDARD_REGISTRY_NAME.to_string()
}

/// A user-declared package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPackage {
    /// Registry package name, optionally suffixed with `@version`.
    #[serde(default)]
    pub name: PackageName,
    /// Registry the package is resolved from.
    #[serde(default = "default_registry")]
    pub registry: String,
    /// Pinned version.
    #[serde(default)]
    pub version: Version,
    /// Glob of further manifest files to read packages from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<String>,
}

impl ManifestPackage {
    /// A package from the standard registry.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: PackageName::from(name),
            registry: default_registry(),
            version: Version::from(version),
            import: None,
        }
    }

    /// Set the registry the package is resolved from.
    pub fn with_registry(mut self, registry: &str) -> Self {
        self.registry = registry.to_string();
        self
    }

    /// Split the `name@version` shorthand into separate fields.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::EmptyPackageName`] for an empty name and
    /// [`ManifestError::AmbiguousVersion`] when both spellings carry a version.
    pub fn normalize(&self) -> Result<Self, ManifestError> {
        let mut pkg = self.clone();
        if let Some((name, version)) = self.name.rsplit_once('@') {
            if !self.version.is_empty() {
                return Err(ManifestError::AmbiguousVersion(self.name.to_string()));
            }
            pkg.name = PackageName::from(name);
            pkg.version = Version::from(version);
        }
        if pkg.name.is_empty() {
            return Err(ManifestError::EmptyPackageName);
        }
        Ok(pkg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r"
registries:
  - name: standard
    type: standard
    ref: v4.0.0
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

    #[test]
    fn test_parse_manifest() {
        let cfg: Config = serde_yaml::from_str(MANIFEST).unwrap();
        assert_eq!(cfg.registries.len(), 2);
        assert_eq!(cfg.registries[0].kind, RegistryKind::Standard);
        assert_eq!(cfg.registries[0].git_ref.as_deref(), Some("v4.0.0"));
        assert!(cfg.checksum.enabled);
        assert!(!cfg.checksum.require_checksum);
        assert_eq!(cfg.packages[0].registry, "standard");
        assert_eq!(cfg.packages[1].registry, "local");
        assert_eq!(cfg.packages[2].import.as_deref(), Some("tools/*.yaml"));
    }

    #[test]
    fn test_normalize_inline_version() {
        let pkg = ManifestPackage::new("cli/cli@v2.17.0", "").normalize().unwrap();
        assert_eq!(pkg.name, "cli/cli");
        assert_eq!(pkg.version, "v2.17.0");

        let pkg = ManifestPackage::new("cli/cli", "v2.17.0").normalize().unwrap();
        assert_eq!(pkg.version, "v2.17.0");

        assert_eq!(
            ManifestPackage::new("cli/cli@v1", "v2").normalize(),
            Err(ManifestError::AmbiguousVersion("cli/cli@v1".into()))
        );
        assert_eq!(
            ManifestPackage::new("@v1", "").normalize(),
            Err(ManifestError::EmptyPackageName)
        );
    }

    #[test]
    fn test_standard_registry_normalizes_to_github_content() {
        let reg = RegistryRef {
            name: "standard".into(),
            kind: RegistryKind::Standard,
            git_ref: Some("v4.0.0".into()),
            ..RegistryRef::default()
        };
        reg.validate().unwrap();
        let n = reg.normalize();
        assert_eq!(n.kind, RegistryKind::GithubContent);
        assert_eq!(n.repo_owner.as_deref(), Some("aquaproj"));
        assert_eq!(n.path.as_deref(), Some("registry.yaml"));
        assert!(reg.is_standard());
        n.validate().unwrap();
    }

    #[test]
    fn test_registry_validation() {
        let local = RegistryRef {
            name: "mine".into(),
            kind: RegistryKind::Local,
            ..RegistryRef::default()
        };
        assert_eq!(
            local.validate(),
            Err(ManifestError::RegistryField {
                registry: "mine".into(),
                kind: RegistryKind::Local,
                field: "path",
            })
        );

        let content = RegistryRef {
            kind: RegistryKind::GithubContent,
            repo_owner: Some("me".into()),
            repo_name: Some("registry".into()),
            path: Some("registry.yaml".into()),
            ..local
        };
        assert!(matches!(
            content.validate(),
            Err(ManifestError::RegistryField { field: "ref", .. })
        ));
    }

    fn http(url: &str, version: &str, format: Option<&str>) -> RegistryRef {
        RegistryRef {
            name: "corp".into(),
            kind: RegistryKind::Http,
            url: Some(url.into()),
            version: Some(version.into()),
            format: format.map(Into::into),
            ..RegistryRef::default()
        }
    }

    #[rstest::rstest]
    #[case::plain("https://example.com/{{.Version}}/registry.yaml", "v1.0.0", None)]
    #[case::spaced("https://example.com/{{ .Version }}/registry.yaml", "v1.0.0", Some("raw"))]
    #[case::bundle("https://example.com/registry-{{.Version}}.tar.gz", "v2", Some("tar.gz"))]
    fn test_http_registry_is_valid(#[case] url: &str, #[case] version: &str, #[case] format: Option<&str>) {
        assert_eq!(http(url, version, format).validate(), Ok(()));
    }

    #[rstest::rstest]
    #[case::no_template("https://example.com/registry.yaml", "v1", None, "url")]
    #[case::parent_dir("https://example.com/{{.Version}}/r.yaml", "../v1", None, "version")]
    #[case::nested("https://example.com/{{.Version}}/r.yaml", "a/b", None, "version")]
    #[case::zip("https://example.com/{{.Version}}/r.zip", "v1", Some("zip"), "format")]
    fn test_http_registry_rejects_value(
        #[case] url: &str,
        #[case] version: &str,
        #[case] format: Option<&str>,
        #[case] field: &str,
    ) {
        match http(url, version, format).validate() {
            Err(ManifestError::RegistryValue { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected an invalid {field}, got {other:?}"),
        }
    }

    #[test]
    fn test_http_registry_requires_url_and_version() {
        let reg = RegistryRef {
            url: None,
            ..http("", "v1", None)
        };
        assert!(matches!(reg.validate(), Err(ManifestError::RegistryField { field: "url", .. })));

        let reg = RegistryRef {
            version: Some(String::new()),
            ..http("https://example.com/{{.Version}}", "", None)
        };
        assert!(matches!(reg.validate(), Err(ManifestError::RegistryField { field: "version", .. })));

        let parsed: RegistryRef = serde_yaml::from_str(
            "name: corp\ntype: http\nurl: https://example.com/{{.Version}}/registry.yaml\nversion: v1\n",
        )
        .unwrap();
        assert_eq!(parsed.kind, RegistryKind::Http);
        assert_eq!(parsed.version.as_deref(), Some("v1"));
    }
}
