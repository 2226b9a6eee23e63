//! Registry package definitions.
//!
//! A registry document is a list of [`PackageDefinition`]s. Each definition
//! describes where a tool's artifact lives (the type tag plus coordinates),
//! how its asset name is templated, and which layers of overrides apply for
//! particular versions or platforms.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lookup table applied to `GOOS`/`GOARCH` before they reach a template
/// (e.g. `darwin -> macOS`, `amd64 -> x86_64`).
pub type Replacements = BTreeMap<String, String>;

/// Where a package's artifact comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    /// An asset attached to a GitHub release.
    #[default]
    GithubRelease,
    /// A single file from a repository at a given ref.
    GithubContent,
    /// The source archive GitHub generates for a tag.
    GithubArchive,
    /// An arbitrary URL.
    Http,
    /// Built from source with `go build`.
    Go,
    /// Built with `go install <path>@<version>`.
    GoInstall,
}

impl PackageType {
    /// Registry spelling of the type tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GithubRelease => "github_release",
            Self::GithubContent => "github_content",
            Self::GithubArchive => "github_archive",
            Self::Http => "http",
            Self::Go => "go",
            Self::GoInstall => "go_install",
        }
    }

    /// Whether packages of this type are compiled locally rather than downloaded.
    pub fn is_go(&self) -> bool {
        matches!(self, Self::Go | Self::GoInstall)
    }
}

impl std::fmt::Display for PackageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An executable a package provides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Command name linked into the shared bin directory.
    pub name: String,
    /// Template for the path of the executable inside the unpacked artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

impl File {
    /// A file whose in-archive path equals its command name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            src: None,
        }
    }
}

/// An additional name under which a definition can be looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// The alias itself.
    pub name: String,
}

/// Sets the archive format for one operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOverride {
    /// `GOOS` this override applies to.
    pub goos: String,
    /// Format to use on that OS.
    pub format: String,
}

/// A partial definition applied when the runtime matches `goos`/`goarch`.
///
/// Unset selectors match any value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Override {
    /// `GOOS` selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goos: Option<String>,
    /// `GOARCH` selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goarch: Option<String>,
    /// Entries merged over the base replacement table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacements: Option<Replacements>,
    /// Replacement archive format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Replacement asset template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Replacement file list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<File>>,
    /// Replacement URL template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Regular expressions extracting digests from a `regexp` checksum file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChecksumPattern {
    /// Pattern whose first capture group is the digest.
    pub checksum: String,
    /// Pattern whose first capture group is the file name; unset takes the
    /// first digest in the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Where the upstream project publishes the checksums of its assets.
///
/// ```yaml
/// checksum:
///   type: github_release
///   asset: "{{.Asset}}.sha256"
///   algorithm: sha256
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChecksumSource {
    /// `github_release` or `http`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<PackageType>,
    /// Release asset template (`github_release`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// URL template (`http`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Empty (`<digest> <file>` lines), `raw` (a single digest) or `regexp`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_format: Option<String>,
    /// Digest algorithm; `sha256` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Extraction patterns for the `regexp` format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<ChecksumPattern>,
    /// Set to `false` to ignore the published checksums.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Replacement table used instead of the package's for the checksum templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacements: Option<Replacements>,
}

impl ChecksumSource {
    /// Whether published checksums are used; unset means yes.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// A partial definition guarded by a version-constraint expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VersionOverride {
    /// Expression that must evaluate to `true` for this override to apply.
    pub version_constraint: String,
    /// Replacement type tag.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<PackageType>,
    /// Replacement repository owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_owner: Option<String>,
    /// Replacement repository name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    /// Replacement asset template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Replacement path template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Replacement archive format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Replacement file list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<File>>,
    /// Replacement URL template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Replacement table (replaces the base table wholesale).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacements: Option<Replacements>,
    /// Replacement per-OS format overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_overrides: Option<Vec<FormatOverride>>,
    /// Replacement per-platform overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<Override>>,
    /// Replacement platform-support expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_if: Option<String>,
    /// Replacement supported environment list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_envs: Option<Vec<String>>,
    /// Replacement Rosetta 2 flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rosetta2: Option<bool>,
    /// Replacement version filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_filter: Option<String>,
    /// Replacement checksum source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumSource>,
}

/// A registry's install recipe for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PackageDefinition {
    /// Explicit registry name; defaults to `{repo_owner}/{repo_name}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Additional lookup names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Alias>,
    /// Where the artifact comes from.
    #[serde(rename = "type")]
    pub kind: PackageType,
    /// GitHub repository owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_owner: Option<String>,
    /// GitHub repository name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    /// Asset name template (`github_release`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Path template (`github_content`) or Go package path (`go_install`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Archive format (`tar.gz`, `zip`, `raw`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Executables provided by the package.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,
    /// Download URL template (`http`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `GOOS`/`GOARCH` replacement table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacements: Option<Replacements>,
    /// Use `amd64` artifacts on Apple Silicon.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub rosetta2: bool,
    /// Per-OS format overrides.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub format_overrides: Vec<FormatOverride>,
    /// Per-platform overrides.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Override>,
    /// Version-guarded overrides, scanned in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub version_overrides: Vec<VersionOverride>,
    /// Expression the base definition itself is valid for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<String>,
    /// Expression selecting which upstream versions are candidates for updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_filter: Option<String>,
    /// Expression over `GOOS`/`GOARCH`; the package is skipped when it is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_if: Option<String>,
    /// Supported `goos`, `goarch` or `goos/goarch` entries; empty means all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_envs: Vec<String>,
    /// Human readable summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Published checksum file of the package's assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumSource>,
}

/// Errors reported by [`PackageDefinition::validate`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DefinitionError {
    /// Neither `name` nor the repository coordinates are set.
    #[error("package name is empty")]
    MissingName,

    /// A field the type tag requires is unset.
    #[error("{kind} package {name} requires {field}")]
    MissingField {
        /// Type tag of the definition.
        kind: PackageType,
        /// Name of the definition.
        name: String,
        /// The missing field(s).
        field: &'static str,
    },

    /// The `checksum` block cannot describe a checksum file.
    #[error("package {name} has an invalid checksum: {reason}")]
    InvalidChecksum {
        /// Name of the definition.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl PackageDefinition {
    /// Registry name of the definition.
    ///
    /// Falls back to `{repo_owner}/{repo_name}`, then to the Go package path
    /// for `go_install`, and to an empty string when nothing is set.
    pub fn name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let (Some(owner), Some(repo)) = (self.repo_owner.as_deref(), self.repo_name.as_deref())
        {
            return format!("{owner}/{repo}");
        }
        if self.kind == PackageType::GoInstall
            && let Some(path) = self.path.as_deref()
        {
            return path.to_string();
        }
        String::new()
    }

    /// Whether both repository coordinates are set.
    pub fn has_repo(&self) -> bool {
        self.repo_owner.as_deref().is_some_and(|s| !s.is_empty())
            && self.repo_name.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// All names the definition can be looked up by (name first, then aliases).
    pub fn lookup_names(&self) -> Vec<String> {
        let mut names = vec![self.name()];
        names.extend(self.aliases.iter().map(|a| a.name.clone()));
        names
    }

    /// Declared files, or the default single file when none are declared.
    ///
    /// The default command name is the repository name, or the last segment
    /// of the Go package path for `go_install` packages without a repository.
    pub fn files(&self) -> Vec<File> {
        if !self.files.is_empty() {
            return self.files.clone();
        }
        if let Some(repo) = self.repo_name.as_deref().filter(|r| !r.is_empty()) {
            return vec![File::named(repo)];
        }
        if self.kind == PackageType::GoInstall
            && let Some(last) = self
                .path
                .as_deref()
                .and_then(|p| p.trim_end_matches('/').rsplit('/').next())
                .filter(|s| !s.is_empty())
        {
            return vec![File::named(last)];
        }
        Vec::new()
    }

    /// Checks that the fields the type tag relies on are present.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::MissingName`] if the definition has no name
    /// and [`DefinitionError::MissingField`] if a type-specific field is unset.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let name = self.name();
        if name.is_empty() {
            return Err(DefinitionError::MissingName);
        }
        let missing = |field| DefinitionError::MissingField {
            kind: self.kind,
            name: name.clone(),
            field,
        };
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        match self.kind {
            PackageType::GithubArchive | PackageType::Go => {
                if !self.has_repo() {
                    return Err(missing("repo_owner and repo_name"));
                }
            }
            PackageType::GithubContent => {
                if !self.has_repo() {
                    return Err(missing("repo_owner and repo_name"));
                }
                if !set(&self.path) {
                    return Err(missing("path"));
                }
            }
            PackageType::GithubRelease => {
                if !self.has_repo() {
                    return Err(missing("repo_owner and repo_name"));
                }
                if !set(&self.asset) {
                    return Err(missing("asset"));
                }
            }
            PackageType::Http => {
                if !set(&self.url) {
                    return Err(missing("url"));
                }
            }
            PackageType::GoInstall => {
                if !set(&self.path) && !self.has_repo() {
                    return Err(missing("path"));
                }
            }
        }
        if let Some(source) = self.checksum.as_ref().filter(|c| c.is_enabled()) {
            let invalid = |reason| DefinitionError::InvalidChecksum {
                name: name.clone(),
                reason,
            };
            match source.kind {
                Some(PackageType::GithubRelease) if !self.has_repo() => {
                    return Err(invalid("github_release checksums need repo_owner and repo_name"));
                }
                Some(PackageType::GithubRelease) if !set(&source.asset) => {
                    return Err(invalid("github_release checksums need an asset"));
                }
                Some(PackageType::Http) if !set(&source.url) => {
                    return Err(invalid("http checksums need a url"));
                }
                Some(PackageType::GithubRelease | PackageType::Http) => {}
                _ => return Err(invalid("type must be github_release or http")),
            }
        }
        Ok(())
    }
}

/// A registry document: `{packages: [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegistryDocument {
    /// Every package the registry defines.
    #[serde(default)]
    pub packages: Vec<PackageDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const GH: &str = r#"
packages:
  - type: github_release
    repo_owner: cli
    repo_name: cli
    asset: "gh_{{trimV .Version}}_{{.OS}}_{{.Arch}}.{{.Format}}"
    format: tar.gz
    replacements:
      darwin: macOS
    aliases:
      - name: gh
    files:
      - name: gh
        src: "gh_{{trimV .Version}}_{{.OS}}_{{.Arch}}/bin/gh"
    version_overrides:
      - version_constraint: semver("< 2.0.0")
        format: zip
"#;

    #[test]
    fn test_parse_registry_yaml() {
        let doc: RegistryDocument = serde_yaml::from_str(GH).unwrap();
        assert_eq!(doc.packages.len(), 1);
        let pkg = &doc.packages[0];
        assert_eq!(pkg.kind, PackageType::GithubRelease);
        assert_eq!(pkg.name(), "cli/cli");
        assert_eq!(pkg.lookup_names(), vec!["cli/cli", "gh"]);
        assert_eq!(pkg.format.as_deref(), Some("tar.gz"));
        assert_eq!(
            pkg.replacements.as_ref().and_then(|r| r.get("darwin")),
            Some(&"macOS".to_string())
        );
        assert_eq!(pkg.version_overrides[0].format.as_deref(), Some("zip"));
        assert_eq!(pkg.version_overrides[0].asset, None);
        pkg.validate().unwrap();
    }

    #[test]
    fn test_parse_registry_json() {
        let doc: RegistryDocument = serde_json::from_str(
            r#"{"packages":[{"type":"http","name":"hashicorp/terraform","url":"https://releases.hashicorp.com/terraform/{{trimV .Version}}/terraform_{{trimV .Version}}_{{.OS}}_{{.Arch}}.zip"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.packages[0].kind, PackageType::Http);
        doc.packages[0].validate().unwrap();
    }

    #[test]
    fn test_parse_checksum_source() {
        let doc: RegistryDocument = serde_yaml::from_str(
            r#"
packages:
  - type: github_release
    repo_owner: cli
    repo_name: cli
    asset: gh.tar.gz
    checksum:
      type: github_release
      asset: "gh_{{trimV .Version}}_checksums.txt"
      algorithm: sha256
  - type: http
    name: example/tool
    url: https://example.com/tool-{{.Version}}
    checksum:
      type: http
      url: https://example.com/tool-{{.Version}}.sums
      file_format: regexp
      pattern:
        checksum: "^(\\b[A-Fa-f0-9]{64}\\b)"
        file: "^\\b[A-Fa-f0-9]{64}\\b\\s+(\\S+)$"
"#,
        )
        .unwrap();
        let gh = doc.packages[0].checksum.as_ref().unwrap();
        assert_eq!(gh.kind, Some(PackageType::GithubRelease));
        assert!(gh.is_enabled());
        doc.packages[0].validate().unwrap();
        let pattern = doc.packages[1].checksum.as_ref().unwrap().pattern.as_ref().unwrap();
        assert!(pattern.file.is_some());
        doc.packages[1].validate().unwrap();
    }

    #[rstest]
    #[case::no_asset(Some(PackageType::GithubRelease), None, None)]
    #[case::no_url(Some(PackageType::Http), Some("sums.txt"), None)]
    #[case::wrong_type(Some(PackageType::Go), None, Some("https://example.com"))]
    #[case::no_type(None, Some("sums.txt"), None)]
    fn test_invalid_checksum_source(
        #[case] kind: Option<PackageType>,
        #[case] asset: Option<&str>,
        #[case] url: Option<&str>,
    ) {
        let mut def = PackageDefinition {
            repo_owner: Some("cli".into()),
            repo_name: Some("cli".into()),
            asset: Some("gh".into()),
            checksum: Some(ChecksumSource {
                kind,
                asset: asset.map(Into::into),
                url: url.map(Into::into),
                ..ChecksumSource::default()
            }),
            ..Default::default()
        };
        assert!(matches!(def.validate(), Err(DefinitionError::InvalidChecksum { .. })));

        def.checksum.as_mut().unwrap().enabled = Some(false);
        def.validate().unwrap();
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let res: Result<RegistryDocument, _> =
            serde_yaml::from_str("packages:\n  - type: cargo\n    name: foo\n");
        assert!(res.is_err());
    }

    #[test]
    fn test_default_files() {
        let def = PackageDefinition {
            repo_owner: Some("BurntSushi".into()),
            repo_name: Some("ripgrep".into()),
            ..Default::default()
        };
        assert_eq!(def.files(), vec![File::named("ripgrep")]);

        let def = PackageDefinition {
            kind: PackageType::GoInstall,
            path: Some("golang.org/x/tools/gopls".into()),
            ..Default::default()
        };
        assert_eq!(def.name(), "golang.org/x/tools/gopls");
        assert_eq!(def.files(), vec![File::named("gopls")]);
    }

    #[rstest]
    #[case::archive_without_repo(PackageType::GithubArchive, None, None, None, None, false)]
    #[case::archive(PackageType::GithubArchive, Some("o/r"), None, None, None, true)]
    #[case::content_without_path(PackageType::GithubContent, Some("o/r"), None, None, None, false)]
    #[case::content(PackageType::GithubContent, Some("o/r"), None, Some("bin/x"), None, true)]
    #[case::release_without_asset(PackageType::GithubRelease, Some("o/r"), None, None, None, false)]
    #[case::release(PackageType::GithubRelease, Some("o/r"), Some("x.tgz"), None, None, true)]
    #[case::http_without_url(PackageType::Http, Some("o/r"), None, None, None, false)]
    #[case::http(PackageType::Http, Some("o/r"), None, None, Some("https://x"), true)]
    #[case::go_install_path(PackageType::GoInstall, None, None, Some("example.com/x"), None, true)]
    fn test_validate(
        #[case] kind: PackageType,
        #[case] repo: Option<&str>,
        #[case] asset: Option<&str>,
        #[case] path: Option<&str>,
        #[case] url: Option<&str>,
        #[case] ok: bool,
    ) {
        let (owner, name) = repo
            .and_then(|r| r.split_once('/'))
            .map_or((None, None), |(o, n)| (Some(o.to_string()), Some(n.to_string())));
        let def = PackageDefinition {
            name: Some("test/pkg".into()),
            kind,
            repo_owner: owner,
            repo_name: name,
            asset: asset.map(String::from),
            path: path.map(String::from),
            url: url.map(String::from),
            ..Default::default()
        };
        assert_eq!(def.validate().is_ok(), ok, "{kind} validation");
    }

    #[test]
    fn test_validate_missing_name() {
        let def = PackageDefinition {
            kind: PackageType::Http,
            url: Some("https://example.com/x".into()),
            ..Default::default()
        };
        assert_eq!(def.validate(), Err(DefinitionError::MissingName));
    }
}
