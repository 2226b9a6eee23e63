//! Effective packages and their rendered identifiers.
//!
//! An [`EffectivePackage`] pairs a manifest entry with the definition that
//! applies to it after every override layer. Everything downstream (install
//! paths, checksum IDs, download URLs, executable paths) is rendered from it
//! by pure functions, so the same package on the same runtime always lands
//! in the same place.
//!
//! # Layout per type
//!
//! | Type             | Key                                         |
//! |------------------|---------------------------------------------|
//! | `github_archive` | `github_archive/github.com/{o}/{r}/{v}`     |
//! | `github_content` | `github_content/github.com/{o}/{r}/{v}/{a}` |
//! | `github_release` | `github_release/github.com/{o}/{r}/{v}/{a}` |
//! | `http`           | `http/{host}{url path}`                     |
//! | `go`             | `go/github.com/{o}/{r}/{v}`                 |
//! | `go_install`     | `go_install/{go path}/{v}`                  |
//!
//! The install path is `pkgs/<key>` and the checksum ID is the key itself.

use std::path::{Path, PathBuf};

use reqwest::Url;
use thiserror::Error;
use toolpin_schema::{
    ChecksumSource, File, ManifestPackage, PackageDefinition, PackageName, PackageType, Runtime, Version,
};

use crate::constraint::{self, ConstraintError, Env};
use crate::template::{self, TemplateError, Vars};

/// Errors raised while rendering identifiers for a package.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A template failed to render.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The rendered URL does not parse.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// Rendered URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// A field the type needs for rendering is unset.
    #[error("{kind} package has no {field}")]
    MissingField {
        /// Type tag.
        kind: PackageType,
        /// Missing field.
        field: &'static str,
    },
}

/// A manifest entry with its fully merged definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePackage {
    /// The declaring manifest entry.
    pub package: ManifestPackage,
    /// Definition after version and runtime overrides.
    pub definition: PackageDefinition,
}

impl EffectivePackage {
    /// Pair a manifest entry with its effective definition.
    pub fn new(package: ManifestPackage, definition: PackageDefinition) -> Self {
        Self {
            package,
            definition,
        }
    }

    /// Declared package name.
    pub fn name(&self) -> &PackageName {
        &self.package.name
    }

    /// Declared version.
    pub fn version(&self) -> &Version {
        &self.package.version
    }

    /// Type tag of the effective definition.
    pub fn kind(&self) -> PackageType {
        self.definition.kind
    }

    /// Effective archive format (`github_archive` is always `tar.gz`).
    pub fn format(&self) -> &str {
        match self.definition.kind {
            PackageType::GithubArchive => "tar.gz",
            _ => self.definition.format.as_deref().unwrap_or(""),
        }
    }

    /// Template variables for this package on `runtime`.
    pub fn vars(&self, runtime: &Runtime) -> Vars {
        Vars::new(
            self.version(),
            runtime,
            self.definition.replacements.as_ref(),
            self.definition.rosetta2,
            self.format(),
        )
    }

    fn render(&self, template: &str, runtime: &Runtime) -> Result<String, RenderError> {
        Ok(template::render(template, &self.vars(runtime))?)
    }

    fn required(&self, field: &'static str, value: Option<&str>) -> Result<String, RenderError> {
        value
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(RenderError::MissingField {
                kind: self.definition.kind,
                field,
            })
    }

    /// Asset name for this runtime.
    ///
    /// Empty for `github_archive` and the Go types, the rendered path for
    /// `github_content`, the rendered asset for `github_release`, and the
    /// basename of the rendered URL for `http`.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if a template fails or a required field is unset.
    pub fn render_asset(&self, runtime: &Runtime) -> Result<String, RenderError> {
        let def = &self.definition;
        let asset = match def.kind {
            PackageType::GithubArchive | PackageType::Go | PackageType::GoInstall => {
                return Ok(String::new());
            }
            PackageType::GithubContent => {
                let path = self.required("path", def.path.as_deref())?;
                self.render(&path, runtime)?
            }
            PackageType::GithubRelease => {
                let asset = self.required("asset", def.asset.as_deref())?;
                self.render(&asset, runtime)?
            }
            PackageType::Http => {
                let url = parse_url(&self.render_url(runtime)?)?;
                let path = url.path();
                return Ok(path.rsplit('/').next().unwrap_or(path).to_string());
            }
        };
        Ok(windows_exe(&asset, self.format(), runtime))
    }

    /// Rendered download URL of an `http` package.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the package has no URL or the template fails.
    pub fn render_url(&self, runtime: &Runtime) -> Result<String, RenderError> {
        let url = self.required("url", self.definition.url.as_deref())?;
        let url = self.render(&url, runtime)?;
        Ok(windows_exe(&url, self.format(), runtime))
    }

    /// Go package path for `go_install` (and `github.com/{o}/{r}` otherwise).
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if neither a path nor a repository is set.
    pub fn go_path(&self, runtime: &Runtime) -> Result<String, RenderError> {
        let def = &self.definition;
        if def.kind == PackageType::GoInstall {
            if let Some(path) = def.path.as_deref().filter(|p| !p.is_empty()) {
                return self.render(path, runtime);
            }
        }
        Ok(format!("github.com/{}", self.repo()?))
    }

    fn repo(&self) -> Result<String, RenderError> {
        let def = &self.definition;
        let owner = self.required("repo_owner", def.repo_owner.as_deref())?;
        let name = self.required("repo_name", def.repo_name.as_deref())?;
        Ok(format!("{owner}/{name}"))
    }

    /// Slash-separated artifact key shared by install paths and checksum IDs.
    fn key(&self, runtime: &Runtime) -> Result<String, RenderError> {
        let kind = self.definition.kind;
        let version = self.version();
        Ok(match kind {
            PackageType::GithubArchive | PackageType::Go => {
                format!("{kind}/github.com/{}/{version}", self.repo()?)
            }
            PackageType::GithubContent | PackageType::GithubRelease => format!(
                "{kind}/github.com/{}/{version}/{}",
                self.repo()?,
                self.render_asset(runtime)?
            ),
            PackageType::Http => {
                let url = parse_url(&self.render_url(runtime)?)?;
                let host = match url.port() {
                    Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
                    None => url.host_str().unwrap_or_default().to_string(),
                };
                format!("{kind}/{host}{}", url.path())
            }
            PackageType::GoInstall => format!("{kind}/{}/{version}", self.go_path(runtime)?),
        })
    }

    /// Install path relative to the root dir, e.g.
    /// `pkgs/github_release/github.com/cli/cli/v2.17.0/gh_2.17.0_macOS_amd64.tar.gz`.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the asset or URL fails to render.
    pub fn render_path(&self, runtime: &Runtime) -> Result<String, RenderError> {
        Ok(format!("pkgs/{}", self.key(runtime)?))
    }

    /// Absolute install path under `root`.
    ///
    /// # Errors
    ///
    /// See [`EffectivePackage::render_path`].
    pub fn pkg_path(&self, root: &Path, runtime: &Runtime) -> Result<PathBuf, RenderError> {
        let rel = self.render_path(runtime)?;
        Ok(rel
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(root.to_path_buf(), |acc, seg| acc.join(seg)))
    }

    /// Checksum ID: the artifact key without the `pkgs/` prefix.
    ///
    /// # Errors
    ///
    /// See [`EffectivePackage::render_path`].
    pub fn render_checksum_id(&self, runtime: &Runtime) -> Result<String, RenderError> {
        self.key(runtime)
    }

    /// Whether the downloaded asset is the executable itself.
    ///
    /// `raw` is always unarchived and any other explicit format never is.
    /// Without a format, an asset with no extension (or `.exe`) is unarchived.
    pub fn is_unarchived(&self, asset: &str) -> bool {
        match self.format() {
            "raw" => true,
            "" => matches!(extension(asset), "" | "exe"),
            _ => false,
        }
    }

    /// Path of `file` relative to the install path.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the asset or the file's `src` template fails.
    pub fn file_src(&self, file: &File, runtime: &Runtime) -> Result<String, RenderError> {
        let asset = self.render_asset(runtime)?;
        let src = if self.is_unarchived(&asset) {
            asset.rsplit('/').next().unwrap_or(&asset).to_string()
        } else {
            match file.src.as_deref().filter(|s| !s.is_empty()) {
                None => file.name.clone(),
                Some(src) => template::render(src, &self.vars(runtime).with_file_name(&file.name))?,
            }
        };
        Ok(windows_exe(&src, "", runtime))
    }

    /// Absolute path of the executable `file` once installed under `root`.
    ///
    /// Go packages install into `<pkgpath>/bin/<name>`.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if any path component fails to render.
    pub fn exe_path(&self, root: &Path, file: &File, runtime: &Runtime) -> Result<PathBuf, RenderError> {
        let pkg_path = self.pkg_path(root, runtime)?;
        if self.definition.kind.is_go() {
            return Ok(pkg_path
                .join("bin")
                .join(windows_exe(&file.name, "", runtime)));
        }
        let src = self.file_src(file, runtime)?;
        Ok(src
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(pkg_path, |acc, seg| acc.join(seg)))
    }

    /// Where the artifact is downloaded from, or `None` for Go packages.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the asset or URL fails to render.
    pub fn download_url(&self, runtime: &Runtime) -> Result<Option<String>, RenderError> {
        let version = self.version();
        Ok(match self.definition.kind {
            PackageType::GithubRelease => Some(format!(
                "https://github.com/{}/releases/download/{version}/{}",
                self.repo()?,
                self.render_asset(runtime)?
            )),
            PackageType::GithubContent => Some(format!(
                "https://raw.githubusercontent.com/{}/{version}/{}",
                self.repo()?,
                self.render_asset(runtime)?
            )),
            PackageType::GithubArchive => Some(format!(
                "https://github.com/{}/archive/refs/tags/{version}.tar.gz",
                self.repo()?
            )),
            PackageType::Http => Some(self.render_url(runtime)?),
            PackageType::Go | PackageType::GoInstall => None,
        })
    }

    /// Published checksum source, unless absent or disabled.
    pub fn checksum_source(&self) -> Option<&ChecksumSource> {
        self.definition.checksum.as_ref().filter(|c| c.is_enabled())
    }

    /// Where the published checksum file is downloaded from, if the registry
    /// declares one.
    ///
    /// Templates see the package's variables plus `Asset`, the rendered asset
    /// name. The source's replacement table, when set, replaces the package's.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if a template fails or the source lacks the
    /// field its type needs.
    pub fn checksum_url(&self, runtime: &Runtime) -> Result<Option<String>, RenderError> {
        let Some(source) = self.checksum_source() else {
            return Ok(None);
        };
        let def = &self.definition;
        let vars = Vars::new(
            self.version(),
            runtime,
            source.replacements.as_ref().or(def.replacements.as_ref()),
            def.rosetta2,
            self.format(),
        )
        .with_asset(&self.render_asset(runtime)?);
        let missing = |field| RenderError::MissingField { kind: def.kind, field };
        let url = match source.kind {
            Some(PackageType::Http) => {
                let url = source.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| missing("checksum.url"))?;
                template::render(url, &vars)?
            }
            Some(PackageType::GithubRelease) => {
                let asset = source
                    .asset
                    .as_deref()
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| missing("checksum.asset"))?;
                format!(
                    "https://github.com/{}/releases/download/{}/{}",
                    self.repo()?,
                    self.version(),
                    template::render(asset, &vars)?
                )
            }
            _ => return Err(missing("checksum.type")),
        };
        Ok(Some(url))
    }

    /// Whether the package supports `runtime`.
    ///
    /// Both `supported_if` and `supported_envs` must allow it; either being
    /// unset allows everything.
    ///
    /// # Errors
    ///
    /// Returns a [`ConstraintError`] if `supported_if` fails to evaluate.
    pub fn is_supported(&self, runtime: &Runtime) -> Result<bool, ConstraintError> {
        let def = &self.definition;
        let env = Env::runtime(runtime);
        let allowed = def
            .supported_if
            .as_deref()
            .map(|expr| constraint::evaluate(expr, &env))
            .transpose()?;
        if allowed == Some(false) {
            return Ok(false);
        }
        if def.supported_envs.is_empty() {
            return Ok(true);
        }
        let pair = runtime.to_string();
        Ok(def.supported_envs.iter().any(|env| {
            env == "all" || *env == runtime.goos || *env == runtime.goarch || *env == pair
        }))
    }
}

fn parse_url(url: &str) -> Result<Url, RenderError> {
    Url::parse(url).map_err(|e| RenderError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Extension of the last path segment, without the dot.
fn extension(name: &str) -> &str {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
}

/// On Windows, append `.exe` to a name that needs one.
///
/// A name already ending in `.exe` is left alone, `raw` always gets the
/// suffix, any other explicit format never does, and otherwise a name with
/// no extension gets it.
fn windows_exe(name: &str, format: &str, runtime: &Runtime) -> String {
    if !runtime.is_windows() || name.ends_with(".exe") {
        return name.to_string();
    }
    let needs = match format {
        "raw" => true,
        "" => extension(name).is_empty(),
        _ => false,
    };
    if needs {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use toolpin_schema::Replacements;

    fn gh() -> EffectivePackage {
        EffectivePackage::new(
            ManifestPackage::new("cli/cli", "v2.17.0"),
            PackageDefinition {
                kind: PackageType::GithubRelease,
                repo_owner: Some("cli".into()),
                repo_name: Some("cli".into()),
                asset: Some("gh_{{trimV .Version}}_{{.OS}}_{{.Arch}}.{{.Format}}".into()),
                format: Some("tar.gz".into()),
                files: vec![File {
                    name: "gh".into(),
                    src: Some("gh_{{trimV .Version}}_{{.OS}}_{{.Arch}}/bin/{{.FileName}}".into()),
                }],
                replacements: Some(Replacements::from([("darwin".into(), "macOS".into())])),
                ..Default::default()
            },
        )
    }

    fn with(kind: PackageType, f: impl FnOnce(&mut PackageDefinition)) -> EffectivePackage {
        let mut def = PackageDefinition {
            kind,
            repo_owner: Some("o".into()),
            repo_name: Some("r".into()),
            ..Default::default()
        };
        f(&mut def);
        EffectivePackage::new(ManifestPackage::new("o/r", "v1.0.0"), def)
    }

    #[test]
    fn test_checksum_url() {
        let rt = Runtime::new("darwin", "amd64");
        let mut pkg = gh();
        assert_eq!(pkg.checksum_url(&rt).unwrap(), None);

        pkg.definition.checksum = Some(ChecksumSource {
            kind: Some(PackageType::GithubRelease),
            asset: Some("gh_{{trimV .Version}}_checksums.txt".into()),
            ..ChecksumSource::default()
        });
        assert_eq!(
            pkg.checksum_url(&rt).unwrap().as_deref(),
            Some("https://github.com/cli/cli/releases/download/v2.17.0/gh_2.17.0_checksums.txt")
        );

        pkg.definition.checksum = Some(ChecksumSource {
            kind: Some(PackageType::Http),
            url: Some("https://mirror.example.com/{{.Version}}/{{.Asset}}.sha256".into()),
            replacements: Some(Replacements::from([("darwin".into(), "Darwin".into())])),
            ..ChecksumSource::default()
        });
        assert_eq!(
            pkg.checksum_url(&rt).unwrap().as_deref(),
            Some("https://mirror.example.com/v2.17.0/gh_2.17.0_macOS_amd64.tar.gz.sha256")
        );

        pkg.definition.checksum.as_mut().unwrap().enabled = Some(false);
        assert_eq!(pkg.checksum_url(&rt).unwrap(), None);
    }

    #[test]
    fn test_gh_release_asset_and_checksum_id() {
        let rt = Runtime::new("darwin", "amd64");
        let pkg = gh();
        assert_eq!(pkg.render_asset(&rt).unwrap(), "gh_2.17.0_macOS_amd64.tar.gz");
        assert_eq!(
            pkg.render_checksum_id(&rt).unwrap(),
            "github_release/github.com/cli/cli/v2.17.0/gh_2.17.0_macOS_amd64.tar.gz"
        );
        assert_eq!(
            pkg.render_path(&rt).unwrap(),
            "pkgs/github_release/github.com/cli/cli/v2.17.0/gh_2.17.0_macOS_amd64.tar.gz"
        );
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let rt = Runtime::new("linux", "arm64");
        let pkg = gh();
        let first = (pkg.render_path(&rt).unwrap(), pkg.render_checksum_id(&rt).unwrap());
        for _ in 0..5 {
            assert_eq!(
                (pkg.render_path(&rt).unwrap(), pkg.render_checksum_id(&rt).unwrap()),
                first
            );
        }
    }

    #[test]
    fn test_file_src_and_exe_path() {
        let rt = Runtime::new("darwin", "amd64");
        let pkg = gh();
        let file = &pkg.definition.files[0];
        assert_eq!(pkg.file_src(file, &rt).unwrap(), "gh_2.17.0_macOS_amd64/bin/gh");
        let exe = pkg.exe_path(Path::new("/root"), file, &rt).unwrap();
        assert!(exe.ends_with("gh_2.17.0_macOS_amd64.tar.gz/gh_2.17.0_macOS_amd64/bin/gh"));
        assert!(exe.starts_with("/root/pkgs/github_release"));
    }

    #[test]
    fn test_file_src_defaults_to_name() {
        let pkg = with(PackageType::GithubRelease, |d| {
            d.asset = Some("r.tar.gz".into());
            d.format = Some("tar.gz".into());
        });
        let rt = Runtime::new("linux", "amd64");
        assert_eq!(pkg.file_src(&File::named("r"), &rt).unwrap(), "r");
    }

    #[test]
    fn test_unarchived_file_src_is_asset_basename() {
        let pkg = with(PackageType::GithubContent, |d| {
            d.path = Some("bin/tool-{{.OS}}".into());
        });
        let rt = Runtime::new("linux", "amd64");
        assert_eq!(pkg.render_asset(&rt).unwrap(), "bin/tool-linux");
        assert_eq!(pkg.file_src(&File::named("tool"), &rt).unwrap(), "tool-linux");
        assert_eq!(
            pkg.render_checksum_id(&rt).unwrap(),
            "github_content/github.com/o/r/v1.0.0/bin/tool-linux"
        );
    }

    #[rstest]
    #[case(Some("raw"), "foo-windows-amd64", "foo-windows-amd64.exe")]
    #[case(None, "foo-windows-amd64", "foo-windows-amd64.exe")]
    #[case(Some("tar.gz"), "foo-windows-amd64.tar.gz", "foo-windows-amd64.tar.gz")]
    #[case(None, "foo-windows-amd64.zip", "foo-windows-amd64.zip")]
    #[case(Some("raw"), "foo.exe", "foo.exe")]
    fn test_windows_asset_rule(
        #[case] format: Option<&str>,
        #[case] asset: &str,
        #[case] expected: &str,
    ) {
        let pkg = with(PackageType::GithubRelease, |d| {
            d.asset = Some(asset.into());
            d.format = format.map(str::to_string);
        });
        assert_eq!(pkg.render_asset(&Runtime::new("windows", "amd64")).unwrap(), expected);
        assert_eq!(pkg.render_asset(&Runtime::new("linux", "amd64")).unwrap(), asset);
    }

    #[test]
    fn test_windows_file_src_gets_exe() {
        let pkg = with(PackageType::GithubRelease, |d| {
            d.asset = Some("r.zip".into());
            d.format = Some("zip".into());
        });
        let rt = Runtime::new("windows", "amd64");
        assert_eq!(pkg.file_src(&File::named("r"), &rt).unwrap(), "r.exe");
    }

    #[test]
    fn test_rosetta2_arch() {
        let pkg = with(PackageType::GithubRelease, |d| {
            d.asset = Some("r-{{.OS}}-{{.Arch}}.tar.gz".into());
            d.rosetta2 = true;
            d.replacements = Some(Replacements::from([("amd64".into(), "x86_64".into())]));
        });
        let asset = pkg.render_asset(&Runtime::new("darwin", "arm64")).unwrap();
        assert_eq!(asset, "r-darwin-x86_64.tar.gz");
    }

    #[test]
    fn test_github_archive() {
        let pkg = with(PackageType::GithubArchive, |d| d.format = Some("zip".into()));
        let rt = Runtime::new("linux", "amd64");
        assert_eq!(pkg.format(), "tar.gz");
        assert_eq!(pkg.render_asset(&rt).unwrap(), "");
        assert_eq!(pkg.render_path(&rt).unwrap(), "pkgs/github_archive/github.com/o/r/v1.0.0");
        assert_eq!(pkg.render_checksum_id(&rt).unwrap(), "github_archive/github.com/o/r/v1.0.0");
        assert_eq!(
            pkg.download_url(&rt).unwrap().as_deref(),
            Some("https://github.com/o/r/archive/refs/tags/v1.0.0.tar.gz")
        );
    }

    #[test]
    fn test_http() {
        let pkg = with(PackageType::Http, |d| {
            d.url = Some("https://dl.example.com:8443/r/{{.Version}}/r_{{.OS}}.tar.gz?x=1".into());
        });
        let rt = Runtime::new("linux", "amd64");
        assert_eq!(pkg.render_asset(&rt).unwrap(), "r_linux.tar.gz");
        assert_eq!(
            pkg.render_path(&rt).unwrap(),
            "pkgs/http/dl.example.com:8443/r/v1.0.0/r_linux.tar.gz"
        );
        assert_eq!(
            pkg.render_checksum_id(&rt).unwrap(),
            "http/dl.example.com:8443/r/v1.0.0/r_linux.tar.gz"
        );
    }

    #[test]
    fn test_http_bad_url() {
        let pkg = with(PackageType::Http, |d| d.url = Some("not a url".into()));
        assert!(matches!(
            pkg.render_asset(&Runtime::new("linux", "amd64")),
            Err(RenderError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_go_install() {
        let pkg = with(PackageType::GoInstall, |d| {
            d.repo_owner = None;
            d.repo_name = None;
            d.path = Some("golang.org/x/tools/cmd/goimports".into());
        });
        let rt = Runtime::new("linux", "amd64");
        assert_eq!(
            pkg.render_path(&rt).unwrap(),
            "pkgs/go_install/golang.org/x/tools/cmd/goimports/v1.0.0"
        );
        let exe = pkg.exe_path(Path::new("/t"), &File::named("goimports"), &rt).unwrap();
        assert_eq!(
            exe,
            Path::new("/t/pkgs/go_install/golang.org/x/tools/cmd/goimports/v1.0.0/bin/goimports")
        );
        assert_eq!(pkg.download_url(&rt).unwrap(), None);
    }

    #[test]
    fn test_missing_asset() {
        let pkg = with(PackageType::GithubRelease, |_| {});
        assert!(matches!(
            pkg.render_asset(&Runtime::new("linux", "amd64")),
            Err(RenderError::MissingField { field: "asset", .. })
        ));
    }

    #[rstest]
    #[case(None, &[], "linux/amd64", true)]
    #[case(Some(r#"GOOS == "darwin""#), &[], "linux/amd64", false)]
    #[case(None, &["darwin", "linux/arm64"], "linux/amd64", false)]
    #[case(None, &["darwin", "linux/arm64"], "linux/arm64", true)]
    #[case(None, &["amd64"], "windows/amd64", true)]
    #[case(None, &["all"], "windows/arm64", true)]
    #[case(Some(r#"GOOS != "windows""#), &["all"], "windows/arm64", false)]
    fn test_is_supported(
        #[case] supported_if: Option<&str>,
        #[case] envs: &[&str],
        #[case] runtime: &str,
        #[case] expected: bool,
    ) {
        let pkg = with(PackageType::GithubRelease, |d| {
            d.supported_if = supported_if.map(str::to_string);
            d.supported_envs = envs.iter().map(ToString::to_string).collect();
        });
        let rt: Runtime = runtime.parse().unwrap();
        assert_eq!(pkg.is_supported(&rt).unwrap(), expected);
    }
}
