//! Reading registry documents from disk, fetching them on a cache miss.

use std::path::{Path, PathBuf};

use toolpin_schema::{RegistryDocument, RegistryKind, RegistryRef};

use super::{RegistryError, RegistryFetcher, RegistryIndex, render_http_url};
use crate::paths;

/// Where the document for `registry` lives.
///
/// `local` registries resolve against the manifest directory; fetched ones
/// are cached under
/// `<root>/registries/github_content/github.com/{owner}/{repo}/{ref}/{path}`
/// or, for `http`, `<root>/registries/http/{host}/{url path}/{version}/registry.yaml`
/// (`registry.json` when the document is named `*.json`).
///
/// # Errors
///
/// Returns [`RegistryError::Validation`] if a required field is missing.
pub fn registry_file_path(
    root: &Path,
    manifest_dir: &Path,
    registry: &RegistryRef,
) -> Result<PathBuf, RegistryError> {
    let registry = registry.normalize();
    registry
        .validate()
        .map_err(|e| RegistryError::Validation {
            registry: registry.name.clone(),
            reason: e.to_string(),
        })?;
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    match registry.kind {
        RegistryKind::Local => Ok(manifest_dir.join(field(&registry.path))),
        RegistryKind::GithubContent | RegistryKind::Standard => {
            let path = field(&registry.path);
            Ok(path
                .split('/')
                .filter(|s| !s.is_empty())
                .fold(
                    paths::registries_dir(root)
                        .join("github_content")
                        .join("github.com")
                        .join(field(&registry.repo_owner))
                        .join(field(&registry.repo_name))
                        .join(field(&registry.git_ref)),
                    |acc, seg| acc.join(seg),
                ))
        }
        RegistryKind::Http => {
            let url = render_http_url(&registry)?;
            let host = match url.port() {
                Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
                None => url.host_str().unwrap_or_default().to_string(),
            };
            let document = match registry.http_format() {
                "tar.gz" => registry.path.as_deref().unwrap_or_default(),
                _ => url.path(),
            };
            let file_name = if document.to_ascii_lowercase().ends_with(".json") {
                "registry.json"
            } else {
                "registry.yaml"
            };
            let dir = url
                .path()
                .split('/')
                .filter(|s| !s.is_empty() && *s != "." && *s != "..")
                .fold(paths::registries_dir(root).join("http").join(host), |acc, seg| acc.join(seg));
            Ok(dir.join(field(&registry.version)).join(file_name))
        }
    }
}

/// Load one registry into an index.
///
/// A present file is read as-is. A missing `github_content` or `http`
/// document is fetched and written atomically before parsing, so a crash
/// never leaves a truncated cache entry. For a `tar.gz` registry only the
/// extracted document is cached.
///
/// # Errors
///
/// Returns a [`RegistryError`] if the reference is invalid, the document
/// cannot be read, fetched, written or parsed, or it defines a name twice.
pub async fn load_registry(
    root: &Path,
    manifest_dir: &Path,
    registry: &RegistryRef,
    fetcher: &dyn RegistryFetcher,
) -> Result<RegistryIndex, RegistryError> {
    let path = registry_file_path(root, manifest_dir, registry)?;
    let io_err = |source| RegistryError::Io {
        path: path.clone(),
        source,
    };

    let bytes = if tokio::fs::try_exists(&path).await.map_err(io_err)? {
        tracing::debug!(registry = %registry.name, path = %path.display(), "reading cached registry");
        tokio::fs::read(&path).await.map_err(io_err)?
    } else if registry.kind == RegistryKind::Local {
        return Err(io_err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "local registry file does not exist",
        )));
    } else {
        let bytes = fetcher.fetch(&registry.normalize()).await?;
        write_atomic(&path, bytes.clone()).await.map_err(io_err)?;
        tracing::info!(registry = %registry.name, path = %path.display(), "downloaded registry");
        bytes
    };

    let document = parse_document(&path, &bytes)?;
    RegistryIndex::from_document(&registry.name, document)
}

/// Parse a registry document, as JSON for `.json` files and YAML otherwise.
///
/// # Errors
///
/// Returns [`RegistryError::Parse`] if the bytes do not form a registry document.
pub fn parse_document(path: &Path, bytes: &[u8]) -> Result<RegistryDocument, RegistryError> {
    let parse_err = |reason: String| RegistryError::Parse {
        path: path.to_path_buf(),
        reason,
    };
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
        serde_json::from_slice(bytes).map_err(|e| parse_err(e.to_string()))
    } else {
        serde_yaml::from_slice(bytes).map_err(|e| parse_err(e.to_string()))
    }
}

/// Write `bytes` to a temp file beside `path`, then rename it into place.
pub(crate) async fn write_atomic(path: &Path, bytes: Vec<u8>) -> std::io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::other("path has no parent"))?;
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        std::io::Write::write_all(&mut tmp, &bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct StaticFetcher {
        body: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RegistryFetcher for StaticFetcher {
        async fn fetch(&self, _: &RegistryRef) -> Result<Vec<u8>, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.as_bytes().to_vec())
        }
    }

    fn standard() -> RegistryRef {
        RegistryRef {
            name: "standard".into(),
            kind: RegistryKind::Standard,
            git_ref: Some("v4.155.0".into()),
            ..RegistryRef::default()
        }
    }

    #[test]
    fn test_standard_cache_path() {
        let path = registry_file_path(Path::new("/r"), Path::new("/m"), &standard()).unwrap();
        assert_eq!(
            path,
            Path::new("/r/registries/github_content/github.com/aquaproj/aqua-registry/v4.155.0/registry.yaml")
        );
    }

    #[test]
    fn test_local_path_is_relative_to_manifest() {
        let local = RegistryRef {
            name: "local".into(),
            kind: RegistryKind::Local,
            path: Some("registry.yaml".into()),
            ..RegistryRef::default()
        };
        let path = registry_file_path(Path::new("/r"), Path::new("/m"), &local).unwrap();
        assert_eq!(path, Path::new("/m/registry.yaml"));
    }

    #[test]
    fn test_invalid_ref() {
        let mut reg = standard();
        reg.git_ref = None;
        assert!(matches!(
            registry_file_path(Path::new("/r"), Path::new("/m"), &reg),
            Err(RegistryError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_once_then_cached() {
        let root = tempdir().unwrap();
        let fetcher = StaticFetcher {
            body: "packages:\n  - repo_owner: cli\n    repo_name: cli\n    asset: gh\n",
            calls: AtomicUsize::new(0),
        };

        let index = load_registry(root.path(), root.path(), &standard(), &fetcher)
            .await
            .unwrap();
        assert!(index.get("cli/cli").is_some());

        let again = load_registry(root.path(), root.path(), &standard(), &fetcher)
            .await
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_json_local_registry() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("registry.json"),
            r#"{"packages": [{"name": "jq", "type": "http", "url": "https://example.com/jq"}]}"#,
        )
        .unwrap();
        let local = RegistryRef {
            name: "local".into(),
            kind: RegistryKind::Local,
            path: Some("registry.json".into()),
            ..RegistryRef::default()
        };
        let fetcher = StaticFetcher {
            body: "",
            calls: AtomicUsize::new(0),
        };
        let index = load_registry(Path::new("/unused"), dir.path(), &local, &fetcher)
            .await
            .unwrap();
        assert!(index.get("jq").is_some());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_local_registry() {
        let dir = tempdir().unwrap();
        let local = RegistryRef {
            name: "local".into(),
            kind: RegistryKind::Local,
            path: Some("nope.yaml".into()),
            ..RegistryRef::default()
        };
        let fetcher = StaticFetcher {
            body: "",
            calls: AtomicUsize::new(0),
        };
        let err = load_registry(dir.path(), dir.path(), &local, &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_document(Path::new("r.yaml"), b"packages: 3").unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
    }

    fn http(url: &str, format: Option<&str>, path: Option<&str>) -> RegistryRef {
        RegistryRef {
            name: "corp".into(),
            kind: RegistryKind::Http,
            url: Some(url.into()),
            version: Some("v1.2.0".into()),
            format: format.map(Into::into),
            path: path.map(Into::into),
            ..RegistryRef::default()
        }
    }

    #[rstest::rstest]
    #[case::yaml(
        "https://reg.example.com/tools/{{.Version}}/registry.yaml",
        None,
        None,
        "/r/registries/http/reg.example.com/tools/v1.2.0/registry.yaml/v1.2.0/registry.yaml"
    )]
    #[case::json_with_port(
        "http://127.0.0.1:8080/{{.Version}}.json",
        None,
        None,
        "/r/registries/http/127.0.0.1:8080/v1.2.0.json/v1.2.0/registry.json"
    )]
    #[case::bundle(
        "https://reg.example.com/bundle-{{.Version}}.tar.gz",
        Some("tar.gz"),
        Some("registry.json"),
        "/r/registries/http/reg.example.com/bundle-v1.2.0.tar.gz/v1.2.0/registry.json"
    )]
    fn test_http_cache_path(
        #[case] url: &str,
        #[case] format: Option<&str>,
        #[case] path: Option<&str>,
        #[case] expected: &str,
    ) {
        let got = registry_file_path(Path::new("/r"), Path::new("/m"), &http(url, format, path)).unwrap();
        assert_eq!(got, Path::new(expected));
    }

    #[tokio::test]
    async fn test_http_registry_fetched_once() {
        let root = tempdir().unwrap();
        let fetcher = StaticFetcher {
            body: "packages:\n  - name: corp/tool\n    type: http\n    url: https://example.com/tool\n",
            calls: AtomicUsize::new(0),
        };
        let reg = http("https://reg.example.com/{{.Version}}/registry.yaml", None, None);
        for _ in 0..2 {
            let index = load_registry(root.path(), root.path(), &reg, &fetcher).await.unwrap();
            assert!(index.get("corp/tool").is_some());
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
