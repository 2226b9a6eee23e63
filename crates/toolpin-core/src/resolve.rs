//! Manifest entry to effective package.

use thiserror::Error;
use toolpin_schema::{File, ManifestPackage, Runtime};

use crate::constraint::ConstraintError;
use crate::merge;
use crate::package::EffectivePackage;
use crate::registry::{Registries, RegistryError};

/// Errors raised while resolving a manifest entry.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The registry or the package in it could not be found.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A version constraint failed to compile or evaluate.
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
}

/// Look `package` up and merge every override layer for its version on `runtime`.
///
/// The registry definition is never modified; the result owns a fresh copy.
///
/// # Errors
///
/// Returns a [`ResolveError`] if the lookup fails or a constraint is invalid.
pub fn resolve_effective_package(
    package: &ManifestPackage,
    registries: &Registries,
    runtime: &Runtime,
) -> Result<EffectivePackage, ResolveError> {
    let base = registries.lookup(&package.registry, &package.name)?;
    let definition = merge::effective_definition(base, &package.version, runtime)?;
    Ok(EffectivePackage::new(package.clone(), definition))
}

/// Find the declared package that provides `command`.
///
/// Packages are searched in manifest order; entries that fail to resolve are
/// skipped.
pub fn find_command(
    packages: &[ManifestPackage],
    registries: &Registries,
    runtime: &Runtime,
    command: &str,
) -> Option<(EffectivePackage, File)> {
    packages.iter().find_map(|package| {
        let pkg = match resolve_effective_package(package, registries, runtime) {
            Ok(pkg) => pkg,
            Err(e) => {
                tracing::debug!(package_name = %package.name, error = %e, "skipping unresolvable package");
                return None;
            }
        };
        let file = pkg
            .definition
            .files()
            .into_iter()
            .find(|f| f.name == command)?;
        Some((pkg, file))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryIndex;
    use toolpin_schema::RegistryDocument;

    fn registries() -> Registries {
        let doc: RegistryDocument = serde_yaml::from_str(
            r#"
packages:
  - type: github_release
    repo_owner: cli
    repo_name: cli
    asset: gh_{{trimV .Version}}_{{.OS}}_{{.Arch}}.{{.Format}}
    format: tar.gz
    files:
      - name: gh
    replacements:
      darwin: macOS
    version_constraint: semver(">= 2.0.0")
    version_overrides:
      - version_constraint: "true"
        format: zip
  - type: github_release
    repo_owner: junegunn
    repo_name: fzf
    asset: fzf-{{trimV .Version}}-{{.OS}}_{{.Arch}}.tar.gz
"#,
        )
        .unwrap();
        [RegistryIndex::from_document("standard", doc).unwrap()]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_resolve_gh() {
        let rt = Runtime::new("darwin", "amd64");
        let pkg = resolve_effective_package(&ManifestPackage::new("cli/cli", "v2.17.0"), &registries(), &rt)
            .unwrap();
        assert_eq!(pkg.render_asset(&rt).unwrap(), "gh_2.17.0_macOS_amd64.tar.gz");
        assert_eq!(
            pkg.render_checksum_id(&rt).unwrap(),
            "github_release/github.com/cli/cli/v2.17.0/gh_2.17.0_macOS_amd64.tar.gz"
        );
    }

    #[test]
    fn test_resolve_applies_version_override() {
        let rt = Runtime::new("linux", "amd64");
        let pkg = resolve_effective_package(&ManifestPackage::new("cli/cli", "v1.14.0"), &registries(), &rt)
            .unwrap();
        assert_eq!(pkg.render_asset(&rt).unwrap(), "gh_1.14.0_linux_amd64.zip");
    }

    #[test]
    fn test_resolve_unknown_package() {
        let err = resolve_effective_package(
            &ManifestPackage::new("foo/bar", "v1.0.0"),
            &registries(),
            &Runtime::new("linux", "amd64"),
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::Registry(RegistryError::PackageNotFound { .. })));
    }

    #[test]
    fn test_find_command() {
        let packages = vec![
            ManifestPackage::new("missing/pkg", "v1.0.0"),
            ManifestPackage::new("junegunn/fzf", "0.45.0"),
            ManifestPackage::new("cli/cli", "v2.17.0"),
        ];
        let rt = Runtime::new("linux", "amd64");
        let (pkg, file) = find_command(&packages, &registries(), &rt, "fzf").unwrap();
        assert_eq!(pkg.name(), "junegunn/fzf");
        assert_eq!(file.name, "fzf");
        assert!(find_command(&packages, &registries(), &rt, "gh").is_some());
        assert!(find_command(&packages, &registries(), &rt, "rg").is_none());
    }
}
