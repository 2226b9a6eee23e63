//! Registry and package allow-lists.
//!
//! A package is allowed when some registry rule matches the registry it
//! comes from, and some package rule naming that registry rule matches its
//! name and version. Rules are tried in order; the first match wins.
//!
//! A rule whose version constraint cannot be evaluated is logged and treated
//! as a non-match, so a later rule may still allow the package.

use std::path::{Path, PathBuf};

use glob::Pattern;
use toolpin_schema::{PolicyDocument, PolicyPackage, PolicyRegistry, RegistryKind, RegistryRef};

use super::GateError;
use crate::constraint::{self, Env};

/// What the policy is asked about.
#[derive(Debug, Clone, Copy)]
pub struct PolicyTarget<'a> {
    /// Registry the package is resolved from, as declared in the manifest.
    pub registry: &'a RegistryRef,
    /// Resolved document path of that registry (used for `local` rules).
    pub registry_path: &'a Path,
    /// Package name.
    pub name: &'a str,
    /// Package version.
    pub version: &'a str,
}

/// Decides whether a package may be installed.
pub trait PolicyStore: Send + Sync {
    /// Allow or deny `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::RegistryDenied`] or [`GateError::PackageDenied`]
    /// when no rule allows the target.
    fn evaluate(&self, target: &PolicyTarget<'_>) -> Result<(), GateError>;
}

#[derive(Debug, Clone)]
struct RegistryRule {
    name: String,
    kind: RegistryKind,
    repo_owner: Option<String>,
    repo_name: Option<String>,
    git_ref: Option<String>,
    path: Option<Pattern>,
    url: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Clone)]
struct PackageRule {
    name: Option<Pattern>,
    version: Option<String>,
    registry: String,
}

/// A compiled policy document.
#[derive(Debug, Clone)]
pub struct Policy {
    registries: Vec<RegistryRule>,
    packages: Vec<PackageRule>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::standard_only()
    }
}

fn pattern(p: &str) -> Result<Pattern, GateError> {
    Pattern::new(p).map_err(|e| GateError::InvalidPolicy(format!("invalid glob {p:?}: {e}")))
}

impl Policy {
    /// Allow every package of the standard registry and nothing else.
    pub fn standard_only() -> Self {
        // The standard document has no globs, so compiling it cannot fail.
        Self::compile(PolicyDocument::standard_only(), None).unwrap_or(Self {
            registries: Vec::new(),
            packages: Vec::new(),
        })
    }

    /// Compile `doc`; relative `local` paths resolve against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidPolicy`] if a name or path glob is malformed.
    pub fn compile(doc: PolicyDocument, base_dir: Option<&Path>) -> Result<Self, GateError> {
        let registries = doc
            .registries
            .into_iter()
            .map(|r| Self::registry_rule(r, base_dir))
            .collect::<Result<Vec<_>, _>>()?;
        let packages = doc
            .packages
            .into_iter()
            .map(|p: PolicyPackage| -> Result<PackageRule, GateError> {
                Ok(PackageRule {
                    name: p.name.as_deref().map(pattern).transpose()?,
                    version: p.version.filter(|v| !v.trim().is_empty()),
                    registry: p.registry,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            registries,
            packages,
        })
    }

    fn registry_rule(rule: PolicyRegistry, base_dir: Option<&Path>) -> Result<RegistryRule, GateError> {
        let normalized = RegistryRef {
            name: rule.name.clone(),
            kind: rule.kind,
            repo_owner: rule.repo_owner,
            repo_name: rule.repo_name,
            path: rule.path,
            ..RegistryRef::default()
        }
        .normalize();
        let path = match (normalized.kind, normalized.path.as_deref(), base_dir) {
            (_, None, _) => None,
            (RegistryKind::Local, Some(p), Some(base)) if Path::new(p).is_relative() => {
                Some(pattern(&base.join(p).to_string_lossy())?)
            }
            (_, Some(p), _) => Some(pattern(p)?),
        };
        Ok(RegistryRule {
            name: rule.name,
            kind: normalized.kind,
            repo_owner: normalized.repo_owner,
            repo_name: normalized.repo_name,
            git_ref: rule.git_ref.filter(|r| !r.trim().is_empty()),
            path,
            url: rule.url.filter(|u| !u.is_empty()),
            version: rule.version.filter(|v| !v.trim().is_empty()),
        })
    }

    /// Read and compile a YAML policy file.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::File`] if the file cannot be read or parsed, and
    /// [`GateError::InvalidPolicy`] if it does not compile.
    pub async fn load(path: &Path) -> Result<Self, GateError> {
        let file_err = |reason: String| GateError::File {
            path: path.to_path_buf(),
            reason,
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| file_err(e.to_string()))?;
        let doc: PolicyDocument = serde_yaml::from_str(&text).map_err(|e| file_err(e.to_string()))?;
        let base: Option<PathBuf> = path.parent().map(Path::to_path_buf);
        Self::compile(doc, base.as_deref())
    }

    fn registry_matches(rule: &RegistryRule, target: &PolicyTarget<'_>) -> bool {
        let registry = target.registry.normalize();
        if rule.kind != registry.kind {
            return false;
        }
        match registry.kind {
            RegistryKind::Local => rule
                .path
                .as_ref()
                .is_none_or(|p| p.matches_path(target.registry_path)),
            RegistryKind::GithubContent | RegistryKind::Standard => {
                if rule.repo_owner != registry.repo_owner || rule.repo_name != registry.repo_name {
                    return false;
                }
                let path = registry.path.as_deref().unwrap_or_default();
                if rule.path.as_ref().is_some_and(|p| !p.matches(path)) {
                    return false;
                }
                satisfies(rule, rule.git_ref.as_deref(), registry.git_ref.as_deref())
            }
            RegistryKind::Http => {
                if rule.url.as_ref().is_some_and(|u| Some(u) != registry.url.as_ref()) {
                    return false;
                }
                satisfies(rule, rule.version.as_deref(), registry.version.as_deref())
            }
        }
    }

    fn package_matches(rule: &PackageRule, target: &PolicyTarget<'_>) -> bool {
        if rule.name.as_ref().is_some_and(|p| !p.matches(target.name)) {
            return false;
        }
        rule.version
            .as_deref()
            .is_none_or(|expr| eval(&rule.registry, expr, target.version))
    }
}

/// Whether a registry's ref or version satisfies the rule's constraint, if any.
fn satisfies(rule: &RegistryRule, expr: Option<&str>, value: Option<&str>) -> bool {
    match (expr, value) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(expr), Some(value)) => eval(&rule.name, expr, value),
    }
}

fn eval(rule: &str, expr: &str, version: &str) -> bool {
    constraint::evaluate(expr, &Env::version(version)).unwrap_or_else(|e| {
        tracing::warn!(
            policy_rule = rule,
            constraint = expr,
            version,
            error = %e,
            "the policy constraint cannot be evaluated, skipping the rule"
        );
        false
    })
}

impl PolicyStore for Policy {
    fn evaluate(&self, target: &PolicyTarget<'_>) -> Result<(), GateError> {
        let mut allowed_registries = Vec::new();
        for rule in &self.registries {
            if Self::registry_matches(rule, target) {
                allowed_registries.push(rule.name.as_str());
            }
        }
        if allowed_registries.is_empty() {
            return Err(GateError::RegistryDenied {
                registry: target.registry.name.clone(),
            });
        }

        for rule in &self.packages {
            if allowed_registries.contains(&rule.registry.as_str()) && Self::package_matches(rule, target) {
                tracing::debug!(
                    registry = %target.registry.name,
                    package_name = target.name,
                    package_version = target.version,
                    "allowed by policy"
                );
                return Ok(());
            }
        }
        Err(GateError::PackageDenied {
            registry: target.registry.name.clone(),
            name: target.name.to_string(),
            version: target.version.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> RegistryRef {
        RegistryRef {
            name: "standard".into(),
            kind: RegistryKind::Standard,
            git_ref: Some("v4.155.0".into()),
            ..RegistryRef::default()
        }
    }

    fn local() -> RegistryRef {
        RegistryRef {
            name: "local".into(),
            kind: RegistryKind::Local,
            path: Some("registry.yaml".into()),
            ..RegistryRef::default()
        }
    }

    const CORP_URL: &str = "https://registry.example.com/{{.Version}}/registry.yaml";

    fn http(url: &str, version: &str) -> RegistryRef {
        RegistryRef {
            name: "corp".into(),
            kind: RegistryKind::Http,
            url: Some(url.into()),
            version: Some(version.into()),
            ..RegistryRef::default()
        }
    }

    fn http_policy() -> Policy {
        let doc: PolicyDocument = serde_yaml::from_str(&format!(
            r#"
registries:
  - name: corp
    type: http
    url: "{CORP_URL}"
    version: semver(">= 1.2.0")
packages:
  - registry: corp
"#
        ))
        .unwrap();
        Policy::compile(doc, None).unwrap()
    }

    fn target<'a>(registry: &'a RegistryRef, path: &'a Path, name: &'a str, version: &'a str) -> PolicyTarget<'a> {
        PolicyTarget {
            registry,
            registry_path: path,
            name,
            version,
        }
    }

    #[test]
    fn test_default_allows_standard_only() {
        let policy = Policy::default();
        let std_reg = standard();
        let local_reg = local();
        let path = Path::new("/m/registry.yaml");
        assert!(policy.evaluate(&target(&std_reg, path, "cli/cli", "v2.17.0")).is_ok());
        assert!(matches!(
            policy.evaluate(&target(&local_reg, path, "cli/cli", "v2.17.0")),
            Err(GateError::RegistryDenied { .. })
        ));
    }

    #[test]
    fn test_standard_written_out_matches_shorthand() {
        let mut explicit = standard().normalize();
        explicit.name = "aqua".into();
        let policy = Policy::default();
        assert!(policy
            .evaluate(&target(&explicit, Path::new(""), "cli/cli", "v2.17.0"))
            .is_ok());
    }

    #[test]
    fn test_package_rules() {
        let doc: PolicyDocument = serde_yaml::from_str(
            r#"
registries:
  - name: standard
    type: standard
    ref: semver(">= 4.0.0")
  - name: mine
    type: local
    path: registry*.yaml
packages:
  - name: cli/cli
    version: semver(">= 2.0.0")
  - name: "suzuki-shunsuke/*"
  - registry: mine
"#,
        )
        .unwrap();
        let policy = Policy::compile(doc, Some(Path::new("/m"))).unwrap();
        let std_reg = standard();
        let local_reg = local();
        let p = Path::new("/m/registry.yaml");

        assert!(policy.evaluate(&target(&std_reg, p, "cli/cli", "v2.17.0")).is_ok());
        assert!(matches!(
            policy.evaluate(&target(&std_reg, p, "cli/cli", "v1.0.0")),
            Err(GateError::PackageDenied { .. })
        ));
        assert!(policy.evaluate(&target(&std_reg, p, "suzuki-shunsuke/tfcmt", "v1.0.0")).is_ok());
        assert!(matches!(
            policy.evaluate(&target(&std_reg, p, "junegunn/fzf", "0.45.0")),
            Err(GateError::PackageDenied { .. })
        ));
        assert!(policy.evaluate(&target(&local_reg, p, "anything", "v0.0.1")).is_ok());
        assert!(matches!(
            policy.evaluate(&target(&local_reg, Path::new("/other/registry.yaml"), "anything", "v0.0.1")),
            Err(GateError::RegistryDenied { .. })
        ));

        let mut old = standard();
        old.git_ref = Some("v3.90.0".into());
        assert!(matches!(
            policy.evaluate(&target(&old, p, "cli/cli", "v2.17.0")),
            Err(GateError::RegistryDenied { .. })
        ));
    }

    #[test]
    fn test_invalid_glob() {
        let doc = PolicyDocument {
            registries: vec![],
            packages: vec![PolicyPackage {
                name: Some("[".into()),
                version: None,
                registry: "standard".into(),
            }],
        };
        assert!(matches!(Policy::compile(doc, None), Err(GateError::InvalidPolicy(_))));
    }

    #[tokio::test]
    async fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, "registries:\n  - name: standard\n    type: standard\npackages:\n  - {}\n").unwrap();
        let policy = Policy::load(&path).await.unwrap();
        let std_reg = standard();
        assert!(policy.evaluate(&target(&std_reg, Path::new(""), "x/y", "v1")).is_ok());
    }

    #[rstest::rstest]
    #[case::allowed(CORP_URL, "v1.2.0", true)]
    #[case::newer(CORP_URL, "v2.0.0", true)]
    #[case::too_old(CORP_URL, "v1.1.9", false)]
    #[case::other_url("https://mirror.example.com/{{.Version}}/registry.yaml", "v1.2.0", false)]
    fn test_http_registry_rule(#[case] url: &str, #[case] version: &str, #[case] allowed: bool) {
        let registry = http(url, version);
        let got = http_policy().evaluate(&target(&registry, Path::new(""), "corp/tool", "v1.0.0"));
        if allowed {
            assert!(got.is_ok(), "{got:?}");
        } else {
            assert!(matches!(got, Err(GateError::RegistryDenied { .. })), "{got:?}");
        }
    }

    #[test]
    fn test_http_rule_does_not_match_other_kinds() {
        let std_reg = standard();
        assert!(matches!(
            http_policy().evaluate(&target(&std_reg, Path::new(""), "cli/cli", "v2.17.0")),
            Err(GateError::RegistryDenied { .. })
        ));
    }

    #[test]
    fn test_bad_constraint_skips_to_next_rule() {
        let doc: PolicyDocument = serde_yaml::from_str(
            r#"
registries:
  - name: broken
    type: standard
    ref: semver(">= nope
  - name: standard
    type: standard
packages:
  - name: cli/cli
    version: not_a_function()
    registry: standard
  - name: cli/cli
    version: semver(">= 2.0.0")
"#,
        )
        .unwrap();
        let policy = Policy::compile(doc, None).unwrap();
        let std_reg = standard();
        assert!(policy.evaluate(&target(&std_reg, Path::new(""), "cli/cli", "v2.17.0")).is_ok());
        assert!(matches!(
            policy.evaluate(&target(&std_reg, Path::new(""), "cli/cli", "v1.0.0")),
            Err(GateError::PackageDenied { .. })
        ));
    }
}
