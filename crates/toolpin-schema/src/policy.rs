//! Allow-list policy document types.
//!
//! ```yaml
//! registries:
//!   - name: standard
//!     type: standard
//!     ref: semver(">= 3.0.0")
//!   - name: local
//!     type: local
//!     path: registry.yaml
//!   - name: corp
//!     type: http
//!     url: https://registry.example.com/{{.Version}}/registry.yaml
//!     version: semver(">= 1.2.0")
//! packages:
//!   - registry: local
//!   - name: cli/cli
//!     version: semver(">= 2.0.0")
//! ```

use serde::{Deserialize, Serialize};

use crate::manifest::{RegistryKind, STANDARD_REGISTRY_NAME};

/// A policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PolicyDocument {
    /// Registry allow rules.
    pub registries: Vec<PolicyRegistry>,
    /// Package allow rules.
    pub packages: Vec<PolicyPackage>,
}

/// Allows registries matching its coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyRegistry {
    /// Name package rules refer to this rule by.
    pub name: String,
    /// Kind the registry must have.
    #[serde(rename = "type")]
    pub kind: RegistryKind,
    /// Required repository owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_owner: Option<String>,
    /// Required repository name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    /// Version constraint the registry's ref must satisfy.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Required document path; may be a glob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Required URL template of an `http` registry, compared verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Version constraint an `http` registry's version must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn default_registry() -> String {
    STANDARD_REGISTRY_NAME.to_string()
}

/// Allows packages from an allowed registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPackage {
    /// Package name or glob; unset allows every package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Version constraint the package version must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Name of the registry rule the package must come through.
    #[serde(default = "default_registry")]
    pub registry: String,
}

impl PolicyDocument {
    /// Allow every package of the standard registry and nothing else.
    pub fn standard_only() -> Self {
        Self {
            registries: vec![PolicyRegistry {
                name: STANDARD_REGISTRY_NAME.to_string(),
                kind: RegistryKind::Standard,
                ..PolicyRegistry::default()
            }],
            packages: vec![PolicyPackage {
                name: None,
                version: None,
                registry: default_registry(),
            }],
        }
    }
}
