//! Layered override merging.
//!
//! Two pure reducers turn a registry definition into the one that applies
//! to a specific version on a specific runtime:
//!
//! 1. [`apply_version_overrides`]: when the base's own `version_constraint`
//!    rejects the version, the first matching [`VersionOverride`] patches the
//!    base field by field.
//! 2. [`apply_runtime_overrides`]: the first [`FormatOverride`] for the
//!    runtime's `GOOS` sets the format, then the first matching [`Override`]
//!    merges replacements and replaces format/asset/files/url.
//!
//! Both take the base by reference or value and return a fresh definition;
//! registry data shared between tasks is never mutated.
//!
//! [`VersionOverride`]: toolpin_schema::VersionOverride
//! [`FormatOverride`]: toolpin_schema::FormatOverride
//! [`Override`]: toolpin_schema::Override

use toolpin_schema::{Override, PackageDefinition, PackageType, Runtime, VersionOverride};

use crate::constraint::{self, ConstraintError};

/// Resolve version overrides for `version`.
///
/// Without a top-level constraint, or when it matches, the base is returned
/// as-is. Otherwise the first override whose constraint matches is applied;
/// if none matches the result is an unchanged copy of the base.
///
/// # Errors
///
/// Returns a [`ConstraintError`] if a constraint evaluated along the way
/// fails to compile or does not produce a boolean.
pub fn apply_version_overrides(
    base: &PackageDefinition,
    version: &str,
) -> Result<PackageDefinition, ConstraintError> {
    let mut def = base.clone();
    let Some(constraint) = base
        .version_constraint
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    else {
        return Ok(def);
    };
    if constraint::resolve(constraint, version)? {
        return Ok(def);
    }
    for vo in &base.version_overrides {
        if constraint::resolve(&vo.version_constraint, version)? {
            tracing::debug!(
                package_name = %base.name(),
                package_version = version,
                version_constraint = %vo.version_constraint,
                "applying version override"
            );
            patch(&mut def, vo);
            return Ok(def);
        }
    }
    Ok(def)
}

fn patch(def: &mut PackageDefinition, vo: &VersionOverride) {
    if let Some(kind) = vo.kind {
        if kind != def.kind {
            reset_for_type(def, kind);
        }
        def.kind = kind;
    }
    set_if(&mut def.repo_owner, &vo.repo_owner);
    set_if(&mut def.repo_name, &vo.repo_name);
    set_if(&mut def.asset, &vo.asset);
    set_if(&mut def.path, &vo.path);
    set_if(&mut def.format, &vo.format);
    set_if(&mut def.url, &vo.url);
    set_if(&mut def.supported_if, &vo.supported_if);
    set_if(&mut def.version_filter, &vo.version_filter);
    if vo.replacements.is_some() {
        def.replacements.clone_from(&vo.replacements);
    }
    if let Some(files) = &vo.files {
        def.files.clone_from(files);
    }
    if let Some(fos) = &vo.format_overrides {
        def.format_overrides.clone_from(fos);
    }
    if let Some(overrides) = &vo.overrides {
        def.overrides.clone_from(overrides);
    }
    if let Some(envs) = &vo.supported_envs {
        def.supported_envs.clone_from(envs);
    }
    if let Some(rosetta2) = vo.rosetta2 {
        def.rosetta2 = rosetta2;
    }
    if vo.checksum.is_some() {
        def.checksum.clone_from(&vo.checksum);
    }
}

fn set_if(field: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        field.clone_from(value);
    }
}

/// Clear fields the new type tag has no use for.
fn reset_for_type(def: &mut PackageDefinition, kind: PackageType) {
    match kind {
        PackageType::GithubRelease => {
            def.url = None;
            def.path = None;
        }
        PackageType::GithubContent => {
            def.url = None;
            def.asset = None;
        }
        PackageType::GithubArchive | PackageType::Go => {
            def.url = None;
            def.path = None;
            def.asset = None;
            def.format = None;
        }
        PackageType::Http => {
            def.path = None;
            def.asset = None;
        }
        PackageType::GoInstall => {
            def.url = None;
            def.asset = None;
            def.format = None;
        }
    }
}

fn override_matches(ov: &Override, runtime: &Runtime) -> bool {
    ov.goos.as_deref().is_none_or(|goos| goos == runtime.goos)
        && ov.goarch.as_deref().is_none_or(|goarch| goarch == runtime.goarch)
}

/// Apply format overrides and platform overrides for `runtime`.
pub fn apply_runtime_overrides(mut def: PackageDefinition, runtime: &Runtime) -> PackageDefinition {
    if let Some(fo) = def.format_overrides.iter().find(|fo| fo.goos == runtime.goos) {
        def.format = Some(fo.format.clone());
    }

    let Some(ov) = def
        .overrides
        .iter()
        .find(|ov| override_matches(ov, runtime))
        .cloned()
    else {
        return def;
    };

    if let Some(replacements) = ov.replacements {
        let mut merged = def.replacements.take().unwrap_or_default();
        merged.extend(replacements);
        def.replacements = Some(merged);
    }
    set_if(&mut def.format, &ov.format);
    set_if(&mut def.asset, &ov.asset);
    set_if(&mut def.url, &ov.url);
    if let Some(files) = ov.files {
        def.files = files;
    }
    def
}

/// Both reducers in order: the definition for `version` on `runtime`.
///
/// # Errors
///
/// See [`apply_version_overrides`].
pub fn effective_definition(
    base: &PackageDefinition,
    version: &str,
    runtime: &Runtime,
) -> Result<PackageDefinition, ConstraintError> {
    Ok(apply_runtime_overrides(
        apply_version_overrides(base, version)?,
        runtime,
    ))
}
