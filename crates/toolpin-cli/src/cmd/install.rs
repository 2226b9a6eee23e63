//! Install command

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use toolpin_core::gate::{CHECKSUM_FILE_NAME, ChecksumFile};
use toolpin_core::{Installer, InstallerConfig};
use toolpin_schema::ManifestPackage;

use super::policy::select_policy;
use super::{http_client, load_manifest};

/// Options of `toolpin install`.
#[derive(Debug, Default)]
pub struct InstallOptions<'a> {
    /// Manifest path, if given.
    pub config: Option<&'a Path>,
    /// Only create links.
    pub only_link: bool,
    /// Strict file checks.
    pub test: bool,
    /// Policy file, trusted without an allow record.
    pub policy: Option<&'a Path>,
    /// Proxy package as `NAME@VERSION`.
    pub proxy: Option<&'a str>,
    /// Worker width override.
    pub max_parallelism: Option<usize>,
}

/// Install every package of the manifest.
pub async fn install(opts: InstallOptions<'_>) -> Result<()> {
    let manifest = load_manifest(opts.config).await?;

    let mut config = InstallerConfig::from_env()?;
    config.only_link = opts.only_link;
    config.strict = opts.test;
    if let Some(n) = opts.max_parallelism {
        config = config.with_max_parallelism(n);
    }
    if let Some(proxy) = opts.proxy {
        config = config.with_proxy(
            ManifestPackage::new(proxy, "")
                .normalize()
                .context("Invalid proxy package")?,
        );
    }

    let policy = select_policy(opts.policy, &manifest.dir, &config.root_dir).await?;

    let checksum_path = manifest.dir.join(CHECKSUM_FILE_NAME);
    let checksums = Arc::new(
        ChecksumFile::load(&checksum_path)
            .await
            .context("Failed to load checksums")?,
    );

    let installer = Installer::new(config, http_client()?)
        .with_policy(Arc::new(policy))
        .with_checksums(checksums.clone());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling downloads");
            on_signal.cancel();
        }
    });

    let result = installer.install_all(&manifest, &cancel).await;

    if manifest.checksum.enabled && checksums.is_dirty() {
        checksums
            .save(&checksum_path)
            .await
            .context("Failed to save checksums")?;
        tracing::info!(path = %checksum_path.display(), "updated checksums");
    }

    result.context("Install failed")
}
