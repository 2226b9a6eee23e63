//! Which command

use std::path::Path;

use anyhow::{Context, Result, bail};
use toolpin_core::{Installer, InstallerConfig};

use super::{http_client, load_manifest};

/// Print the absolute path of the executable that provides `command`.
pub async fn which(config: Option<&Path>, command: &str) -> Result<()> {
    let manifest = load_manifest(config).await?;
    let installer = Installer::new(InstallerConfig::from_env()?, http_client()?);
    let registries = installer
        .load_registries(&manifest)
        .await
        .context("Failed to load registries")?;

    match installer.which(&manifest.packages, &registries, command) {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => bail!("Command '{command}' is not provided by any package in {}", manifest.path.display()),
    }
}
