//! The shared proxy every command link points at.

use tokio_util::sync::CancellationToken;
use toolpin_schema::ManifestPackage;

use super::{ChecksumMode, Installer, PackageState, files, link};
use crate::error::InstallError;
use crate::paths;
use crate::registry::Registries;
use crate::resolve::resolve_effective_package;

impl Installer {
    /// Install the proxy package and point `<root>/toolpin-proxy` at its executable.
    pub(super) async fn install_proxy(
        &self,
        proxy: &ManifestPackage,
        registries: &Registries,
        checksum: ChecksumMode,
        cancel: &CancellationToken,
    ) -> Result<(), InstallError> {
        let rt = &self.config.runtime;
        let root = &self.config.root_dir;
        self.reporter.section("Installing the proxy");

        let pkg = resolve_effective_package(proxy, registries, rt)?;
        pkg.definition.validate()?;
        let file = pkg
            .definition
            .files()
            .into_iter()
            .next()
            .ok_or_else(|| InstallError::context("Proxy package declares no files", pkg.name()))?;

        let pkg_path = pkg.pkg_path(root, rt)?;
        self.download_with_retry(&pkg, &pkg_path, checksum, cancel)
            .await?;

        let exe = pkg.exe_path(root, &file, rt)?;
        files::check_file(&pkg_path, &file.name, &exe, self.config.strict)?;
        self.reporter
            .state(pkg.name(), pkg.version(), PackageState::FileVerified);

        let outcome = link::ensure_link(&paths::proxy_path(root), &exe)?;
        tracing::debug!(proxy = %exe.display(), ?outcome, "proxy link");
        self.reporter
            .state(pkg.name(), pkg.version(), PackageState::Linked);
        self.vacuum.touch(&pkg_path);
        Ok(())
    }
}
