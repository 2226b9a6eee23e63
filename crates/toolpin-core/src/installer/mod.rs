//! The concurrent installer.
//!
//! [`Installer::install_all`] runs two bounded-parallel phases:
//!
//! 1. **Registries**: every registry a package refers to is read from the
//!    cache or fetched. All loads run to completion; any failure stops the
//!    run before a package is touched.
//! 2. **Packages**: each package is resolved, gated, downloaded and unpacked
//!    on a cache miss, checked, and linked into `bin/` through the proxy.
//!    Failures are reported per package and counted; siblings keep going.
//!
//! Both phases admit at most `max_parallelism` tasks at a time.

pub mod files;
pub mod link;
mod proxy;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use toolpin_schema::{ManifestPackage, PackageType, RegistryKind, RegistryRef};

use crate::config::InstallerConfig;
use crate::error::{InstallAllError, InstallError};
use crate::gate::{
    ChecksumFile, ChecksumOutcome, ChecksumStore, GateError, Policy, PolicyStore, PolicyTarget, PublishedChecksum,
    check_checksum,
};
use crate::io::{ArchiveUnpacker, CommandGoToolchain, Downloader, GoToolchain, HttpDownloader, Unpacker, stream_to_file};
use crate::manifest::Manifest;
use crate::package::EffectivePackage;
use crate::paths;
use crate::registry::{
    GitHubContentFetcher, HttpRegistryFetcher, Registries, RegistryError, RegistryFetcher, load_registry,
    registry_file_path,
};
use crate::reporter::{Reporter, TracingReporter};
use crate::resolve::resolve_effective_package;
use crate::vacuum::{TimestampVacuum, VacuumClient};

/// How often a download is retried after another writer filled its destination.
const MAX_RETRY_DOWNLOAD: usize = 1;

/// Pipeline position of one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    /// Not looked at yet.
    NotChecked,
    /// The install path already exists.
    AlreadyInstalled,
    /// The install path is missing.
    NeedsDownload,
    /// The artifact is being fetched or built.
    Downloading,
    /// The artifact is being unpacked.
    Unpacking,
    /// Every declared file exists and is executable.
    FileVerified,
    /// Every command is linked.
    Linked,
}

impl std::fmt::Display for PackageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotChecked => "not checked",
            Self::AlreadyInstalled => "already installed",
            Self::NeedsDownload => "needs download",
            Self::Downloading => "downloading",
            Self::Unpacking => "unpacking",
            Self::FileVerified => "file verified",
            Self::Linked => "linked",
        };
        f.write_str(s)
    }
}

/// How a package task ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageOutcome {
    /// Downloaded (or built) and linked.
    Installed,
    /// Already present; only checked and linked.
    AlreadyInstalled,
    /// Linked without installing (`only_link`).
    LinkedOnly,
    /// Not available on the target platform.
    Unsupported,
}

/// Checksum settings for one run.
#[derive(Debug, Clone, Copy, Default)]
struct ChecksumMode {
    enabled: bool,
    require: bool,
}

/// Installs manifest packages into a root directory.
#[derive(Clone)]
pub struct Installer {
    config: Arc<InstallerConfig>,
    fetcher: Arc<dyn RegistryFetcher>,
    downloader: Arc<dyn Downloader>,
    unpacker: Arc<dyn Unpacker>,
    go: Arc<dyn GoToolchain>,
    checksums: Arc<dyn ChecksumStore>,
    policy: Arc<dyn PolicyStore>,
    vacuum: Arc<dyn VacuumClient>,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Installer {
    /// An installer with the network-backed collaborators and the default policy.
    pub fn new(config: InstallerConfig, client: reqwest::Client) -> Self {
        let vacuum = TimestampVacuum::new(&config.root_dir);
        Self {
            config: Arc::new(config),
            fetcher: Arc::new(GitHubContentFetcher::new(client.clone())),
            downloader: Arc::new(HttpDownloader::new(client)),
            unpacker: Arc::new(ArchiveUnpacker),
            go: Arc::new(CommandGoToolchain::new()),
            checksums: Arc::new(ChecksumFile::new()),
            policy: Arc::new(Policy::default()),
            vacuum: Arc::new(vacuum),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Settings of this installer.
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Replace the fetcher used for `standard` and `github_content` registries.
    ///
    /// `http` registries always go through the artifact downloader.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn RegistryFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the artifact downloader.
    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = downloader;
        self
    }

    /// Replace the unpacker.
    pub fn with_unpacker(mut self, unpacker: Arc<dyn Unpacker>) -> Self {
        self.unpacker = unpacker;
        self
    }

    /// Replace the Go toolchain.
    pub fn with_go(mut self, go: Arc<dyn GoToolchain>) -> Self {
        self.go = go;
        self
    }

    /// Replace the checksum store.
    pub fn with_checksums(mut self, checksums: Arc<dyn ChecksumStore>) -> Self {
        self.checksums = checksums;
        self
    }

    /// Replace the policy.
    pub fn with_policy(mut self, policy: Arc<dyn PolicyStore>) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the vacuum client.
    pub fn with_vacuum(mut self, vacuum: Arc<dyn VacuumClient>) -> Self {
        self.vacuum = vacuum;
        self
    }

    /// Replace the reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    fn semaphore(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.config.max_parallelism.max(1)))
    }

    /// Load every registry the manifest's packages (and the proxy) refer to.
    ///
    /// # Errors
    ///
    /// Returns [`InstallAllError::Registries`] with every failure once all
    /// loads have finished.
    pub async fn load_registries(&self, manifest: &Manifest) -> Result<Registries, InstallAllError> {
        let mut wanted: Vec<RegistryRef> = manifest.used_registries().into_iter().cloned().collect();
        let proxy_registry = self
            .config
            .proxy
            .as_ref()
            .and_then(|proxy| manifest.registry(&proxy.registry));
        if let Some(reg) = proxy_registry.filter(|reg| !wanted.iter().any(|r| r.name == reg.name)) {
            wanted.push(reg.clone());
        }

        self.reporter.section("Loading registries");
        let semaphore = self.semaphore();
        let http_fetcher: Arc<dyn RegistryFetcher> = Arc::new(HttpRegistryFetcher::new(Arc::clone(&self.downloader)));
        let mut set: JoinSet<Result<_, RegistryError>> = JoinSet::new();
        for registry in wanted {
            let semaphore = Arc::clone(&semaphore);
            let fetcher = match registry.kind {
                RegistryKind::Http => Arc::clone(&http_fetcher),
                _ => Arc::clone(&self.fetcher),
            };
            let root = self.config.root_dir.clone();
            let dir = manifest.dir.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| RegistryError::Fetch {
                        registry: registry.name.clone(),
                        reason: e.to_string(),
                    })?;
                load_registry(&root, &dir, &registry, fetcher.as_ref()).await
            });
        }

        let mut registries = Registries::new();
        let mut failed = Vec::new();
        while let Some(res) = set.join_next().await {
            match res {
                Ok(Ok(index)) => {
                    tracing::debug!(registry = index.name(), packages = index.len(), "registry loaded");
                    registries.insert(index);
                }
                Ok(Err(e)) => {
                    self.reporter.error(&format!("Failed to load registry: {e}"));
                    failed.push(e);
                }
                Err(e) => {
                    self.reporter.error(&format!("Internal error: {e}"));
                    failed.push(RegistryError::Fetch {
                        registry: String::new(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        if failed.is_empty() {
            Ok(registries)
        } else {
            Err(InstallAllError::Registries { failed })
        }
    }

    /// Install every package in `manifest`.
    ///
    /// No package task is started before every registry has loaded, and no
    /// package failure stops its siblings.
    ///
    /// # Errors
    ///
    /// Returns [`InstallAllError::Registries`] or [`InstallAllError::Proxy`]
    /// when a prerequisite fails, and [`InstallAllError::Failed`] after all
    /// tasks finish if any package failed.
    pub async fn install_all(&self, manifest: &Manifest, cancel: &CancellationToken) -> Result<(), InstallAllError> {
        let start = Instant::now();
        let registries = Arc::new(self.load_registries(manifest).await?);
        let manifest = Arc::new(manifest.clone());
        let checksum = ChecksumMode {
            enabled: manifest.checksum.enabled,
            require: manifest.checksum.require_checksum || self.config.require_checksum,
        };

        if let Some(proxy) = self.config.proxy.as_ref().filter(|_| !self.config.only_link) {
            self.install_proxy(proxy, &registries, checksum, cancel)
                .await
                .map_err(InstallAllError::Proxy)?;
        }

        self.reporter.section("Installing packages");
        let semaphore = self.semaphore();
        let installed = Arc::new(AtomicUsize::new(0));
        let mut set: JoinSet<(ManifestPackage, Result<PackageOutcome, InstallError>)> = JoinSet::new();

        for package in manifest.packages.clone() {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let registries = Arc::clone(&registries);
            let manifest = Arc::clone(&manifest);
            let installed = Arc::clone(&installed);
            let cancel = cancel.clone();
            set.spawn(async move {
                let result = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| InstallError::context("Worker pool closed", e))?;
                    if cancel.is_cancelled() {
                        return Err(InstallError::Cancelled);
                    }
                    this.install_package(&package, &manifest, &registries, checksum, &cancel)
                        .await
                }
                .await;
                if matches!(result, Ok(PackageOutcome::Installed)) {
                    installed.fetch_add(1, Ordering::Relaxed);
                }
                (package, result)
            });
        }

        let mut failed = 0;
        while let Some(res) = set.join_next().await {
            match res {
                Ok((_, Ok(_))) => {}
                Ok((package, Err(e))) => {
                    failed += 1;
                    tracing::error!(
                        package_name = %package.name,
                        package_version = %package.version,
                        registry = %package.registry,
                        error = %e,
                        "install the package"
                    );
                    self.reporter.failed(&package.name, &package.version, &e.to_string());
                }
                Err(e) => {
                    failed += 1;
                    self.reporter.error(&format!("Internal error: {e}"));
                }
            }
        }

        let count = installed.load(Ordering::Relaxed);
        if count > 0 {
            self.reporter
                .summary(count, "installed", start.elapsed().as_secs_f64());
        }
        if failed > 0 {
            return Err(InstallAllError::Failed { failed });
        }
        Ok(())
    }

    /// Run the full pipeline for one manifest entry.
    ///
    /// # Errors
    ///
    /// Returns the first [`InstallError`] of any stage.
    async fn install_package(
        &self,
        package: &ManifestPackage,
        manifest: &Manifest,
        registries: &Registries,
        checksum: ChecksumMode,
        cancel: &CancellationToken,
    ) -> Result<PackageOutcome, InstallError> {
        let rt = &self.config.runtime;
        let (name, version) = (&package.name, &package.version);
        self.reporter.state(name, version, PackageState::NotChecked);

        let pkg = resolve_effective_package(package, registries, rt)?;
        if !pkg.is_supported(rt)? {
            tracing::info!(
                package_name = %name,
                package_version = %version,
                runtime = %rt,
                "the package isn't supported on this environment"
            );
            self.reporter.skipped(name, version, &format!("not supported on {rt}"));
            return Ok(PackageOutcome::Unsupported);
        }
        pkg.definition.validate()?;

        if self.config.only_link {
            self.link_commands(&pkg)?;
            self.reporter.state(name, version, PackageState::Linked);
            self.reporter.done(name, version, "linked");
            return Ok(PackageOutcome::LinkedOnly);
        }

        if pkg.kind() == PackageType::GoInstall && version.is_latest() {
            return Err(InstallError::Refused(
                "go_install packages must pin a version, not latest".to_string(),
            ));
        }

        let registry = manifest
            .registry(&package.registry)
            .ok_or_else(|| RegistryError::RegistryNotFound(package.registry.clone()))
            .map_err(|e| InstallError::Resolve(e.into()))?;
        let registry_path = registry_file_path(&self.config.root_dir, &manifest.dir, registry)
            .map_err(|e| InstallError::Resolve(e.into()))?;
        self.policy.evaluate(&PolicyTarget {
            registry,
            registry_path: &registry_path,
            name,
            version,
        })?;

        let pkg_path = pkg.pkg_path(&self.config.root_dir, rt)?;
        let downloaded = self
            .download_with_retry(&pkg, &pkg_path, checksum, cancel)
            .await?;

        self.check_files(&pkg, &pkg_path)?;
        self.reporter.state(name, version, PackageState::FileVerified);

        self.link_commands(&pkg)?;
        self.reporter.state(name, version, PackageState::Linked);
        self.vacuum.touch(&pkg_path);

        if downloaded {
            self.reporter.done(name, version, "installed");
            Ok(PackageOutcome::Installed)
        } else {
            self.reporter.done(name, version, "already installed");
            Ok(PackageOutcome::AlreadyInstalled)
        }
    }

    /// Make sure `pkg_path` holds the package. Returns whether anything was fetched.
    async fn download_with_retry(
        &self,
        pkg: &EffectivePackage,
        pkg_path: &Path,
        checksum: ChecksumMode,
        cancel: &CancellationToken,
    ) -> Result<bool, InstallError> {
        let (name, version) = (pkg.name(), pkg.version());
        let mut retry = 0;
        loop {
            match tokio::fs::metadata(pkg_path).await {
                Ok(meta) if meta.is_dir() => {
                    tracing::debug!(path = %pkg_path.display(), "the package is already installed");
                    self.reporter.state(name, version, PackageState::AlreadyInstalled);
                    return Ok(false);
                }
                Ok(_) => {
                    return Err(InstallError::context(
                        "Install path is not a directory",
                        pkg_path.display(),
                    ));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            self.reporter.state(name, version, PackageState::NeedsDownload);
            match self.fetch_into(pkg, pkg_path, checksum, cancel).await {
                Ok(()) => return Ok(true),
                Err(InstallError::DestinationExists(path)) if retry < MAX_RETRY_DOWNLOAD => {
                    retry += 1;
                    tracing::info!(
                        package_name = %name,
                        package_version = %version,
                        path = %path.display(),
                        retry_count = retry,
                        "retry installing the package"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch or build the package into a staging dir, then move it into place.
    async fn fetch_into(
        &self,
        pkg: &EffectivePackage,
        pkg_path: &Path,
        checksum: ChecksumMode,
        cancel: &CancellationToken,
    ) -> Result<(), InstallError> {
        let rt = &self.config.runtime;
        let (name, version) = (pkg.name(), pkg.version());
        let tmp = paths::tmp_dir(&self.config.root_dir);
        tokio::fs::create_dir_all(&tmp).await?;
        let staging = tempfile::Builder::new().prefix("install-").tempdir_in(&tmp)?;
        let tree = staging.path().join("pkg");

        self.reporter.state(name, version, PackageState::Downloading);
        if pkg.kind().is_go() {
            self.build_go(pkg, &tree.join("bin"), cancel).await?;
        } else {
            let url = pkg
                .download_url(rt)?
                .ok_or_else(|| InstallError::context("No download source", pkg.kind()))?;
            let asset = pkg.render_asset(rt)?;
            let file_name = match paths::filename_from_url(&url) {
                "" => "artifact",
                f => f,
            };
            let archive = staging.path().join(file_name);
            let asset_name = if asset.is_empty() { file_name } else { asset.as_str() };

            let checksum_id = pkg.render_checksum_id(rt)?;
            let published = if checksum.enabled && self.checksums.get(&checksum_id).is_none() {
                match pkg.checksum_url(rt)? {
                    Some(checksum_url) => Some(
                        self.published_checksum(pkg, &checksum_url, &checksum_id, asset_name, cancel)
                            .await?,
                    ),
                    None if checksum.require => {
                        return Err(GateError::ChecksumMissing { id: checksum_id }.into());
                    }
                    None => None,
                }
            } else {
                None
            };

            tracing::info!(
                package_name = %name,
                package_version = %version,
                %url,
                "download and unarchive the package"
            );
            let body = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(InstallError::Cancelled),
                body = self.downloader.download(&url) => body?,
            };
            let total = body.length;
            let digest = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(InstallError::Cancelled),
                digest = stream_to_file(body.reader, &archive, |n| {
                    self.reporter.downloading(name, version, n, total);
                }) => digest?,
            };

            if let Some(expected) = &published {
                expected.verify(&checksum_id, &archive, &digest).await?;
                self.checksums.record(&checksum_id, &digest);
                tracing::info!(checksum_id, "recorded the published checksum");
            } else if checksum.enabled {
                match check_checksum(self.checksums.as_ref(), &checksum_id, &digest, checksum.require)? {
                    ChecksumOutcome::Verified => {
                        tracing::debug!(checksum_id, "checksum verified");
                    }
                    ChecksumOutcome::Recorded => {
                        tracing::info!(checksum_id, "recorded a new checksum");
                    }
                }
            }

            self.reporter.state(name, version, PackageState::Unpacking);
            self.unpacker
                .unpack(&archive, asset_name, pkg.format(), &tree)
                .await?;
            tokio::fs::remove_file(&archive).await?;
        }

        if let Some(parent) = pkg_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Err(e) = tokio::fs::rename(&tree, pkg_path).await {
            if tokio::fs::try_exists(pkg_path).await.unwrap_or(false) {
                return Err(InstallError::DestinationExists(pkg_path.to_path_buf()));
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Download the checksum file the registry declares and find `asset` in it.
    async fn published_checksum(
        &self,
        pkg: &EffectivePackage,
        url: &str,
        checksum_id: &str,
        asset: &str,
        cancel: &CancellationToken,
    ) -> Result<PublishedChecksum, InstallError> {
        let Some(source) = pkg.checksum_source() else {
            return Err(InstallError::context("No checksum source", pkg.name()));
        };
        tracing::debug!(package_name = %pkg.name(), %url, "download the checksum file");
        let mut body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(InstallError::Cancelled),
            body = self.downloader.download(url) => body?,
        };
        let mut content = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut body.reader, &mut content).await?;
        PublishedChecksum::find(&String::from_utf8_lossy(&content), asset, source).map_err(|source| {
            tracing::error!(checksum_id, %url, error = %source, "no usable checksum in the checksum file");
            GateError::PublishedChecksum {
                id: checksum_id.to_string(),
                source,
            }
            .into()
        })
    }

    /// Build a `go` or `go_install` package into `bin_dir`.
    async fn build_go(&self, pkg: &EffectivePackage, bin_dir: &Path, cancel: &CancellationToken) -> Result<(), InstallError> {
        let rt = &self.config.runtime;
        let go_path = pkg.go_path(rt)?;
        let version = pkg.version();
        let targets: Vec<String> = match pkg.kind() {
            PackageType::Go => pkg
                .definition
                .files()
                .iter()
                .map(|file| match file.src.as_deref().map(|s| s.trim_start_matches("./").trim_matches('/')) {
                    Some(src) if !src.is_empty() && src != "." => format!("{go_path}/{src}"),
                    _ => go_path.clone(),
                })
                .collect(),
            _ => vec![go_path],
        };
        for target in targets {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(InstallError::Cancelled),
                res = self.go.install(&target, version, bin_dir) => res?,
            }
        }
        Ok(())
    }

    fn check_files(&self, pkg: &EffectivePackage, pkg_path: &Path) -> Result<(), InstallError> {
        let mut first_err = None;
        for file in pkg.definition.files() {
            let exe = pkg.exe_path(&self.config.root_dir, &file, &self.config.runtime)?;
            if let Err(e) = files::check_file(pkg_path, &file.name, &exe, self.config.strict) {
                tracing::error!(
                    package_name = %pkg.name(),
                    file_name = %file.name,
                    exe_path = %exe.display(),
                    error = %e,
                    "check file_src is correct"
                );
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn link_commands(&self, pkg: &EffectivePackage) -> Result<(), InstallError> {
        let bin = paths::bin_dir(&self.config.root_dir);
        let target = paths::proxy_link_target();
        for file in pkg.definition.files() {
            let outcome = link::ensure_link(&bin.join(&file.name), &target)?;
            tracing::debug!(file_name = %file.name, ?outcome, "command link");
        }
        Ok(())
    }

    /// Absolute path of `command` provided by one of `packages`, if any.
    pub fn which(&self, packages: &[ManifestPackage], registries: &Registries, command: &str) -> Option<PathBuf> {
        let rt = &self.config.runtime;
        let (pkg, file) = crate::resolve::find_command(packages, registries, rt, command)?;
        pkg.exe_path(&self.config.root_dir, &file, rt).ok()
    }
}
