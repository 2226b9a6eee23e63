//! Reporter trait for dependency injection
//!
//! This trait allows the installer to report progress and status without
//! being coupled to a specific terminal implementation.

use toolpin_schema::{PackageName, Version};

use crate::installer::PackageState;

/// Receives progress events from the installer.
pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "Loading registries").
    fn section(&self, title: &str);

    /// A package moved to a new pipeline state.
    fn state(&self, name: &PackageName, version: &Version, state: PackageState);

    /// Updates the progress of a download.
    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>);

    /// Marks a package as successfully completed.
    fn done(&self, name: &PackageName, version: &Version, detail: &str);

    /// Marks a package as intentionally not installed.
    fn skipped(&self, name: &PackageName, version: &Version, reason: &str);

    /// Marks a package as failed with a specific reason.
    fn failed(&self, name: &PackageName, version: &Version, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn state(&self, name: &PackageName, version: &Version, state: PackageState) {
        (**self).state(name, version, state);
    }
    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>) {
        (**self).downloading(name, version, current, total);
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        (**self).done(name, version, detail);
    }
    fn skipped(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).skipped(name, version, reason);
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn state(&self, _: &PackageName, _: &Version, _: PackageState) {}
    fn downloading(&self, _: &PackageName, _: &Version, _: u64, _: Option<u64>) {}
    fn done(&self, _: &PackageName, _: &Version, _: &str) {}
    fn skipped(&self, _: &PackageName, _: &Version, _: &str) {}
    fn failed(&self, _: &PackageName, _: &Version, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}

/// Forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn section(&self, title: &str) {
        tracing::info!("{title}");
    }
    fn state(&self, name: &PackageName, version: &Version, state: PackageState) {
        tracing::debug!(package_name = %name, package_version = %version, %state, "state");
    }
    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>) {
        tracing::trace!(package_name = %name, package_version = %version, current, ?total, "downloading");
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        tracing::info!(package_name = %name, package_version = %version, "{detail}");
    }
    fn skipped(&self, name: &PackageName, version: &Version, reason: &str) {
        tracing::info!(package_name = %name, package_version = %version, "skipped: {reason}");
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        tracing::error!(package_name = %name, package_version = %version, "{reason}");
    }
    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }
    fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }
    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        tracing::info!("{count} package(s) {action} in {elapsed_secs:.2}s");
    }
}
