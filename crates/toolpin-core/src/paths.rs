//! Installation tree layout.
//!
//! ```text
//! <root>/
//! ├── bin/            # Symlinks to ../toolpin-proxy, one per command
//! ├── pkgs/           # Unpacked artifacts, keyed by type/host/path/version/asset
//! ├── registries/     # Cached registry documents
//! ├── metadata/       # Usage timestamps for vacuum
//! ├── policies/       # Digests of allowed repository policy files
//! ├── policy-warnings/ # Markers of denied repository policy files
//! ├── tmp/            # Download and unpack staging (same volume as pkgs)
//! └── toolpin-proxy   # Symlink to the installed proxy binary
//! ```

use dirs::home_dir;
use std::path::{Path, PathBuf};

/// File name of the shared proxy executable.
pub const PROXY_NAME: &str = "toolpin-proxy";

/// Returns the root directory, or None if the user's home cannot be resolved.
///
/// `TOOLPIN_ROOT_DIR` wins over the default `~/.local/share/toolpin`.
pub fn try_toolpin_root() -> Option<PathBuf> {
    if let Some(val) = std::env::var_os("TOOLPIN_ROOT_DIR").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".local").join("share").join("toolpin"))
}

/// Shared command directory: `<root>/bin`
pub fn bin_dir(root: &Path) -> PathBuf {
    root.join("bin")
}

/// Artifact store: `<root>/pkgs`
pub fn pkgs_dir(root: &Path) -> PathBuf {
    root.join("pkgs")
}

/// Registry cache: `<root>/registries`
pub fn registries_dir(root: &Path) -> PathBuf {
    root.join("registries")
}

/// Usage metadata: `<root>/metadata`
pub fn metadata_dir(root: &Path) -> PathBuf {
    root.join("metadata")
}

/// Allowed policy digests: `<root>/policies`
pub fn policies_dir(root: &Path) -> PathBuf {
    root.join("policies")
}

/// Denied policy markers: `<root>/policy-warnings`
pub fn policy_warnings_dir(root: &Path) -> PathBuf {
    root.join("policy-warnings")
}

/// Temp path: `<root>/tmp` (guaranteed same volume as pkgs)
pub fn tmp_dir(root: &Path) -> PathBuf {
    root.join("tmp")
}

/// Proxy link: `<root>/toolpin-proxy`
pub fn proxy_path(root: &Path) -> PathBuf {
    root.join(PROXY_NAME)
}

/// Target every command link points at, relative to the bin directory.
pub fn proxy_link_target() -> PathBuf {
    Path::new("..").join(PROXY_NAME)
}

/// Extract the filename from a URL or slash-separated path.
pub fn filename_from_url(url: &str) -> &str {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    url.split('/').next_back().unwrap_or("")
}
