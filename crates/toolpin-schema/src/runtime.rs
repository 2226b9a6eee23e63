//! Target platform identification.
//!
//! Registries describe platforms with Go's `GOOS`/`GOARCH` vocabulary
//! (`darwin`, `linux`, `windows` / `amd64`, `arm64`), so the runtime is kept
//! in that vocabulary rather than Rust's `std::env::consts` names.

use serde::{Deserialize, Serialize};

/// The operating system and architecture packages are resolved for.
///
/// # Example
///
/// ```
/// use toolpin_schema::Runtime;
///
/// let rt = Runtime::new("darwin", "arm64");
/// assert_eq!(rt.to_string(), "darwin/arm64");
/// assert!(!rt.is_windows());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Runtime {
    /// Operating system in `GOOS` spelling.
    pub goos: String,
    /// Architecture in `GOARCH` spelling.
    pub goarch: String,
}

impl Runtime {
    /// Create a runtime from explicit `GOOS`/`GOARCH` values.
    pub fn new(goos: &str, goarch: &str) -> Self {
        Self {
            goos: goos.to_string(),
            goarch: goarch.to_string(),
        }
    }

    /// Get the runtime of the running process.
    pub fn current() -> Self {
        Self::new(goos_of(std::env::consts::OS), goarch_of(std::env::consts::ARCH))
    }

    /// Whether the target operating system is Windows.
    pub fn is_windows(&self) -> bool {
        self.goos == "windows"
    }

    /// Whether this is an Apple Silicon host, where Rosetta 2 can run `amd64` binaries.
    pub fn is_apple_silicon(&self) -> bool {
        self.goos == "darwin" && self.goarch == "arm64"
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::current()
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.goos, self.goarch)
    }
}

impl std::str::FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((goos, goarch)) if !goos.is_empty() && !goarch.is_empty() => {
                Ok(Self::new(goos_of(goos), goarch_of(goarch)))
            }
            _ => Err(format!("Invalid runtime (expected GOOS/GOARCH): {s}")),
        }
    }
}

fn goos_of(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn goarch_of(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" | "i686" => "386",
        other => other,
    }
}
