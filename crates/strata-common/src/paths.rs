//! Standard filesystem paths for strata.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::error::{StrataError, StrataResult};

/// Default root directory for strata data.
pub static STRATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("STRATA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/strata"))
});

/// Host-side directories used by the layer builder.
#[derive(Debug, Clone)]
pub struct StrataPaths {
    /// Root data directory (default: /var/lib/strata).
    pub root: PathBuf,
}

impl StrataPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// OCI image layout directory.
    #[must_use]
    pub fn oci(&self) -> PathBuf {
        self.root.join("oci")
    }

    /// Directory holding one subdirectory per root filesystem or snapshot.
    #[must_use]
    pub fn roots(&self) -> PathBuf {
        self.root.join("roots")
    }

    /// Internal state directory.
    #[must_use]
    pub fn state(&self) -> PathBuf {
        self.root.join("state")
    }
}

impl Default for StrataPaths {
    fn default() -> Self {
        Self {
            root: STRATA_ROOT.clone(),
        }
    }
}

/// Check that `name` is a single path component usable under `roots_dir`
/// or the artifacts directory.
///
/// # Errors
///
/// Returns [`StrataError::Config`] for empty names, `.` and `..`, and names
/// containing `/` or NUL.
pub fn validate_name(name: &str) -> StrataResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(StrataError::config(format!(
            "'{name}' is not a valid root or tag name"
        )));
    }
    Ok(())
}

/// Host directory receiving the artifacts generated for layer `tag`.
#[must_use]
pub fn artifacts_dir(state_dir: &Path, tag: &str) -> PathBuf {
    state_dir.join("artifacts").join(tag)
}

/// Directory of a named root (snapshot or plain rootfs) under `roots_dir`.
#[must_use]
pub fn root_dir(roots_dir: &Path, name: &str) -> PathBuf {
    roots_dir.join(name)
}

/// The filesystem tree a session named `name` runs in.
#[must_use]
pub fn rootfs(roots_dir: &Path, name: &str) -> PathBuf {
    root_dir(roots_dir, name).join("rootfs")
}

/// Fixed locations inside a build session.
#[derive(Debug, Clone, Copy)]
pub struct SessionPaths;

impl SessionPaths {
    /// Where the trusted strata binary is staged.
    pub const TRUSTED_BINARY: &'static str = "/static-strata";

    /// Where an injection's target directory is staged.
    pub const STAGING_DIR: &'static str = "/strata";

    /// Directory receiving generated layer artifacts.
    pub const ARTIFACTS_DIR: &'static str = "/strata-artifacts";

    /// Inventory document location.
    pub const INVENTORY: &'static str = "/strata-artifacts/inventory.json";

    /// File name of the layer SBOM inside [`Self::ARTIFACTS_DIR`].
    pub const LAYER_BOM_NAME: &'static str = "libs.spdx";

    /// SBOM written for each layer.
    pub const LAYER_BOM: &'static str = "/strata-artifacts/libs.spdx";

    /// Tree scanned for the layer SBOM.
    pub const BOM_SCAN_ROOT: &'static str = "/usr/lib/";

    /// Path inside the session of a file injected under the staging dir.
    #[must_use]
    pub fn staged(file_name: &str) -> String {
        format!("{}/{file_name}", Self::STAGING_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_root() {
        let paths = StrataPaths::with_root("/tmp/strata-test");
        assert_eq!(paths.oci(), PathBuf::from("/tmp/strata-test/oci"));
        assert_eq!(paths.roots(), PathBuf::from("/tmp/strata-test/roots"));
        assert_eq!(paths.state(), PathBuf::from("/tmp/strata-test/state"));
    }

    #[test]
    fn rootfs_path() {
        assert_eq!(
            rootfs(Path::new("/var/lib/strata/roots"), "base-1"),
            PathBuf::from("/var/lib/strata/roots/base-1/rootfs")
        );
    }

    #[test]
    fn artifacts_path() {
        assert_eq!(
            artifacts_dir(Path::new("/var/lib/strata/state"), "app"),
            PathBuf::from("/var/lib/strata/state/artifacts/app")
        );
        assert_eq!(
            format!("{}/{}", SessionPaths::ARTIFACTS_DIR, SessionPaths::LAYER_BOM_NAME),
            SessionPaths::LAYER_BOM
        );
    }

    #[test]
    fn names_must_be_single_components() {
        for name in ["base", "alpine:3.20", "app-snapshot-1f2e", "a..b"] {
            assert!(validate_name(name).is_ok(), "{name} should be accepted");
        }
        for name in ["", ".", "..", "../x", "a/b:c", "/abs", "nul\0byte"] {
            assert!(
                matches!(validate_name(name), Err(StrataError::Config { .. })),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn staged_path() {
        assert_eq!(SessionPaths::staged("hello.txt"), "/strata/hello.txt");
    }
}
