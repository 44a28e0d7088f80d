//! OverlayFS-backed snapshots.

use std::path::{Path, PathBuf};

use strata_common::{StrataError, StrataResult, paths};

use super::{Snapshot, Storage};

/// OverlayFS configuration.
#[derive(Debug, Clone)]
pub struct OverlayFs {
    /// Lower directories (read-only layers).
    pub lower_dirs: Vec<PathBuf>,
    /// Upper directory (writable layer).
    pub upper_dir: PathBuf,
    /// Work directory (required by overlayfs).
    pub work_dir: PathBuf,
    /// Merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayFs {
    /// Overlay of `lower` laid out under a snapshot directory.
    pub fn for_snapshot(snapshot_dir: &Path, lower: PathBuf) -> Self {
        Self {
            lower_dirs: vec![lower],
            upper_dir: snapshot_dir.join("upper"),
            work_dir: snapshot_dir.join("work"),
            merged_dir: snapshot_dir.join("rootfs"),
        }
    }

    /// Create necessary directories.
    pub fn create_dirs(&self) -> StrataResult<()> {
        std::fs::create_dir_all(&self.upper_dir)?;
        std::fs::create_dir_all(&self.work_dir)?;
        std::fs::create_dir_all(&self.merged_dir)?;
        Ok(())
    }

    /// Get the mount options string.
    #[must_use]
    pub fn mount_options(&self) -> String {
        let lower = self
            .lower_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");

        format!(
            "lowerdir={},upperdir={},workdir={}",
            lower,
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }

    /// Mount the overlay filesystem.
    #[cfg(target_os = "linux")]
    pub fn mount(&self) -> StrataResult<()> {
        use rustix::mount::{MountFlags, mount};
        use std::ffi::CString;

        self.create_dirs()?;

        let options = self.mount_options();
        tracing::debug!(
            merged = %self.merged_dir.display(),
            options = %options,
            "Mounting overlayfs"
        );

        let options_c = CString::new(options)
            .map_err(|_| StrataError::config("invalid overlay options (contains null byte)"))?;

        mount(
            "overlay",
            &self.merged_dir,
            c"overlay",
            MountFlags::empty(),
            options_c.as_c_str(),
        )
        .map_err(|e| StrataError::setup(format!("overlay {}", self.merged_dir.display()), e))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn mount(&self) -> StrataResult<()> {
        Err(StrataError::Unsupported {
            feature: "overlayfs".to_string(),
        })
    }

    /// Unmount the overlay filesystem.
    pub fn unmount(&self) -> StrataResult<()> {
        crate::session::unmount(&self.merged_dir)
    }
}

/// Snapshots taken as overlays over `<roots-dir>/<tag>/rootfs`.
#[derive(Debug, Clone)]
pub struct OverlayStorage {
    roots_dir: PathBuf,
}

impl OverlayStorage {
    /// Storage rooted at `roots_dir`.
    pub fn new(roots_dir: impl Into<PathBuf>) -> Self {
        Self {
            roots_dir: roots_dir.into(),
        }
    }

    fn snapshot_name(tag: &str) -> String {
        let tag: String = tag
            .chars()
            .map(|c| if c == ':' { '_' } else { c })
            .collect();
        format!("{tag}-snapshot-{}", uuid::Uuid::new_v4().simple())
    }
}

impl Storage for OverlayStorage {
    fn temporary_writable_snapshot(&self, tag: &str) -> StrataResult<Snapshot> {
        paths::validate_name(tag)?;
        let lower = paths::rootfs(&self.roots_dir, tag);
        if !lower.is_dir() {
            return Err(StrataError::setup(
                format!("snapshot of {tag}"),
                format!("no root filesystem at {}", lower.display()),
            ));
        }

        let name = Self::snapshot_name(tag);
        let dir = paths::root_dir(&self.roots_dir, &name);
        let overlay = OverlayFs::for_snapshot(&dir, lower);

        if let Err(err) = overlay.mount() {
            if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(dir = %dir.display(), error = %cleanup, "Failed to remove snapshot dir");
            }
            return Err(err);
        }

        tracing::info!(tag, snapshot = %name, "Snapshot created");

        Ok(Snapshot::new(name, move || {
            overlay.unmount()?;
            std::fs::remove_dir_all(&dir)?;
            Ok(())
        }))
    }
}
