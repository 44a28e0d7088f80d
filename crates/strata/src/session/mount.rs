//! Bind mounts that stage host paths into a session's root.

use std::fs;
use std::path::{Path, PathBuf};

use strata_common::{StrataError, StrataResult};

use super::StageOptions;
use crate::guard::Release;

/// A host path bound into a session, released exactly once.
///
/// Dropping the guard releases the binding; [`StagedMount::release`] does
/// the same but hands the teardown result back to the caller.
#[derive(Debug)]
pub struct StagedMount {
    session_path: PathBuf,
    release: Release,
}

impl StagedMount {
    /// Wrap a binding at `session_path` with its teardown.
    pub fn new(
        session_path: impl Into<PathBuf>,
        release: impl FnOnce() -> StrataResult<()> + Send + 'static,
    ) -> Self {
        let session_path = session_path.into();
        let release = Release::new(format!("mount {}", session_path.display()), release);
        Self {
            session_path,
            release,
        }
    }

    /// Bind `source` onto `session_path` inside `rootfs`.
    ///
    /// The mountpoint is created when missing (a directory for directory
    /// sources, an empty file otherwise) and removed again on release.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Setup`] if the mountpoint cannot be created or
    /// the bind mount fails.
    pub fn bind(
        source: &Path,
        rootfs: &Path,
        session_path: &Path,
        options: StageOptions,
    ) -> StrataResult<Self> {
        let resource = format!("mount {}", session_path.display());
        let target = host_path(rootfs, session_path);

        let created = create_mountpoint(source, &target)
            .map_err(|e| StrataError::setup(resource.as_str(), e))?;

        if let Err(err) = bind_mount(source, &target, options.readonly) {
            if created {
                remove_mountpoint(&target);
            }
            return Err(err);
        }

        Ok(Self::new(session_path, move || {
            unmount(&target)?;
            if created {
                remove_mountpoint(&target);
            }
            Ok(())
        }))
    }

    /// Path of the binding inside the session.
    #[must_use]
    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Release the binding now and report the teardown result.
    ///
    /// # Errors
    ///
    /// Returns the teardown error, if any.
    pub fn release(mut self) -> StrataResult<()> {
        self.release.run()
    }
}

/// Host location of `session_path` inside `rootfs`.
#[must_use]
pub fn host_path(rootfs: &Path, session_path: &Path) -> PathBuf {
    rootfs.join(session_path.strip_prefix("/").unwrap_or(session_path))
}

fn create_mountpoint(source: &Path, target: &Path) -> std::io::Result<bool> {
    if target.symlink_metadata().is_ok() {
        return Ok(false);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if source.is_dir() {
        fs::create_dir(target)?;
    } else {
        fs::File::create(target)?;
    }
    Ok(true)
}

fn remove_mountpoint(target: &Path) {
    let removed = if target.is_dir() {
        fs::remove_dir(target)
    } else {
        fs::remove_file(target)
    };
    if let Err(err) = removed {
        tracing::warn!(target = %target.display(), error = %err, "Failed to remove mountpoint");
    }
}

/// Bind mount `source` onto `target`, optionally read-only.
#[cfg(target_os = "linux")]
pub fn bind_mount(source: &Path, target: &Path, readonly: bool) -> StrataResult<()> {
    use rustix::mount::{MountFlags, mount_bind, mount_remount};

    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        readonly,
        "Creating bind mount"
    );

    let resource = || format!("bind mount {}", target.display());

    mount_bind(source, target).map_err(|e| StrataError::setup(resource(), e))?;

    if readonly {
        if let Err(err) = mount_remount(target, MountFlags::BIND | MountFlags::RDONLY, "") {
            if let Err(undo) = unmount(target) {
                tracing::warn!(error = %undo, "Failed to undo bind mount");
            }
            return Err(StrataError::setup(resource(), err));
        }
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn bind_mount(_source: &Path, _target: &Path, _readonly: bool) -> StrataResult<()> {
    Err(StrataError::Unsupported {
        feature: "bind mounts".to_string(),
    })
}

/// Detach the mount at `target`.
#[cfg(target_os = "linux")]
pub fn unmount(target: &Path) -> StrataResult<()> {
    use rustix::mount::{UnmountFlags, unmount};

    tracing::debug!(target = %target.display(), "Unmounting");

    unmount(target, UnmountFlags::DETACH)
        .map_err(|e| StrataError::Io(e.into()))
}

#[cfg(not(target_os = "linux"))]
pub fn unmount(_target: &Path) -> StrataResult<()> {
    Err(StrataError::Unsupported {
        feature: "unmount".to_string(),
    })
}
