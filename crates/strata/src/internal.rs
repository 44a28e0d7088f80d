//! Commands run by the trusted binary inside a build session.
//!
//! These are reachable as `strata internal <command>` and are only meant
//! to be issued through [`crate::dispatch::TrustedChannel`].

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use strata_common::{SessionPaths, StrataError, StrataResult};

use crate::bom::generate_bom;
use crate::inventory::generate_fs_inventory;

/// Highest accepted permission value (setuid, setgid, sticky, rwx).
const MAX_MODE: u32 = 0o7777;

/// In-session commands.
#[derive(Debug, Clone, Subcommand)]
pub enum InternalCommand {
    /// Copy a regular file
    Cp {
        /// Source file
        src: PathBuf,
        /// Destination file
        dst: PathBuf,
    },

    /// Set permission bits on a file
    Chmod {
        /// Octal mode, e.g. 644 or 0o755
        mode: String,
        /// Target file
        path: PathBuf,
    },

    /// Change file ownership
    Chown {
        /// Numeric uid or uid:gid
        owner: String,
        /// Target file
        path: PathBuf,
    },

    /// Write an SPDX document for a directory
    Bom {
        /// Directory to scan
        root: PathBuf,
        /// Output file
        output: PathBuf,
    },

    /// Write a content inventory of a tree
    Inventory {
        /// Directory to walk
        root: PathBuf,
        /// Output file
        #[arg(default_value = SessionPaths::INVENTORY)]
        output: PathBuf,
    },
}

impl InternalCommand {
    /// Run the command in the current process.
    ///
    /// # Errors
    ///
    /// Returns the failing operation's error.
    pub fn run(&self) -> StrataResult<()> {
        tracing::debug!(command = ?self, "Running internal command");

        match self {
            Self::Cp { src, dst } => copy_file(src, dst),
            Self::Chmod { mode, path } => chmod(path, parse_mode(mode)?),
            Self::Chown { owner, path } => {
                let (uid, gid) = parse_owner(owner)?;
                chown(path, uid, gid)
            }
            Self::Bom { root, output } => generate_bom(root, output),
            Self::Inventory { root, output } => generate_fs_inventory(root, output).map(drop),
        }
    }
}

/// Copy the content of `src` to `dst`, creating or truncating `dst`.
///
/// # Errors
///
/// Returns [`StrataError::Io`] on failure.
pub fn copy_file(src: &Path, dst: &Path) -> StrataResult<()> {
    let bytes = fs::copy(src, dst)?;
    tracing::debug!(src = %src.display(), dst = %dst.display(), bytes, "Copied");
    Ok(())
}

/// Parse an octal permission string. A leading `0o` is accepted.
///
/// # Errors
///
/// Returns [`StrataError::InvalidMode`] for non-octal input or values
/// above `0o7777`.
pub fn parse_mode(value: &str) -> StrataResult<u32> {
    let invalid = || StrataError::InvalidMode {
        value: value.to_string(),
    };

    let digits = value.strip_prefix("0o").unwrap_or(value);
    if digits.is_empty() {
        return Err(invalid());
    }

    let mode = u32::from_str_radix(digits, 8).map_err(|_| invalid())?;
    if mode > MAX_MODE {
        return Err(invalid());
    }
    Ok(mode)
}

/// Set the permission bits of `path`.
///
/// # Errors
///
/// Returns [`StrataError::Io`] on failure.
pub fn chmod(path: &Path, mode: u32) -> StrataResult<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Parse `uid` or `uid:gid`.
///
/// # Errors
///
/// Returns [`StrataError::InvalidOwner`] if either part is not numeric.
pub fn parse_owner(value: &str) -> StrataResult<(u32, Option<u32>)> {
    let invalid = || StrataError::InvalidOwner {
        value: value.to_string(),
    };

    let (uid, gid) = match value.split_once(':') {
        Some((uid, gid)) => (uid, Some(gid)),
        None => (value, None),
    };

    let uid = uid.parse().map_err(|_| invalid())?;
    let gid = gid.map(str::parse).transpose().map_err(|_| invalid())?;
    Ok((uid, gid))
}

/// Change the owner of `path`; the group is kept when `gid` is `None`.
///
/// # Errors
///
/// Returns [`StrataError::Io`] on failure.
pub fn chown(path: &Path, uid: u32, gid: Option<u32>) -> StrataResult<()> {
    std::os::unix::fs::chown(path, Some(uid), gid)?;
    Ok(())
}
