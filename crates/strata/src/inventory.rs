//! Content-hashed inventory of a filesystem tree.
//!
//! The inventory lists every non-directory entry under a root together with
//! its size, permission bits, and (for regular files) a SHA-256 checksum.
//! Pseudo-filesystems are pruned so that the result only depends on the
//! layer's real content.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_common::{StrataError, StrataResult};
use walkdir::WalkDir;

/// Directories under the scanned root that are never descended into.
pub const VIRTUAL_ROOTS: &[&str] = &["proc", "sys", "dev"];

/// One non-directory entry of an [`Inventory`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Path relative to the scanned root, rendered absolute.
    pub path: String,
    /// Size in bytes as reported by `lstat`.
    pub size: u64,
    /// `sha256:<hex>` for regular files, empty otherwise.
    pub checksum: String,
    /// Permission bits as zero-padded octal, e.g. `0644`.
    pub mode: String,
}

/// Ordered inventory of a tree; order is traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Recorded entries.
    pub entries: Vec<InventoryEntry>,
}

impl Inventory {
    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its rooted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&InventoryEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Write the inventory as JSON to `dest` with mode 0640.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Serialization`] if encoding or writing fails.
    pub fn write(&self, dest: &Path) -> StrataResult<()> {
        let content = serde_json::to_vec(self)?;

        let write = || -> io::Result<()> {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(dest, &content)?;
            fs::set_permissions(dest, fs::Permissions::from_mode(0o640))
        };

        write().map_err(|e| {
            StrataError::Serialization(format!("writing inventory {}: {e}", dest.display()))
        })
    }
}

/// Walk `root` and build its inventory.
///
/// Unreadable entries are skipped; a failure while reading a regular file
/// for its checksum aborts the whole build.
///
/// # Errors
///
/// Returns [`StrataError::Io`] if `root` itself cannot be inspected and
/// [`StrataError::Checksum`] if hashing a regular file fails.
pub fn build_inventory(root: &Path) -> StrataResult<Inventory> {
    fs::metadata(root)?;

    let excluded: Vec<PathBuf> = VIRTUAL_ROOTS.iter().map(|d| root.join(d)).collect();
    let mut entries = Vec::new();

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "Skipping unreadable entry");
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if excluded.iter().any(|p| p == entry.path()) {
                tracing::debug!(path = %entry.path().display(), "Pruning virtual filesystem");
                walker.skip_current_dir();
            }
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!(path = %entry.path().display(), error = %err, "Skipping entry");
                continue;
            }
        };

        let checksum = if file_type.is_file() {
            sha256_file(entry.path())?
        } else {
            String::new()
        };

        entries.push(InventoryEntry {
            path: rooted_path(root, entry.path()),
            size: metadata.len(),
            checksum,
            mode: mode_string(metadata.permissions().mode()),
        });
    }

    Ok(Inventory { entries })
}

/// Build the inventory of `root` and write it to `dest`.
///
/// # Errors
///
/// Propagates the errors of [`build_inventory`] and [`Inventory::write`].
pub fn generate_fs_inventory(root: &Path, dest: &Path) -> StrataResult<Inventory> {
    let inventory = build_inventory(root)?;
    inventory.write(dest)?;

    tracing::info!(
        root = %root.display(),
        dest = %dest.display(),
        entries = inventory.len(),
        "Inventory written"
    );
    Ok(inventory)
}

/// Stream a file through SHA-256, returning `sha256:<hex>`.
///
/// # Errors
///
/// Returns [`StrataError::Checksum`] if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> StrataResult<String> {
    Ok(format!("sha256:{}", sha256_hex(path)?))
}

/// Hex SHA-256 digest of a file's content.
///
/// # Errors
///
/// Returns [`StrataError::Checksum`] if the file cannot be opened or read.
pub fn sha256_hex(path: &Path) -> StrataResult<String> {
    let checksum_err = |source| StrataError::Checksum {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(checksum_err)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(checksum_err)?;

    Ok(hex::encode(hasher.finalize()))
}

/// Render permission bits (including setuid, setgid and sticky) as `0NNN`.
#[must_use]
pub fn mode_string(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

fn rooted_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    format!("/{}", relative.display())
}
