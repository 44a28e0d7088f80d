//! Copy-on-write snapshot storage.

mod overlay;

use strata_common::{StrataError, StrataResult};

use crate::config::BuildConfig;
use crate::guard::Release;

pub use overlay::{OverlayFs, OverlayStorage};

/// Produces writable snapshots of tagged root filesystems.
pub trait Storage: Send + Sync {
    /// Create a writable snapshot of `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Setup`] if the snapshot cannot be created.
    fn temporary_writable_snapshot(&self, tag: &str) -> StrataResult<Snapshot>;
}

/// A named snapshot whose cleanup runs exactly once.
#[derive(Debug)]
pub struct Snapshot {
    name: String,
    release: Release,
}

impl Snapshot {
    /// Wrap snapshot `name` with its cleanup.
    pub fn new(
        name: impl Into<String>,
        release: impl FnOnce() -> StrataResult<()> + Send + 'static,
    ) -> Self {
        let name = name.into();
        let release = Release::new(format!("snapshot {name}"), release);
        Self { name, release }
    }

    /// Name a session can be opened against.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clean the snapshot up now and report the result.
    ///
    /// # Errors
    ///
    /// Returns the cleanup error, if any.
    pub fn release(mut self) -> StrataResult<()> {
        self.release.run()
    }
}

/// Open the storage backend named by `config.storage_type`.
///
/// # Errors
///
/// Returns [`StrataError::Config`] for an unknown backend.
pub fn open_storage(config: &BuildConfig) -> StrataResult<Box<dyn Storage>> {
    match config.storage_type.as_str() {
        "overlay" => Ok(Box::new(OverlayStorage::new(&config.roots_dir))),
        other => Err(StrataError::config(format!("unknown storage type '{other}'"))),
    }
}
