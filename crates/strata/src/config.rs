//! Host configuration and its replay across the session boundary.
//!
//! A command re-executed inside a build session starts with an empty
//! environment, so everything it needs is carried as arguments. The flags
//! written by [`BuildConfig::replay_args`] are exactly the flags parsed by
//! [`GlobalArgs`], which keeps both sides of the boundary on one definition.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use strata_common::StrataPaths;

/// Storage backend used when none is configured.
pub const DEFAULT_STORAGE_TYPE: &str = "overlay";

/// Runtime configuration shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// OCI image layout directory.
    pub oci_dir: PathBuf,
    /// Directory of root filesystems and snapshots.
    pub roots_dir: PathBuf,
    /// Internal state directory.
    pub state_dir: PathBuf,
    /// Storage backend identifier.
    pub storage_type: String,
    /// Debug logging.
    pub debug: bool,
    /// Set when this process already runs inside a build session.
    pub internal_namespace: bool,
    /// Upper bound for a dispatched command; `None` waits indefinitely.
    pub dispatch_timeout: Option<Duration>,
    /// Statically linked strata binary staged into sessions; `None` stages
    /// the running executable.
    pub static_binary: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::from_paths(&StrataPaths::new())
    }
}

impl BuildConfig {
    fn from_paths(paths: &StrataPaths) -> Self {
        Self {
            oci_dir: paths.oci(),
            roots_dir: paths.roots(),
            state_dir: paths.state(),
            storage_type: DEFAULT_STORAGE_TYPE.to_string(),
            debug: false,
            internal_namespace: false,
            dispatch_timeout: None,
            static_binary: None,
        }
    }

    /// Place every directory under `root`.
    #[must_use]
    pub fn with_root(self, root: impl Into<PathBuf>) -> Self {
        Self {
            storage_type: self.storage_type,
            debug: self.debug,
            internal_namespace: self.internal_namespace,
            dispatch_timeout: self.dispatch_timeout,
            static_binary: self.static_binary,
            ..Self::from_paths(&StrataPaths::with_root(root))
        }
    }

    /// Enable debug logging.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Bound every dispatched command.
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    /// Stage `binary` instead of the running executable.
    #[must_use]
    pub fn with_static_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.static_binary = Some(binary.into());
        self
    }

    /// Arguments that rebuild this configuration inside a session.
    ///
    /// Host-only settings (dispatch timeout, static binary) are not replayed.
    ///
    /// The replayed process is always marked as running inside a session.
    #[must_use]
    pub fn replay_args(&self) -> Vec<String> {
        let mut args = vec![
            "--oci-dir".to_string(),
            self.oci_dir.display().to_string(),
            "--roots-dir".to_string(),
            self.roots_dir.display().to_string(),
            "--state-dir".to_string(),
            self.state_dir.display().to_string(),
            "--storage-type".to_string(),
            self.storage_type.clone(),
        ];
        if self.debug {
            args.push("--debug".to_string());
        }
        args.push("--internal-namespace".to_string());
        args
    }
}

/// Global command-line flags; the parsing side of [`BuildConfig::replay_args`].
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// OCI image layout directory
    #[arg(long, global = true, env = "STRATA_OCI_DIR")]
    pub oci_dir: Option<PathBuf>,

    /// Directory of root filesystems and snapshots
    #[arg(long, global = true, env = "STRATA_ROOTS_DIR")]
    pub roots_dir: Option<PathBuf>,

    /// Internal state directory
    #[arg(long, global = true, env = "STRATA_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Storage backend
    #[arg(long, global = true, env = "STRATA_STORAGE_TYPE", default_value = DEFAULT_STORAGE_TYPE)]
    pub storage_type: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Running inside a build session (set by strata itself)
    #[arg(long, global = true, hide = true)]
    pub internal_namespace: bool,

    /// Abort a command dispatched into a session after this many seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub dispatch_timeout: Option<u64>,

    /// Statically linked strata binary to stage into sessions
    #[arg(long, global = true, env = "STRATA_STATIC_BINARY", value_name = "PATH")]
    pub static_binary: Option<PathBuf>,
}

impl GlobalArgs {
    /// Resolve flags against the default paths.
    #[must_use]
    pub fn into_config(self) -> BuildConfig {
        let defaults = BuildConfig::default();
        BuildConfig {
            oci_dir: self.oci_dir.unwrap_or(defaults.oci_dir),
            roots_dir: self.roots_dir.unwrap_or(defaults.roots_dir),
            state_dir: self.state_dir.unwrap_or(defaults.state_dir),
            storage_type: self.storage_type,
            debug: self.debug,
            internal_namespace: self.internal_namespace,
            dispatch_timeout: self.dispatch_timeout.map(Duration::from_secs),
            static_binary: self.static_binary,
        }
    }
}
