//! Build- and layer-specific session configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_common::StrataResult;

use crate::config::BuildConfig;
use crate::session::{BuildSession, StageOptions, StagedMount};

/// `PATH` given to every session.
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// A host path bound into a layer's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bind {
    /// Host path.
    pub source: PathBuf,
    /// Path inside the session.
    pub dest: PathBuf,
    /// Bind read-only.
    #[serde(default)]
    pub readonly: bool,
}

/// Already-resolved per-layer session configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerSpec {
    /// Environment variables set in the session.
    pub environment: BTreeMap<String, String>,
    /// Host paths bound into the session.
    pub binds: Vec<Bind>,
}

impl LayerSpec {
    /// Load a layer spec from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Configures a freshly opened session before any command is dispatched.
///
/// Returned mounts must be kept alive until the session's work is done.
pub trait SessionSetup: Send + Sync {
    /// Build-wide configuration.
    ///
    /// # Errors
    ///
    /// Returns any staging error.
    fn configure_build(
        &self,
        config: &BuildConfig,
        session: &mut dyn BuildSession,
        name: &str,
    ) -> StrataResult<Vec<StagedMount>>;

    /// Configuration specific to one layer.
    ///
    /// # Errors
    ///
    /// Returns any staging error.
    fn configure_layer(
        &self,
        config: &BuildConfig,
        session: &mut dyn BuildSession,
        layer: &LayerSpec,
        tag: &str,
    ) -> StrataResult<Vec<StagedMount>>;
}

/// Sets a sane environment and applies a layer's env and binds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSetup;

impl SessionSetup for DefaultSetup {
    fn configure_build(
        &self,
        config: &BuildConfig,
        session: &mut dyn BuildSession,
        name: &str,
    ) -> StrataResult<Vec<StagedMount>> {
        tracing::debug!(session = %name, debug = config.debug, "Configuring build session");

        session.set_env("PATH", DEFAULT_PATH);
        session.set_env("HOME", "/root");
        if config.debug {
            session.set_env("RUST_LOG", "strata=debug");
        }
        Ok(Vec::new())
    }

    fn configure_layer(
        &self,
        _config: &BuildConfig,
        session: &mut dyn BuildSession,
        layer: &LayerSpec,
        tag: &str,
    ) -> StrataResult<Vec<StagedMount>> {
        tracing::debug!(
            tag,
            env = layer.environment.len(),
            binds = layer.binds.len(),
            "Configuring layer session"
        );

        for (key, value) in &layer.environment {
            session.set_env(key, value);
        }

        // Already staged binds are released by drop if a later one fails.
        layer
            .binds
            .iter()
            .map(|bind| {
                session.stage(
                    &bind.source,
                    &bind.dest,
                    StageOptions {
                        readonly: bind.readonly,
                    },
                )
            })
            .collect()
    }
}
