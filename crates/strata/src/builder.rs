//! The collaborators a layer operation runs against.

use strata_common::StrataResult;

use crate::config::BuildConfig;
use crate::dispatch::{ExecutableSource, FixedExecutable, SelfExe};
use crate::session::{ChrootProvider, SessionProvider};
use crate::setup::{DefaultSetup, SessionSetup};
use crate::storage::{Storage, open_storage};

/// Runs injection and provenance steps for one layer at a time.
///
/// The injector lives in [`crate::inject`] and the provenance generator in
/// [`crate::provenance`]; both borrow their collaborators from here.
pub struct LayerBuilder {
    pub(crate) config: BuildConfig,
    pub(crate) sessions: Box<dyn SessionProvider>,
    pub(crate) storage: Box<dyn Storage>,
    pub(crate) setup: Box<dyn SessionSetup>,
    pub(crate) binary: Box<dyn ExecutableSource>,
}

impl LayerBuilder {
    /// Builder over chroot sessions, the configured storage backend and the
    /// default session setup.
    ///
    /// The trusted binary is `config.static_binary` when set, otherwise the
    /// running executable. Sessions run arbitrary layer roots, so the staged
    /// binary has to be statically linked.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown storage backend.
    pub fn new(config: BuildConfig) -> StrataResult<Self> {
        let storage = open_storage(&config)?;
        let binary: Box<dyn ExecutableSource> = match &config.static_binary {
            Some(path) => Box::new(FixedExecutable(path.clone())),
            None => Box::new(SelfExe),
        };
        Ok(Self {
            config,
            sessions: Box::new(ChrootProvider),
            storage,
            setup: Box::new(DefaultSetup),
            binary,
        })
    }

    /// Builder with explicit collaborators.
    pub fn with_parts(
        config: BuildConfig,
        sessions: impl SessionProvider + 'static,
        storage: impl Storage + 'static,
    ) -> Self {
        Self {
            config,
            sessions: Box::new(sessions),
            storage: Box::new(storage),
            setup: Box::new(DefaultSetup),
            binary: Box::new(SelfExe),
        }
    }

    /// Replace the session setup.
    #[must_use]
    pub fn with_setup(mut self, setup: impl SessionSetup + 'static) -> Self {
        self.setup = Box::new(setup);
        self
    }

    /// Replace the source of the trusted binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl ExecutableSource + 'static) -> Self {
        self.binary = Box::new(binary);
        self
    }

    /// The configuration operations run with.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }
}

impl std::fmt::Debug for LayerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
