//! Build sessions: isolated execution contexts bound to one root filesystem.
//!
//! This module defines the contract the injector and the provenance
//! generator consume:
//! - [`BuildSession`]: stage host paths, set environment, dispatch commands
//! - [`SessionProvider`]: open a session by name
//! - [`OpenSession`]: guard that closes a session exactly once
//!
//! [`ChrootProvider`] is the bundled implementation.

mod chroot;
mod mount;

use std::ops::{Deref, DerefMut};
use std::path::Path;

use async_trait::async_trait;
use strata_common::StrataResult;

use crate::config::BuildConfig;
use crate::dispatch::CommandLine;

pub use chroot::{ChrootProvider, ChrootSession};
pub use mount::{StagedMount, bind_mount, host_path, unmount};

/// How a host path is staged into a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOptions {
    /// Bind read-only.
    pub readonly: bool,
}

impl StageOptions {
    /// Read-only staging.
    #[must_use]
    pub const fn readonly() -> Self {
        Self { readonly: true }
    }
}

/// Input stream handed to a dispatched command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stdin {
    /// No input.
    #[default]
    Null,
    /// Forward the caller's standard input.
    Inherit,
}

/// An isolated execution context bound to one filesystem root.
#[async_trait]
pub trait BuildSession: Send {
    /// Name of the root the session is bound to.
    fn name(&self) -> &str;

    /// Bind `host` at `session_path` inside the session. The binding lives
    /// until the returned guard is released or dropped.
    fn stage(
        &mut self,
        host: &Path,
        session_path: &Path,
        options: StageOptions,
    ) -> StrataResult<StagedMount>;

    /// Set an environment variable for subsequently dispatched commands.
    fn set_env(&mut self, key: &str, value: &str);

    /// Run `command` inside the session and wait for it to finish.
    async fn dispatch(&mut self, command: &CommandLine, stdin: Stdin) -> StrataResult<()>;

    /// Tear the session down.
    fn close(&mut self) -> StrataResult<()>;
}

/// Opens build sessions by name.
pub trait SessionProvider: Send + Sync {
    /// Open a session bound to the root called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`strata_common::StrataError::Setup`] if the session cannot be
    /// created.
    fn open(&self, config: &BuildConfig, name: &str) -> StrataResult<Box<dyn BuildSession>>;
}

/// An open session that is closed exactly once, on [`OpenSession::close`]
/// or on drop.
pub struct OpenSession {
    session: Box<dyn BuildSession>,
    closed: bool,
}

impl OpenSession {
    /// Open `name` through `provider`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error.
    pub fn open(
        provider: &dyn SessionProvider,
        config: &BuildConfig,
        name: &str,
    ) -> StrataResult<Self> {
        let session = provider.open(config, name)?;
        tracing::debug!(session = %name, "Session opened");
        Ok(Self {
            session,
            closed: false,
        })
    }

    /// Close now and report the result.
    ///
    /// # Errors
    ///
    /// Returns the session's close error.
    pub fn close(mut self) -> StrataResult<()> {
        self.closed = true;
        self.session.close()
    }
}

impl Deref for OpenSession {
    type Target = dyn BuildSession;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl DerefMut for OpenSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl Drop for OpenSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.session.close() {
            tracing::warn!(session = %self.session.name(), error = %err, "Failed to close session");
        }
    }
}

impl std::fmt::Debug for OpenSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSession")
            .field("name", &self.session.name())
            .field("closed", &self.closed)
            .finish()
    }
}
