//! Artifact injection through the trusted channel.
//!
//! A host directory is staged into a session at `/strata`, the strata binary
//! at `/static-strata`, and the copy plus any mode and ownership fix-ups are
//! performed by the staged binary. The session's own tools are never run.

use std::path::{Path, PathBuf};

use strata_common::{SessionPaths, StrataError, StrataResult};

use crate::builder::LayerBuilder;
use crate::dispatch::TrustedChannel;
use crate::session::{OpenSession, StageOptions, Stdin};

/// One file to copy between a session and a staged host directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRequest {
    /// File to copy, as seen from inside the session.
    pub source: PathBuf,
    /// Host directory staged at `/strata`; receives the file.
    pub target_dir: PathBuf,
    /// Permission bits applied after the copy.
    pub mode: Option<u32>,
    /// Owning user applied after the copy.
    pub uid: Option<u32>,
    /// Owning group; only applied together with `uid`.
    pub gid: Option<u32>,
}

impl InjectionRequest {
    /// Copy `source` into `target_dir` keeping its mode and ownership.
    pub fn new(source: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target_dir: target_dir.into(),
            mode: None,
            uid: None,
            gid: None,
        }
    }

    /// Apply `mode` to the copied file.
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Apply `uid` (and optionally `gid`) to the copied file.
    #[must_use]
    pub fn with_owner(mut self, uid: u32, gid: Option<u32>) -> Self {
        self.uid = Some(uid);
        self.gid = gid;
        self
    }

    fn file_name(&self) -> StrataResult<String> {
        self.source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StrataError::config(format!(
                    "injection source {} has no file name",
                    self.source.display()
                ))
            })
    }

    /// `uid` or `uid:gid`, when an owner was requested.
    #[must_use]
    pub fn owner_arg(&self) -> Option<String> {
        self.uid.map(|uid| match self.gid {
            Some(gid) => format!("{uid}:{gid}"),
            None => uid.to_string(),
        })
    }
}

impl LayerBuilder {
    /// Copy one file in session `session_name` into the request's target
    /// directory, then apply the requested mode and owner.
    ///
    /// Steps run in order (copy, mode, owner) and stop at the first failure.
    /// Staged mounts and the session are released on every path.
    ///
    /// # Errors
    ///
    /// Returns the first setup or dispatch failure.
    pub async fn inject(&self, session_name: &str, request: &InjectionRequest) -> StrataResult<()> {
        let file_name = request.file_name()?;
        let dest = SessionPaths::staged(&file_name);

        tracing::info!(
            session = %session_name,
            source = %request.source.display(),
            target = %request.target_dir.display(),
            "Injecting artifact"
        );

        let mut session = OpenSession::open(&*self.sessions, &self.config, session_name)?;

        let _target = session.stage(
            &request.target_dir,
            Path::new(SessionPaths::STAGING_DIR),
            StageOptions::default(),
        )?;

        let channel = TrustedChannel::stage(&mut *session, &*self.binary)?;

        let _setup = self
            .setup
            .configure_build(&self.config, &mut *session, session_name)?;

        let source = request.source.display().to_string();
        let copy = channel.internal(["cp", source.as_str(), dest.as_str()]);
        channel.dispatch(&mut *session, &copy, Stdin::Null).await?;

        if let Some(mode) = request.mode {
            let chmod = channel.internal(["chmod".to_string(), format!("{mode:o}"), dest.clone()]);
            channel.dispatch(&mut *session, &chmod, Stdin::Null).await?;
        }

        if let Some(owner) = request.owner_arg() {
            let chown = channel.internal(["chown".to_string(), owner, dest.clone()]);
            channel.dispatch(&mut *session, &chown, Stdin::Null).await?;
        }

        tracing::info!(session = %session_name, dest = %dest, "Artifact injected");
        Ok(())
    }
}
