//! Trusted command channel into build sessions.
//!
//! Nothing that already exists inside a session's root is trusted to run
//! privileged or ownership-changing work. Instead the running strata binary
//! is staged read-only at a fixed path and every command is issued through
//! it. [`TrustedChannel`] is the only way to build a [`CommandLine`], so a
//! dispatched command always starts with the staged binary.

use std::fmt;
use std::path::{Path, PathBuf};

use strata_common::{SessionPaths, StrataError, StrataResult};

use crate::config::BuildConfig;
use crate::session::{BuildSession, StageOptions, StagedMount, Stdin};

/// Supplies the host path of the executable staged into sessions.
pub trait ExecutableSource: Send + Sync {
    /// Resolve the executable's host path.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Setup`] if the path cannot be determined.
    fn resolve(&self) -> StrataResult<PathBuf>;
}

/// The currently running binary, via `/proc/self/exe`.
///
/// Only suitable when strata itself is built statically (for example for a
/// `*-linux-musl` target); a dynamically linked binary cannot find its
/// loader inside an arbitrary layer root.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfExe;

impl ExecutableSource for SelfExe {
    fn resolve(&self) -> StrataResult<PathBuf> {
        std::fs::read_link("/proc/self/exe")
            .map_err(|e| StrataError::setup("trusted binary", format!("couldn't find executable: {e}")))
    }
}

/// A fixed executable path, for packaged static builds (`--static-binary`).
#[derive(Debug, Clone)]
pub struct FixedExecutable(pub PathBuf);

impl ExecutableSource for FixedExecutable {
    fn resolve(&self) -> StrataResult<PathBuf> {
        if self.0.is_file() {
            Ok(self.0.clone())
        } else {
            Err(StrataError::setup(
                "trusted binary",
                format!("{} is not a file", self.0.display()),
            ))
        }
    }
}

/// A command line whose program is the staged trusted binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    /// Program to execute (the trusted binary's session path).
    #[must_use]
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments after the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// The full argument vector.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// The trusted binary staged into one session.
#[derive(Debug)]
pub struct TrustedChannel {
    mount: StagedMount,
}

impl TrustedChannel {
    /// Stage the executable from `source` at [`SessionPaths::TRUSTED_BINARY`].
    ///
    /// # Errors
    ///
    /// Returns the resolution or staging error.
    pub fn stage(
        session: &mut dyn BuildSession,
        source: &dyn ExecutableSource,
    ) -> StrataResult<Self> {
        let binary = source.resolve()?;
        let mount = session.stage(
            &binary,
            Path::new(SessionPaths::TRUSTED_BINARY),
            StageOptions::readonly(),
        )?;

        tracing::debug!(
            session = %session.name(),
            binary = %binary.display(),
            "Trusted binary staged"
        );
        Ok(Self { mount })
    }

    fn command<I, S>(&self, prefix: Vec<String>, args: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![self.mount.session_path().display().to_string()];
        argv.extend(prefix);
        argv.push("internal".to_string());
        argv.extend(args.into_iter().map(Into::into));
        CommandLine { argv }
    }

    /// `<binary> internal <args...>`
    pub fn internal<I, S>(&self, args: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(Vec::new(), args)
    }

    /// `<binary> <replayed config> internal <args...>`
    pub fn replay<I, S>(&self, config: &BuildConfig, args: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(config.replay_args(), args)
    }

    /// Dispatch `command` into `session` and wait for it.
    ///
    /// # Errors
    ///
    /// Returns the session's dispatch error.
    pub async fn dispatch(
        &self,
        session: &mut dyn BuildSession,
        command: &CommandLine,
        stdin: Stdin,
    ) -> StrataResult<()> {
        session.dispatch(command, stdin).await
    }
}
