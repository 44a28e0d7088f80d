#![allow(unsafe_code)]
//! Chroot-based build session.

use std::collections::BTreeMap;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use strata_common::{StrataError, StrataResult, paths};

use super::{BuildSession, SessionProvider, StageOptions, StagedMount, Stdin};
use crate::config::BuildConfig;
use crate::dispatch::CommandLine;

/// Opens [`ChrootSession`]s over `<roots-dir>/<name>/rootfs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChrootProvider;

impl SessionProvider for ChrootProvider {
    fn open(&self, config: &BuildConfig, name: &str) -> StrataResult<Box<dyn BuildSession>> {
        let resource = format!("session {name}");
        paths::validate_name(name)?;

        if config.internal_namespace {
            return Err(StrataError::setup(
                resource,
                "already running inside a build session",
            ));
        }

        let rootfs = paths::rootfs(&config.roots_dir, name);
        if !rootfs.is_dir() {
            return Err(StrataError::setup(
                resource,
                format!("root filesystem {} does not exist", rootfs.display()),
            ));
        }

        Ok(Box::new(ChrootSession::new(
            name,
            rootfs,
            config.dispatch_timeout,
        )))
    }
}

/// A session that runs commands chrooted into a root filesystem with a
/// cleared environment.
#[derive(Debug)]
pub struct ChrootSession {
    name: String,
    rootfs: PathBuf,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
    closed: bool,
}

impl ChrootSession {
    /// Create a session over `rootfs`.
    pub fn new(name: impl Into<String>, rootfs: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            name: name.into(),
            rootfs: rootfs.into(),
            env: BTreeMap::new(),
            timeout,
            closed: false,
        }
    }

    /// Root filesystem on the host.
    #[must_use]
    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }
}

#[async_trait]
impl BuildSession for ChrootSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(
        &mut self,
        host: &Path,
        session_path: &Path,
        options: StageOptions,
    ) -> StrataResult<StagedMount> {
        StagedMount::bind(host, &self.rootfs, session_path, options)
    }

    fn set_env(&mut self, key: &str, value: &str) {
        self.env.insert(key.to_string(), value.to_string());
    }

    async fn dispatch(&mut self, command: &CommandLine, stdin: Stdin) -> StrataResult<()> {
        let rendered = command.to_string();

        let root = CString::new(self.rootfs.as_os_str().as_bytes())
            .map_err(|_| StrataError::config("root filesystem path contains a NUL byte"))?;

        let mut cmd = tokio::process::Command::new(command.program());
        cmd.args(command.args())
            .env_clear()
            .envs(&self.env)
            .stdin(match stdin {
                Stdin::Null => Stdio::null(),
                Stdin::Inherit => Stdio::inherit(),
            })
            .kill_on_drop(true);

        // SAFETY: the closure only issues chroot(2) and chdir(2) on data
        // prepared before fork.
        unsafe {
            cmd.pre_exec(move || {
                rustix::process::chroot(root.as_c_str())?;
                rustix::process::chdir(c"/")?;
                Ok(())
            });
        }

        tracing::info!(session = %self.name, command = %rendered, "Dispatching");

        let mut child = cmd.spawn().map_err(|e| StrataError::Dispatch {
            command: rendered.clone(),
            status: format!("spawn failed: {e}"),
        })?;
        wait_child(&mut child, &rendered, self.timeout).await?;

        tracing::debug!(session = %self.name, command = %rendered, "Command finished");
        Ok(())
    }

    fn close(&mut self) -> StrataResult<()> {
        if !self.closed {
            self.closed = true;
            tracing::debug!(session = %self.name, "Session closed");
        }
        Ok(())
    }
}

/// Wait for `child`, killing it once `timeout` elapses.
///
/// A killed child is reaped before [`StrataError::DispatchTimeout`] is
/// returned; a non-zero exit is a [`StrataError::Dispatch`].
pub(crate) async fn wait_child(
    child: &mut Child,
    rendered: &str,
    timeout: Option<Duration>,
) -> StrataResult<()> {
    let dispatch_err = |status: String| StrataError::Dispatch {
        command: rendered.to_string(),
        status,
    };

    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(waited) => waited,
            Err(_) => {
                // kill() also waits, so the child is reaped here.
                if let Err(err) = child.kill().await {
                    tracing::warn!(command = %rendered, error = %err, "Failed to kill timed out command");
                }
                return Err(StrataError::DispatchTimeout {
                    command: rendered.to_string(),
                    seconds: limit.as_secs(),
                });
            }
        },
        None => child.wait().await,
    };

    let status = waited.map_err(|e| dispatch_err(e.to_string()))?;
    if !status.success() {
        return Err(dispatch_err(status.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rootfs_is_setup_failure() {
        let temp = tempfile::tempdir().unwrap();
        let config = BuildConfig::default().with_root(temp.path());

        let err = ChrootProvider.open(&config, "absent").err().unwrap();
        assert!(matches!(err, StrataError::Setup { .. }));
    }

    #[test]
    fn nested_sessions_are_refused() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = BuildConfig::default().with_root(temp.path());
        std::fs::create_dir_all(paths::rootfs(&config.roots_dir, "base")).unwrap();

        assert!(ChrootProvider.open(&config, "base").is_ok());

        config.internal_namespace = true;
        assert!(ChrootProvider.open(&config, "base").is_err());
    }

    #[test]
    fn env_is_recorded() {
        let mut session = ChrootSession::new("base", "/roots/base/rootfs", None);
        session.set_env("PATH", "/usr/bin");
        assert_eq!(session.env.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert_eq!(session.rootfs(), Path::new("/roots/base/rootfs"));
        session.close().unwrap();
    }
    fn spawn(program: &str, args: &[&str]) -> Child {
        tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn timed_out_child_is_killed_and_reaped() {
        let mut child = spawn("sleep", &["5"]);
        let started = std::time::Instant::now();

        let err = wait_child(&mut child, "sleep 5", Some(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, StrataError::DispatchTimeout { ref command, .. } if command == "sleep 5"));
        assert!(started.elapsed() < Duration::from_secs(4));
        // A reaped child has no pid left and a cached exit status.
        assert!(child.id().is_none());
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn child_finishing_in_time() {
        let mut child = spawn("true", &[]);
        wait_child(&mut child, "true", Some(Duration::from_secs(30)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_is_dispatch_failure() {
        let mut child = spawn("false", &[]);
        let err = wait_child(&mut child, "false", None).await.unwrap_err();
        assert!(matches!(err, StrataError::Dispatch { .. }));
    }

    #[test]
    fn names_with_separators_are_refused() {
        let temp = tempfile::tempdir().unwrap();
        let config = BuildConfig::default().with_root(temp.path());
        std::fs::create_dir_all(temp.path().join("roots/rootfs")).unwrap();

        for name in ["../roots", "a/b:c", ".."] {
            let err = ChrootProvider.open(&config, name).err().unwrap();
            assert!(matches!(err, StrataError::Config { .. }), "{name}");
        }
    }
}
