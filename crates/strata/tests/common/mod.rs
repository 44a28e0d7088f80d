//! Session and storage doubles shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use parking_lot::Mutex;
use strata::cli::{Cli, Commands};
use strata::config::BuildConfig;
use strata::dispatch::{CommandLine, ExecutableSource};
use strata::internal::InternalCommand;
use strata::session::{BuildSession, SessionProvider, StageOptions, StagedMount, Stdin, host_path};
use strata::storage::{Snapshot, Storage};
use strata_common::{StrataError, StrataResult};

/// Something a double observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(String),
    Stage { path: String, readonly: bool },
    Unstage(String),
    Dispatch { argv: Vec<String>, stdin: Stdin },
    Close(String),
    Snapshot(String),
    ReleaseSnapshot(String),
}

/// Shared event log plus failure injection.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    fail_dispatch: Arc<Mutex<Option<String>>>,
    fail_stage: Arc<Mutex<Option<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any dispatch whose internal command is `word`.
    pub fn fail_dispatch_of(&self, word: &str) {
        *self.fail_dispatch.lock() = Some(word.to_string());
    }

    /// Fail staging at `session_path`.
    pub fn fail_stage_at(&self, session_path: &str) {
        *self.fail_stage.lock() = Some(session_path.to_string());
    }

    pub fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn dispatched(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Dispatch { argv, .. } => Some(argv),
                _ => None,
            })
            .collect()
    }

    /// The internal command word of every dispatch, e.g. `cp`.
    pub fn dispatched_commands(&self) -> Vec<String> {
        self.dispatched()
            .iter()
            .filter_map(|argv| {
                let at = argv.iter().position(|a| a == "internal")?;
                argv.get(at + 1).cloned()
            })
            .collect()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.events().iter().filter(|e| *e == wanted).count()
    }

    /// Position of the first occurrence of `wanted`.
    pub fn position(&self, wanted: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == wanted)
    }
}

/// Opens [`RecordingSession`]s.
#[derive(Debug, Clone)]
pub struct RecordingProvider(pub Recorder);

impl SessionProvider for RecordingProvider {
    fn open(&self, _config: &BuildConfig, name: &str) -> StrataResult<Box<dyn BuildSession>> {
        self.0.record(Event::Open(name.to_string()));
        Ok(Box::new(RecordingSession {
            name: name.to_string(),
            recorder: self.0.clone(),
        }))
    }
}

/// A session that records calls instead of isolating anything.
#[derive(Debug)]
pub struct RecordingSession {
    name: String,
    recorder: Recorder,
}

#[async_trait]
impl BuildSession for RecordingSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(
        &mut self,
        _host: &Path,
        session_path: &Path,
        options: StageOptions,
    ) -> StrataResult<StagedMount> {
        let path = session_path.display().to_string();
        if self.recorder.fail_stage.lock().as_deref() == Some(path.as_str()) {
            return Err(StrataError::setup(format!("mount {path}"), "injected failure"));
        }

        self.recorder.record(Event::Stage {
            path: path.clone(),
            readonly: options.readonly,
        });
        let recorder = self.recorder.clone();
        Ok(StagedMount::new(session_path, move || {
            recorder.record(Event::Unstage(path));
            Ok(())
        }))
    }

    fn set_env(&mut self, _key: &str, _value: &str) {}

    async fn dispatch(&mut self, command: &CommandLine, stdin: Stdin) -> StrataResult<()> {
        self.recorder.record(Event::Dispatch {
            argv: command.argv().to_vec(),
            stdin,
        });

        let failing = self.recorder.fail_dispatch.lock().clone();
        if let Some(word) = failing {
            if command.args().iter().any(|a| *a == word) {
                return Err(StrataError::Dispatch {
                    command: command.to_string(),
                    status: "exit status: 1".to_string(),
                });
            }
        }
        Ok(())
    }

    fn close(&mut self) -> StrataResult<()> {
        self.recorder.record(Event::Close(self.name.clone()));
        Ok(())
    }
}

/// Hands out snapshots named `<tag>-snap`.
#[derive(Debug, Clone)]
pub struct RecordingStorage(pub Recorder);

impl Storage for RecordingStorage {
    fn temporary_writable_snapshot(&self, tag: &str) -> StrataResult<Snapshot> {
        let name = format!("{tag}-snap");
        self.0.record(Event::Snapshot(name.clone()));
        let recorder = self.0.clone();
        let released = name.clone();
        Ok(Snapshot::new(name, move || {
            recorder.record(Event::ReleaseSnapshot(released));
            Ok(())
        }))
    }
}

/// Snapshots are fresh directories `<root>/<tag>-snap`, deleted on release
/// along with anything a session wrote into them.
#[derive(Debug, Clone)]
pub struct DisposableStorage {
    pub root: PathBuf,
    pub recorder: Recorder,
}

impl Storage for DisposableStorage {
    fn temporary_writable_snapshot(&self, tag: &str) -> StrataResult<Snapshot> {
        let name = format!("{tag}-snap");
        let dir = self.root.join(&name);
        std::fs::create_dir_all(dir.join("usr/lib"))?;
        self.recorder.record(Event::Snapshot(name.clone()));

        let recorder = self.recorder.clone();
        let released = name.clone();
        Ok(Snapshot::new(name, move || {
            std::fs::remove_dir_all(&dir)?;
            recorder.record(Event::ReleaseSnapshot(released));
            Ok(())
        }))
    }
}

/// Storage that cannot produce snapshots.
#[derive(Debug, Clone, Copy)]
pub struct BrokenStorage;

impl Storage for BrokenStorage {
    fn temporary_writable_snapshot(&self, tag: &str) -> StrataResult<Snapshot> {
        Err(StrataError::setup(format!("snapshot of {tag}"), "no space left on device"))
    }
}

/// A binary path that is never executed.
#[derive(Debug, Clone, Copy)]
pub struct StubBinary;

impl ExecutableSource for StubBinary {
    fn resolve(&self) -> StrataResult<PathBuf> {
        Ok(PathBuf::from("/usr/local/bin/strata"))
    }
}

/// Opens [`LocalSession`]s over `<root>/<name>`.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    pub root: PathBuf,
}

impl SessionProvider for LocalProvider {
    fn open(&self, _config: &BuildConfig, name: &str) -> StrataResult<Box<dyn BuildSession>> {
        let rootfs = self.root.join(name);
        if !rootfs.is_dir() {
            return Err(StrataError::setup(format!("session {name}"), "no rootfs"));
        }
        Ok(Box::new(LocalSession { name: name.to_string(), rootfs }))
    }
}

/// Emulates a session without privileges: staging is a symlink inside the
/// rootfs and internal commands run in-process with paths resolved against
/// the rootfs.
#[derive(Debug)]
pub struct LocalSession {
    name: String,
    rootfs: PathBuf,
}

impl LocalSession {
    fn resolve(&self, path: &Path) -> PathBuf {
        host_path(&self.rootfs, path)
    }
}

#[async_trait]
impl BuildSession for LocalSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(
        &mut self,
        host: &Path,
        session_path: &Path,
        _options: StageOptions,
    ) -> StrataResult<StagedMount> {
        let link = self.resolve(session_path);
        if let Some(parent) = link.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::os::unix::fs::symlink(host, &link)?;
        Ok(StagedMount::new(session_path, move || {
            std::fs::remove_file(&link)?;
            Ok(())
        }))
    }

    fn set_env(&mut self, _key: &str, _value: &str) {}

    async fn dispatch(&mut self, command: &CommandLine, _stdin: Stdin) -> StrataResult<()> {
        if self.resolve(Path::new(command.program())).symlink_metadata().is_err() {
            return Err(StrataError::Dispatch {
                command: command.to_string(),
                status: "trusted binary not staged".to_string(),
            });
        }

        let cli = Cli::try_parse_from(command.argv()).map_err(|e| StrataError::Dispatch {
            command: command.to_string(),
            status: e.to_string(),
        })?;
        let Commands::Internal { command: internal } = cli.command else {
            return Err(StrataError::config("only internal commands run in sessions"));
        };

        let rebased = match internal {
            InternalCommand::Cp { src, dst } => InternalCommand::Cp {
                src: self.resolve(&src),
                dst: self.resolve(&dst),
            },
            InternalCommand::Chmod { mode, path } => InternalCommand::Chmod {
                mode,
                path: self.resolve(&path),
            },
            InternalCommand::Chown { owner, path } => InternalCommand::Chown {
                owner,
                path: self.resolve(&path),
            },
            InternalCommand::Bom { root, output } => InternalCommand::Bom {
                root: self.resolve(&root),
                output: self.resolve(&output),
            },
            InternalCommand::Inventory { root, output } => InternalCommand::Inventory {
                root: self.resolve(&root),
                output: self.resolve(&output),
            },
        };
        rebased.run()
    }

    fn close(&mut self) -> StrataResult<()> {
        Ok(())
    }
}
