//! Runtime facade: one supervised Envoy process from launch to archive.
//!
//! ```ignore
//! let runtime = Arc::new(Runtime::new(options, store));
//! let run = tokio::spawn({
//!     let runtime = Arc::clone(&runtime);
//!     async move { runtime.run(&key, &args).await }
//! });
//! if runtime.wait(Status::Ready).await == Status::Ready {
//!     runtime.send_signal(Signal::SIGINT).await?;
//! }
//! runtime.wait(Status::Terminated).await;
//! let report = run.await??;
//! ```

use crate::archive::Archiver;
use crate::collector::DebugCollector;
use crate::error::{ArchiveError, Result, RuntimeError, SignalError};
use crate::launcher::{deliver_signal, ProcessLauncher};
use crate::obs;
use crate::options::RunOptions;
use crate::poller::AdminPoller;
use crate::status::{Status, StatusTracker};
use binary_store::BinaryStore;
use envoy_manifest::VersionKey;
use nix::sys::signal::Signal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn, Instrument};

/// Subdirectory of the working directory holding debug output.
pub const DEBUG_DIR: &str = "debug";

/// What happened to the working directory after termination.
#[derive(Debug)]
pub enum ArchiveOutcome {
    /// Archiving was disabled.
    Skipped,
    Written(PathBuf),
    Failed(ArchiveError),
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub pid: u32,
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Terminating signal number, if any.
    pub signal: Option<i32>,
    pub reached_ready: bool,
    pub archive: ArchiveOutcome,
}

impl RunReport {
    /// The process exited on its own with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

struct SignalRequest {
    signal: Signal,
    reply: oneshot::Sender<std::result::Result<(), SignalError>>,
}

/// Supervises exactly one child process.
///
/// Share it behind an `Arc`: one task drives [`Runtime::run`] while others
/// call [`Runtime::wait`] and [`Runtime::send_signal`].
pub struct Runtime {
    run_id: String,
    options: RunOptions,
    store: Arc<dyn BinaryStore>,
    tracker: Arc<StatusTracker>,
    // Set by `run` when admin collection is enabled.
    collector: OnceLock<Arc<DebugCollector>>,
    archiver: Arc<Archiver>,
    started: AtomicBool,
    signals: OnceLock<mpsc::Sender<SignalRequest>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("run_id", &self.run_id)
            .field("working_dir", &self.options.working_dir)
            .field("status", &self.status())
            .finish()
    }
}

impl Runtime {
    pub fn new(options: RunOptions, store: Arc<dyn BinaryStore>) -> Self {
        let archiver = Arc::new(Archiver::new(&options.working_dir));

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            options,
            store,
            tracker: Arc::new(StatusTracker::new()),
            collector: OnceLock::new(),
            archiver,
            started: AtomicBool::new(false),
            signals: OnceLock::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Directory holding this run's diagnostic snapshots. Created on first
    /// write.
    pub fn debug_store(&self) -> PathBuf {
        self.options.working_dir.join(DEBUG_DIR)
    }

    /// Current status, `None` before the process is launched.
    pub fn status(&self) -> Option<Status> {
        self.tracker.current()
    }

    /// Block until the status is at least `target`; returns the status seen.
    ///
    /// A process that dies before becoming ready releases `wait(Ready)` with
    /// `Status::Terminated`.
    pub async fn wait(&self, target: Status) -> Status {
        self.tracker.wait(target).await
    }

    pub fn already_downloaded(&self, key: &VersionKey) -> bool {
        self.store.already_downloaded(key)
    }

    pub async fn fetch(&self, key: &VersionKey, location: &str) -> Result<()> {
        Ok(self.store.fetch(key, location).await?)
    }

    /// Resolve `key` against the manifest and fetch it unless cached.
    pub async fn ensure_downloaded(&self, key: &VersionKey, manifest_url: &str) -> Result<()> {
        if self.already_downloaded(key) {
            return Ok(());
        }
        let location = envoy_manifest::locate(key, manifest_url).await?;
        self.fetch(key, &location).await
    }

    /// Forward `signal` to the child.
    ///
    /// With admin collection enabled, SIGINT and SIGTERM sent to a ready
    /// process first take one last snapshot pass.
    pub async fn send_signal(&self, signal: Signal) -> std::result::Result<(), SignalError> {
        let tx = self.signals.get().ok_or(SignalError::NotStarted)?;
        if self.status() >= Some(Status::Terminated) {
            return Err(SignalError::NotRunning);
        }

        let terminating = matches!(signal, Signal::SIGINT | Signal::SIGTERM);
        if let (true, Some(collector)) = (terminating, self.collector.get()) {
            if self.status() == Some(Status::Ready) {
                // Skipped if the run already closed the collector.
                collector.collect().await;
            }
        }

        let (reply, response) = oneshot::channel();
        tx.send(SignalRequest { signal, reply })
            .await
            .map_err(|_| SignalError::NotRunning)?;
        response.await.map_err(|_| SignalError::NotRunning)?
    }

    /// Launch envoy with `args` and supervise it until it exits.
    ///
    /// Launch failures return immediately with no status change. Once the
    /// process is running every outcome is reported in the [`RunReport`]:
    /// a non-zero exit or a failed archive is not an `Err`.
    pub async fn run(&self, key: &VersionKey, args: &[String]) -> Result<RunReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyStarted);
        }
        let span = obs::run_span(&self.run_id);
        self.supervise(key, args).instrument(span).await
    }

    async fn supervise(&self, key: &VersionKey, args: &[String]) -> Result<RunReport> {
        let envoy_path = self
            .options
            .envoy_path
            .clone()
            .unwrap_or_else(|| self.store.binary_path(key));

        let mut launcher = ProcessLauncher::new(&envoy_path, &self.options.working_dir);
        if self.options.debug.logs {
            launcher = launcher.with_log_dir(self.debug_store().join("logs"));
        }

        let poller = AdminPoller::new(&self.options.admin_address)?;
        if self.options.debug.admin_data {
            let collector = DebugCollector::new(
                &self.options.admin_address,
                self.debug_store(),
                self.options.debug.interval,
            )?;
            let _ = self.collector.set(Arc::new(collector));
        }

        let mut child = launcher.launch(args)?;
        let pid = child.id().unwrap_or_default();

        let (tx, mut requests) = mpsc::channel::<SignalRequest>(8);
        // `started` guarantees a single run, so the cell is always empty here.
        let _ = self.signals.set(tx);
        self.tracker.set(Status::Initializing);
        obs::emit_run_started(
            pid,
            &envoy_path.display().to_string(),
            &self.options.working_dir.display().to_string(),
        );

        let poller = tokio::spawn(poller.run(Arc::clone(&self.tracker)).in_current_span());
        let collector_task = self.collector.get().map(|collector| {
            tokio::spawn(
                Arc::clone(collector)
                    .run(Arc::clone(&self.tracker))
                    .in_current_span(),
            )
        });

        let exit = loop {
            tokio::select! {
                exit = child.wait() => break exit,
                Some(request) = requests.recv() => {
                    let result = deliver_signal(pid, request.signal);
                    if result.is_ok() {
                        obs::emit_signal_forwarded(pid, request.signal.as_str());
                    }
                    let _ = request.reply.send(result);
                }
            }
        };

        // Anything still queued raced with the exit.
        requests.close();
        while let Ok(request) = requests.try_recv() {
            let _ = request.reply.send(Err(SignalError::NotRunning));
        }

        let (exit_code, signal) = match exit {
            Ok(status) => (status.code(), exit_signal(&status)),
            Err(err) => {
                warn!(pid, error = %err, "unable to read exit status");
                (None, None)
            }
        };
        self.tracker.set(Status::Terminated);

        let reached_ready = poller.await.unwrap_or(false);
        if let Some(handle) = collector_task {
            if let Err(err) = handle.await {
                warn!(error = %err, "debug collector task failed");
            }
        }
        // Waits out a pass started by `send_signal`; nothing writes to the
        // debug store after this.
        if let Some(collector) = self.collector.get() {
            collector.close().await;
        }
        obs::emit_run_terminated(pid, exit_code, signal, reached_ready);

        let archive = self.finish_working_dir().await;
        Ok(RunReport {
            run_id: self.run_id.clone(),
            pid,
            exit_code,
            signal,
            reached_ready,
            archive,
        })
    }

    async fn finish_working_dir(&self) -> ArchiveOutcome {
        if self.options.dont_archive_working_dir {
            info!("archiving disabled");
            return ArchiveOutcome::Skipped;
        }

        let archiver = Arc::clone(&self.archiver);
        let result = tokio::task::spawn_blocking(move || archiver.archive())
            .await
            .unwrap_or_else(|join_err| {
                Err(ArchiveError::Io {
                    path: self.options.working_dir.clone(),
                    source: std::io::Error::other(join_err),
                })
            });

        match result {
            Ok(path) => {
                obs::emit_archived(&path.display().to_string());
                ArchiveOutcome::Written(path)
            }
            Err(err) => {
                obs::emit_archive_failed(&err);
                ArchiveOutcome::Failed(err)
            }
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use binary_store::fakes::MemoryBinaryStore;

    fn runtime(dir: &std::path::Path) -> Runtime {
        Runtime::new(
            RunOptions::new(dir.join("run")).with_envoy_path("/bin/sh"),
            Arc::new(MemoryBinaryStore::new()),
        )
    }

    #[test]
    fn test_debug_store_derived_from_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        assert_eq!(rt.debug_store(), dir.path().join("run").join("debug"));
        assert!(!rt.debug_store().exists());
    }

    #[tokio::test]
    async fn test_signal_before_run_is_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let err = rt.send_signal(Signal::SIGINT).await.unwrap_err();
        assert!(matches!(err, SignalError::NotStarted));
        assert_eq!(rt.status(), None);
        assert!(!dir.path().join("run").exists());
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let key = VersionKey::new("standard:1.11.0").unwrap();
        let args = vec!["-c".to_string(), "exit 0".to_string()];

        rt.run(&key, &args).await.unwrap();
        let err = rt.run(&key, &args).await.unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_fetch_delegates_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let key = VersionKey::new("standard:1.11.0").unwrap();

        assert!(!rt.already_downloaded(&key));
        rt.fetch(&key, "file:///unused").await.unwrap();
        assert!(rt.already_downloaded(&key));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let rt = Runtime::new(
            RunOptions::new(dir.path().join("run")),
            Arc::new(MemoryBinaryStore::failing()),
        );
        let key = VersionKey::new("standard:1.11.0").unwrap();

        let err = rt.fetch(&key, "https://example.invalid/x").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Fetch(_)));
        assert!(!rt.already_downloaded(&key));
    }
}
