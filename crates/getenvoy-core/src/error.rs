//! Error taxonomy for the runtime supervisor.
//!
//! Errors that stop a process from ever running (resolution, fetch, launch)
//! come back from `Runtime::run` directly. Errors that happen while the
//! process is alive stay inside the component that hit them: probe failures
//! are retried, snapshot failures are logged, archive failures are reported
//! in the run report.

use std::path::PathBuf;

/// Starting the child process failed.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("envoy binary not found at {0}")]
    NotFound(PathBuf),

    #[error("envoy binary at {0} is not executable")]
    NotExecutable(PathBuf),

    #[error("unable to create working directory {path}: {source}")]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to start {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Forwarding a signal to the child failed.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("no process has been started")]
    NotStarted,

    #[error("process is not running")]
    NotRunning,

    #[error("unable to deliver {signal} to pid {pid}: {reason}")]
    Delivery {
        signal: String,
        pid: u32,
        reason: String,
    },
}

/// Packaging the working directory failed.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("working directory {0} has no parent to hold the archive")]
    NoParent(PathBuf),

    #[error("working directory {0} was already archived")]
    AlreadyArchived(PathBuf),

    #[error("unable to archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Capturing one admin endpoint failed.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("unable to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the runtime facade.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("resolution error: {0}")]
    Resolution(#[from] envoy_manifest::ManifestError),

    #[error("fetch error: {0}")]
    Fetch(#[from] binary_store::StoreError),

    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("runtime already started; a runtime supervises exactly one process")]
    AlreadyStarted,

    #[error("admin client error: {0}")]
    AdminClient(#[from] reqwest::Error),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
