//! Getenvoy-Core: runtime supervisor for Envoy
//!
//! Launches an Envoy binary, tracks its lifecycle through
//! `Initializing -> Ready -> Terminated`, captures admin API snapshots and
//! process logs while it runs, and archives the working directory once it
//! exits.

pub mod admin;
pub mod archive;
pub mod collector;
pub mod error;
pub mod launcher;
pub mod obs;
pub mod options;
pub mod poller;
pub mod runtime;
pub mod status;
pub mod telemetry;

pub use archive::{archive_path, Archiver};
pub use collector::{AdminEndpoint, CollectionPass, DebugCollector, ADMIN_ENDPOINTS};
pub use error::{
    ArchiveError, LaunchError, Result, RuntimeError, SignalError, SnapshotError,
};
pub use launcher::ProcessLauncher;
pub use options::{DebugOptions, GlobalOptions, RunOptions};
pub use poller::AdminPoller;
pub use runtime::{ArchiveOutcome, RunReport, Runtime};
pub use status::{Status, StatusTracker};
pub use telemetry::init_tracing;

pub use binary_store::{BinaryStore, FsBinaryStore};
pub use envoy_manifest::VersionKey;
pub use nix::sys::signal::Signal;
