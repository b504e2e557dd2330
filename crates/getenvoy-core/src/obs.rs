//! Structured lifecycle events for a supervised run.
//!
//! Every event carries an `event = "runtime.*"` field so log pipelines can
//! filter on it. Verbosity follows `RUST_LOG`.

use tracing::{info, warn};

/// Span tagging all logs of one run with its `run_id`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("getenvoy.run", run_id = %run_id)
}

pub fn emit_run_started(pid: u32, envoy_path: &str, working_dir: &str) {
    info!(
        event = "runtime.started",
        pid = pid,
        envoy_path = %envoy_path,
        working_dir = %working_dir,
    );
}

pub fn emit_signal_forwarded(pid: u32, signal: &str) {
    info!(event = "runtime.signal_forwarded", pid = pid, signal = %signal);
}

/// Process reaped. `code` is `None` when it died from a signal.
pub fn emit_run_terminated(pid: u32, code: Option<i32>, signal: Option<i32>, reached_ready: bool) {
    info!(
        event = "runtime.terminated",
        pid = pid,
        exit_code = ?code,
        signal = ?signal,
        reached_ready = reached_ready,
    );
}

pub fn emit_archived(path: &str) {
    info!(event = "runtime.archived", path = %path);
}

pub fn emit_archive_failed(error: &dyn std::fmt::Display) {
    warn!(event = "runtime.archive_failed", error = %error);
}
