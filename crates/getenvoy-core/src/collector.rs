//! Admin API snapshots for post-mortem debugging.
//!
//! Once the process is ready the collector copies a fixed set of read-only
//! admin endpoints into the debug store, one file per endpoint, and repeats
//! on an interval until the process terminates. Each file is replaced with a
//! single rename, so readers never see a partial snapshot.

use crate::admin::AdminClient;
use crate::error::SnapshotError;
use crate::status::{Status, StatusTracker};
use futures::future::join_all;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-request timeout when fetching an endpoint.
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// An admin path and the file its body is saved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminEndpoint {
    pub path: &'static str,
    pub file: &'static str,
}

/// Endpoints captured on every pass.
pub const ADMIN_ENDPOINTS: &[AdminEndpoint] = &[
    AdminEndpoint { path: "certs", file: "certs.json" },
    AdminEndpoint { path: "clusters", file: "clusters.txt" },
    AdminEndpoint { path: "config_dump", file: "config_dump.json" },
    AdminEndpoint { path: "listeners", file: "listeners.txt" },
    AdminEndpoint { path: "memory", file: "memory.json" },
    AdminEndpoint { path: "server_info", file: "server_info.json" },
    AdminEndpoint { path: "stats?format=json", file: "stats.json" },
    AdminEndpoint { path: "runtime", file: "runtime.json" },
];

#[derive(Debug, Default)]
struct PassLog {
    completed: u64,
    closed: bool,
}

/// Outcome of one collection pass.
#[derive(Debug, Default)]
pub struct CollectionPass {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(AdminEndpoint, SnapshotError)>,
}

impl CollectionPass {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes admin snapshots into a debug store directory.
#[derive(Debug)]
pub struct DebugCollector {
    client: AdminClient,
    store: PathBuf,
    interval: Duration,
    // Serializes passes and `close`.
    passes: Mutex<PassLog>,
}

impl DebugCollector {
    pub fn new(
        admin_address: &str,
        store: impl Into<PathBuf>,
        interval: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: AdminClient::new(admin_address, SNAPSHOT_TIMEOUT)?,
            store: store.into(),
            interval,
            passes: Mutex::new(PassLog::default()),
        })
    }

    pub fn store(&self) -> &Path {
        &self.store
    }

    /// Passes completed so far.
    pub async fn passes(&self) -> u64 {
        self.passes.lock().await.completed
    }

    /// Stop accepting passes. Waits for a pass in flight, so once this
    /// returns nothing writes to the store again.
    pub async fn close(&self) {
        self.passes.lock().await.closed = true;
    }

    /// Fetch every endpoint once and persist the successful responses.
    ///
    /// A failing endpoint is logged and skipped; it never aborts the pass.
    /// Concurrent callers are serialized. Returns `None` once closed.
    pub async fn collect(&self) -> Option<CollectionPass> {
        let mut log = self.passes.lock().await;
        if log.closed {
            debug!("debug collector closed; pass skipped");
            return None;
        }
        let mut pass = CollectionPass::default();

        if let Err(err) = std::fs::create_dir_all(&self.store) {
            // Every write below will fail and be reported per endpoint.
            warn!(event = "debug.store_unavailable", path = %self.store.display(), error = %err);
        }

        let fetches = ADMIN_ENDPOINTS
            .iter()
            .map(|endpoint| async move { (*endpoint, self.client.get(endpoint.path).await) });

        for (endpoint, result) in join_all(fetches).await {
            let written = result.and_then(|body| write_snapshot(&self.store, endpoint.file, &body));
            match written {
                Ok(path) => pass.written.push(path),
                Err(err) => {
                    warn!(event = "debug.snapshot_failed", endpoint = endpoint.path, error = %err);
                    pass.failed.push((endpoint, err));
                }
            }
        }

        log.completed += 1;
        debug!(
            pass = log.completed,
            written = pass.written.len(),
            failed = pass.failed.len(),
            "debug collection pass finished"
        );
        Some(pass)
    }

    /// Collect on `Ready`, then every interval, until `Terminated`.
    ///
    /// Returns closed, once the process has terminated and any in-flight
    /// pass (including one started through [`DebugCollector::collect`] by
    /// another task) has finished writing. Collects nothing if the process
    /// never became ready.
    pub async fn run(self: Arc<Self>, tracker: Arc<StatusTracker>) {
        if tracker.wait(Status::Ready).await >= Status::Terminated {
            debug!("process terminated before ready; no admin data collected");
            self.close().await;
            return;
        }

        loop {
            self.collect().await;
            tokio::select! {
                biased;
                _ = tracker.wait(Status::Terminated) => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        self.close().await;
    }
}

/// Replace `<store>/<file>` with `body` via temp file + rename.
fn write_snapshot(store: &Path, file: &str, body: &[u8]) -> Result<PathBuf, SnapshotError> {
    let path = store.join(file);
    let write_err = |source: std::io::Error| SnapshotError::Write {
        path: path.clone(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(store).map_err(write_err)?;
    tmp.write_all(body).map_err(write_err)?;
    tmp.persist(&path).map_err(|e| write_err(e.error))?;
    Ok(path)
}
