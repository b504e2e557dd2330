//! Lifecycle status of a supervised process.
//!
//! [`StatusTracker`] is the single writer-checked register for a run's
//! [`Status`]. Transitions only move forward; every transition wakes all
//! tasks parked in [`StatusTracker::wait`].

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle of one child process, ordered `Initializing < Ready < Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Process started, admin API not yet answering.
    Initializing,
    /// Admin API answered the readiness probe.
    Ready,
    /// Process exited and was reaped.
    Terminated,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Initializing => "initializing",
            Status::Ready => "ready",
            Status::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Concurrency-safe, monotonic status register with broadcast wakeups.
///
/// Holds `None` until the process has been launched.
#[derive(Debug)]
pub struct StatusTracker {
    tx: watch::Sender<Option<Status>>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Current status, `None` before launch.
    pub fn current(&self) -> Option<Status> {
        *self.tx.borrow()
    }

    /// Advance to `next`. Returns `false`, leaving the status untouched,
    /// when `next` is not strictly ahead of the current status.
    pub fn set(&self, next: Status) -> bool {
        self.tx.send_if_modified(|current| match *current {
            Some(prev) if prev >= next => false,
            _ => {
                *current = Some(next);
                true
            }
        })
    }

    /// Park until the status is at least `target`, then return the status
    /// observed. Returns immediately when `target` was already reached.
    ///
    /// `wait(Ready)` also returns for a process that terminated without ever
    /// becoming ready; the returned status tells the two apart.
    pub async fn wait(&self, target: Status) -> Status {
        let mut rx = self.tx.subscribe();
        // The `Ref` must be released before `rx` goes out of scope.
        let seen = rx
            .wait_for(|s| s.is_some_and(|s| s >= target))
            .await
            .map(|seen| *seen);
        // A closed channel is unreachable while `self` holds the sender.
        seen.ok().flatten().unwrap_or(target)
    }

    /// A receiver for callers that need to observe every transition.
    pub fn subscribe(&self) -> watch::Receiver<Option<Status>> {
        self.tx.subscribe()
    }
}
