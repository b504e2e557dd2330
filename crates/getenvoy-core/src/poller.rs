//! Readiness polling of the admin API.
//!
//! Envoy's startup time is unbounded, so instead of sleeping a fixed time
//! the poller probes `/ready` on a short interval until it answers. It gives
//! up only when the process terminates first.

use crate::admin::AdminClient;
use crate::status::{Status, StatusTracker};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Delay between readiness probes.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(200);

/// Per-request timeout of a readiness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Drives `Initializing -> Ready` for one run.
#[derive(Debug, Clone)]
pub struct AdminPoller {
    client: AdminClient,
    interval: Duration,
}

impl AdminPoller {
    pub fn new(admin_address: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: AdminClient::new(admin_address, PROBE_TIMEOUT)?,
            interval: PROBE_INTERVAL,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Probe until ready or terminated. Returns whether this poller moved
    /// the status to `Ready`.
    pub async fn run(self, tracker: Arc<StatusTracker>) -> bool {
        let mut attempts: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = tracker.wait(Status::Terminated) => {
                    debug!(attempts, "process terminated before admin API became ready");
                    return false;
                }
                live = self.client.probe() => {
                    attempts += 1;
                    if live {
                        let advanced = tracker.set(Status::Ready);
                        if advanced {
                            info!(event = "runtime.ready", attempts, "admin API is ready");
                        }
                        return advanced;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = tracker.wait(Status::Terminated) => {
                    debug!(attempts, "process terminated before admin API became ready");
                    return false;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
