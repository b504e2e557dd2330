//! HTTP client for the Envoy admin API.

use crate::error::SnapshotError;
use std::time::Duration;

/// Readiness endpoint; answers 2xx once the server is live.
pub const READY_PATH: &str = "ready";

/// Thin reqwest wrapper bound to one admin address.
#[derive(Debug, Clone)]
pub struct AdminClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl AdminClient {
    /// `address` is `host:port`; a scheme may be included. Fails only if
    /// the underlying reqwest client cannot be built.
    pub fn new(address: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Absolute URL for an admin path such as `stats?format=json`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` and return the body of a 2xx response.
    pub async fn get(&self, path: &str) -> Result<Vec<u8>, SnapshotError> {
        let url = self.url(path);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| SnapshotError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| SnapshotError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(body.to_vec())
    }

    /// True when the readiness endpoint answers 2xx.
    pub async fn probe(&self) -> bool {
        self.get(READY_PATH).await.is_ok()
    }
}
