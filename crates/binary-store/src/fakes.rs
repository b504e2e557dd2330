//! In-memory fake for the BinaryStore trait (testing only)

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use envoy_manifest::VersionKey;

use crate::error::StoreError;
use crate::store::BinaryStore;
use crate::Result;

/// Records fetched keys without touching the network or disk.
#[derive(Debug, Default)]
pub struct MemoryBinaryStore {
    root: PathBuf,
    fetched: Mutex<HashSet<VersionKey>>,
    fail_fetch: bool,
}

impl MemoryBinaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `fetch` always fails with a download error
    pub fn failing() -> Self {
        Self {
            fail_fetch: true,
            ..Self::default()
        }
    }

    /// Number of successful fetches recorded
    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl BinaryStore for MemoryBinaryStore {
    fn binary_path(&self, key: &VersionKey) -> PathBuf {
        self.root
            .join(key.flavor())
            .join(key.version())
            .join(key.platform())
            .join("bin")
            .join("envoy")
    }

    fn already_downloaded(&self, key: &VersionKey) -> bool {
        self.fetched.lock().unwrap().contains(key)
    }

    async fn fetch(&self, key: &VersionKey, location: &str) -> Result<()> {
        if self.fail_fetch {
            return Err(StoreError::Http {
                location: location.to_string(),
                reason: "fake store configured to fail".to_string(),
            });
        }
        self.fetched.lock().unwrap().insert(key.clone());
        Ok(())
    }
}
