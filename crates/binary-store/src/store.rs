//! Filesystem-backed build cache
//!
//! Layout: `<home>/builds/<flavor>/<version>/<platform>/bin/envoy`

use crate::error::StoreError;
use crate::Result;
use async_trait::async_trait;
use envoy_manifest::VersionKey;
use flate2::read::GzDecoder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Cache of Envoy builds keyed by [`VersionKey`].
///
/// Guarantees:
/// - `already_downloaded(key)` is false until a `fetch(key, ..)` succeeds.
/// - `fetch` is idempotent; fetching a cached key is a no-op success.
/// - A failed `fetch` leaves nothing at `binary_path(key)`.
#[async_trait]
pub trait BinaryStore: Send + Sync {
    /// Where the envoy executable for `key` lives once fetched
    fn binary_path(&self, key: &VersionKey) -> PathBuf;

    /// Whether `key` is present in the cache
    fn already_downloaded(&self, key: &VersionKey) -> bool;

    /// Download and unpack the artifact at `location` into the cache
    async fn fetch(&self, key: &VersionKey, location: &str) -> Result<()>;
}

/// [`BinaryStore`] rooted at a home directory on disk
pub struct FsBinaryStore {
    builds_dir: PathBuf,
    http_client: reqwest::Client,
}

impl FsBinaryStore {
    /// Create a store rooted at `home` (builds go under `home/builds`)
    pub fn new(home: impl AsRef<Path>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("getenvoy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(FsBinaryStore {
            builds_dir: home.as_ref().join("builds"),
            http_client,
        })
    }

    pub fn builds_dir(&self) -> &Path {
        &self.builds_dir
    }

    fn platform_dir(&self, key: &VersionKey) -> PathBuf {
        self.builds_dir
            .join(key.flavor())
            .join(key.version())
            .join(key.platform())
    }

    async fn download(&self, location: &str) -> Result<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let http_err = |e: reqwest::Error| StoreError::Http {
                location: location.to_string(),
                reason: e.to_string(),
            };
            let response = self
                .http_client
                .get(location)
                .send()
                .await
                .map_err(http_err)?;
            if !response.status().is_success() {
                return Err(StoreError::Http {
                    location: location.to_string(),
                    reason: format!("status {}", response.status()),
                });
            }
            let body = response.bytes().await.map_err(http_err)?;
            return Ok(body.to_vec());
        }

        let path = location.strip_prefix("file://").unwrap_or(location);
        Ok(tokio::fs::read(path).await?)
    }
}

#[async_trait]
impl BinaryStore for FsBinaryStore {
    fn binary_path(&self, key: &VersionKey) -> PathBuf {
        self.platform_dir(key).join("bin").join("envoy")
    }

    fn already_downloaded(&self, key: &VersionKey) -> bool {
        self.binary_path(key).is_file()
    }

    async fn fetch(&self, key: &VersionKey, location: &str) -> Result<()> {
        if self.already_downloaded(key) {
            debug!(key = %key, "already downloaded");
            return Ok(());
        }

        info!(key = %key, location = %location, "fetching envoy");
        let archive = self.download(location).await?;

        let platform_dir = self.platform_dir(key);
        let builds_dir = self.builds_dir.clone();
        let location = location.to_string();
        tokio::task::spawn_blocking(move || install(&archive, &builds_dir, &platform_dir, &location))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        if !self.already_downloaded(key) {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "{} missing after install",
                self.binary_path(key).display()
            ))));
        }
        info!(key = %key, path = %self.binary_path(key).display(), "envoy installed");
        Ok(())
    }
}

/// Unpack `archive` into a staging directory and move `bin/envoy` into
/// `platform_dir` with a single rename.
fn install(archive: &[u8], builds_dir: &Path, platform_dir: &Path, location: &str) -> Result<()> {
    fs::create_dir_all(builds_dir)?;
    let staging = tempfile::tempdir_in(builds_dir)?;

    let unpacked = staging.path().join("unpacked");
    fs::create_dir_all(&unpacked)?;
    tar::Archive::new(GzDecoder::new(archive))
        .unpack(&unpacked)
        .map_err(|e| StoreError::Unpack {
            location: location.to_string(),
            reason: e.to_string(),
        })?;

    let found = find_envoy(&unpacked)?.ok_or_else(|| StoreError::MissingBinary {
        location: location.to_string(),
    })?;

    let staged = staging.path().join("platform");
    fs::create_dir_all(staged.join("bin"))?;
    let staged_binary = staged.join("bin").join("envoy");
    fs::rename(&found, &staged_binary)?;
    make_executable(&staged_binary)?;

    if let Some(parent) = platform_dir.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(&staged, platform_dir) {
        Ok(()) => Ok(()),
        // Lost a race with a concurrent fetch of the same key.
        Err(_) if platform_dir.join("bin").join("envoy").is_file() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// First `bin/envoy` regular file below `dir`, depth first in name order
fn find_envoy(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if let Some(found) = find_envoy(&path)? {
                return Ok(Some(found));
            }
        } else if path.file_name().is_some_and(|n| n == "envoy")
            && path
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|n| n == "bin")
        {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
