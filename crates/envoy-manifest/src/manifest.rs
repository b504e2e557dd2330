//! Manifest model and lookup
//!
//! The manifest is a JSON document listing every published Envoy build by
//! flavor, version and platform.

use crate::error::ManifestError;
use crate::key::VersionKey;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Default location of the public manifest
pub const DEFAULT_MANIFEST_URL: &str = "https://dl.getenvoy.io/public/raw/files/manifest.json";

/// Top level manifest document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub flavors: BTreeMap<String, Flavor>,
}

/// A family of builds (e.g. `standard`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flavor {
    pub name: String,
    #[serde(default)]
    pub filter_profile: String,
    #[serde(default)]
    pub versions: BTreeMap<String, Version>,
}

/// One release of a flavor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub name: String,
    #[serde(default)]
    pub builds: BTreeMap<String, Build>,
}

/// A downloadable artifact for one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub platform: String,
    pub download_location_url: String,
}

impl Manifest {
    /// Parse a manifest from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Resolve a key to its download location
    pub fn locate(&self, key: &VersionKey) -> Result<String> {
        let flavor = self
            .flavors
            .get(key.flavor())
            .ok_or_else(|| ManifestError::FlavorNotFound {
                flavor: key.flavor().to_string(),
            })?;

        let version =
            flavor
                .versions
                .get(key.version())
                .ok_or_else(|| ManifestError::VersionNotFound {
                    flavor: key.flavor().to_string(),
                    version: key.version().to_string(),
                })?;

        version
            .builds
            .get(&key.manifest_platform())
            .map(|build| build.download_location_url.clone())
            .ok_or_else(|| ManifestError::PlatformNotFound {
                reference: key.reference(),
                platform: key.platform().to_string(),
            })
    }

    /// `(flavor, version)` pairs with a build for `platform`, sorted by
    /// flavor, then by version with numeric parts compared as numbers
    /// (`1.9.0` before `1.10.0`).
    pub fn versions_for(&self, platform: &str) -> Vec<(String, String)> {
        let wanted = platform.to_uppercase().replace('-', "_");
        let mut out = Vec::new();
        for (flavor_name, flavor) in &self.flavors {
            let mut versions: Vec<&String> = flavor
                .versions
                .iter()
                .filter(|(_, version)| version.builds.contains_key(&wanted))
                .map(|(name, _)| name)
                .collect();
            versions.sort_by_cached_key(|name| version_order(name));
            out.extend(
                versions
                    .into_iter()
                    .map(|name| (flavor_name.clone(), name.clone())),
            );
        }
        out
    }
}

/// Sort key for a version name: dot/dash separated parts, numeric parts
/// ordered numerically and before non-numeric ones.
fn version_order(name: &str) -> Vec<(u64, String)> {
    name.split(['.', '-'])
        .map(|part| match part.parse::<u64>() {
            Ok(n) => (n, String::new()),
            Err(_) => (u64::MAX, part.to_string()),
        })
        .collect()
}

/// Retrieve and parse the manifest at `url`.
///
/// `http(s)://` URLs are fetched with reqwest; `file://` URLs and bare paths
/// are read from disk.
pub async fn fetch_manifest(url: &str) -> Result<Manifest> {
    debug!(url = %url, "fetching manifest");

    if url.starts_with("http://") || url.starts_with("https://") {
        let http_err = |e: reqwest::Error| ManifestError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = reqwest::get(url).await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(ManifestError::Http {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            });
        }
        let body = response.bytes().await.map_err(http_err)?;
        return Manifest::from_slice(&body);
    }

    let path = url.strip_prefix("file://").unwrap_or(url);
    let body = tokio::fs::read(Path::new(path)).await?;
    Manifest::from_slice(&body)
}

/// Fetch the manifest at `manifest_url` and resolve `key` against it
pub async fn locate(key: &VersionKey, manifest_url: &str) -> Result<String> {
    let manifest = fetch_manifest(manifest_url).await?;
    manifest.locate(key)
}

/// Write a `VERSION\tFLAVOR` table of builds available for `platform`
pub fn print_versions(manifest: &Manifest, platform: &str, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "VERSION\tFLAVOR")?;
    for (flavor, version) in manifest.versions_for(platform) {
        writeln!(out, "{version}\t{flavor}")?;
    }
    Ok(())
}
