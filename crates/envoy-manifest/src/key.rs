//! Version keys
//!
//! A [`VersionKey`] names one Envoy build: a flavor, a version and the
//! platform it was built for. It is the lookup key for both the manifest
//! and the local binary cache.

use crate::error::ManifestError;
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Identifies a specific Envoy build
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionKey {
    flavor: String,
    version: String,
    platform: String,
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9._-]+):([A-Za-z0-9._-]+)(?:/([A-Za-z0-9._-]+))?$").expect("static regex is valid")
    })
}

/// Platform name used by the manifest for the host OS
pub fn current_platform() -> String {
    match std::env::consts::OS {
        "linux" => "linux-glibc".to_string(),
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

impl VersionKey {
    /// Parse a user supplied reference such as `standard:1.11.0` or
    /// `standard:1.11.0/darwin`. The platform defaults to the host.
    pub fn new(reference: &str) -> Result<Self> {
        let caps = reference_pattern()
            .captures(reference.trim())
            .ok_or_else(|| ManifestError::InvalidReference(reference.to_string()))?;

        let platform = caps
            .get(3)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_else(current_platform);

        Ok(VersionKey {
            flavor: caps[1].to_string(),
            version: caps[2].to_string(),
            platform,
        })
    }

    /// Build a key for an explicit platform
    pub fn with_platform(reference: &str, platform: &str) -> Result<Self> {
        let mut key = Self::new(reference)?;
        key.platform = platform.to_lowercase();
        Ok(key)
    }

    pub fn flavor(&self) -> &str {
        &self.flavor
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// `flavor:version`, without the platform
    pub fn reference(&self) -> String {
        format!("{}:{}", self.flavor, self.version)
    }

    /// Platform as spelled in the manifest (`linux-glibc` -> `LINUX_GLIBC`)
    pub fn manifest_platform(&self) -> String {
        self.platform.to_uppercase().replace('-', "_")
    }
}

impl std::str::FromStr for VersionKey {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self> {
        VersionKey::new(s)
    }
}

impl std::fmt::Display for VersionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.flavor, self.version, self.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_reference_defaults_platform() {
        let key = VersionKey::new("standard:1.11.0").unwrap();
        assert_eq!(key.flavor(), "standard");
        assert_eq!(key.version(), "1.11.0");
        assert_eq!(key.platform(), current_platform());
        assert_eq!(key.reference(), "standard:1.11.0");
    }

    #[test]
    fn test_parse_reference_with_platform() {
        let key = VersionKey::new("standard-fips:1.11.0-rc1/DARWIN").unwrap();
        assert_eq!(key.flavor(), "standard-fips");
        assert_eq!(key.version(), "1.11.0-rc1");
        assert_eq!(key.platform(), "darwin");
        assert_eq!(key.to_string(), "standard-fips:1.11.0-rc1/darwin");
    }

    #[test]
    fn test_invalid_references_fail() {
        for bad in [
            "",
            "standard",
            ":1.11.0",
            "standard:",
            "a:b/c/d",
            "a b:1",
            "std_x:1.0",
            "стандарт:1.0",
            "standard:1.0/linux_glibc",
        ] {
            let err = VersionKey::new(bad).unwrap_err();
            assert!(
                matches!(err, ManifestError::InvalidReference(_)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_manifest_platform_spelling() {
        let key = VersionKey::with_platform("standard:1.11.0", "linux-glibc").unwrap();
        assert_eq!(key.manifest_platform(), "LINUX_GLIBC");
    }

    #[test]
    fn test_equality_and_hash_by_value() {
        let a = VersionKey::with_platform("standard:1.11.0", "darwin").unwrap();
        let b: VersionKey = "standard:1.11.0/darwin".parse().unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
