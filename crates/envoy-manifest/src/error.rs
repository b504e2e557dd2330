//! Error types for envoy-manifest

use thiserror::Error;

/// Errors that can occur while parsing keys or resolving builds
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Reference string does not match `flavor:version[/platform]`
    #[error("invalid version reference {0:?}: expected flavor:version[/platform]")]
    InvalidReference(String),

    /// Flavor is not listed in the manifest
    #[error("flavor {flavor:?} not found in manifest")]
    FlavorNotFound { flavor: String },

    /// Version is not listed for the flavor
    #[error("version {version:?} of flavor {flavor:?} not found in manifest")]
    VersionNotFound { flavor: String, version: String },

    /// No build exists for the platform
    #[error("no {platform} build of {reference} in manifest")]
    PlatformNotFound { reference: String, platform: String },

    /// Manifest could not be retrieved
    #[error("unable to retrieve manifest from {url}: {reason}")]
    Http { url: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ManifestError {
    /// True when the manifest was read but has no artifact for the key.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ManifestError::FlavorNotFound { .. }
                | ManifestError::VersionNotFound { .. }
                | ManifestError::PlatformNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = ManifestError::PlatformNotFound {
            reference: "standard:1.11.0".to_string(),
            platform: "darwin".to_string(),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("darwin"));

        let err = ManifestError::InvalidReference("nope".to_string());
        assert!(!err.is_not_found());
    }
}
