//! Envoy-Manifest: build catalogue for getenvoy
//!
//! Parses version references into [`VersionKey`]s and resolves them to
//! download locations using the published manifest.

pub mod error;
pub mod key;
pub mod manifest;

pub use error::ManifestError;
pub use key::{current_platform, VersionKey};
pub use manifest::{
    fetch_manifest, locate, print_versions, Build, Flavor, Manifest, Version,
    DEFAULT_MANIFEST_URL,
};

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;
