//! Error types for binary-store

use thiserror::Error;

/// Errors that can occur while fetching or unpacking a build
#[derive(Error, Debug)]
pub enum StoreError {
    /// Download failed
    #[error("unable to download {location}: {reason}")]
    Http { location: String, reason: String },

    /// Archive could not be unpacked
    #[error("unable to unpack {location}: {reason}")]
    Unpack { location: String, reason: String },

    /// Archive unpacked but contained no envoy binary
    #[error("{location} does not contain bin/envoy")]
    MissingBinary { location: String },

    /// HTTP client could not be constructed
    #[error("unable to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
