//! Binary-Store: local Envoy build cache for getenvoy
//!
//! Downloads release tarballs, unpacks them and keeps the `envoy`
//! executable under a per-version, per-platform directory so that runs
//! never hit the network twice for the same build.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

mod error;
pub mod fakes;
pub mod store;

pub use error::StoreError;
pub use store::{BinaryStore, FsBinaryStore};

/// Result type for binary-store operations
pub type Result<T> = std::result::Result<T, StoreError>;
