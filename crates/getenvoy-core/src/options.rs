//! Run and global configuration.
//!
//! Values resolve in this order: explicit assignment (tests), command-line
//! flag, environment variable, default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default admin API address of a locally run Envoy.
pub const DEFAULT_ADMIN_ADDRESS: &str = "127.0.0.1:15000";

/// Default period between debug collection passes.
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(5);

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "GETENVOY_HOME";

/// Environment variable overriding the manifest location.
pub const MANIFEST_URL_ENV: &str = "GETENVOY_MANIFEST_URL";

/// Which diagnostics to capture while the process runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugOptions {
    /// Snapshot the admin API endpoints into the debug store.
    pub admin_data: bool,
    /// Redirect child stdout/stderr into `<debug store>/logs`.
    pub logs: bool,
    /// Period between admin snapshots while ready.
    #[serde(with = "duration_ms")]
    pub interval: Duration,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            admin_data: false,
            logs: false,
            interval: DEFAULT_COLLECTION_INTERVAL,
        }
    }
}

impl DebugOptions {
    /// Admin data and log capture both enabled.
    pub fn all() -> Self {
        Self {
            admin_data: true,
            logs: true,
            ..Self::default()
        }
    }
}

/// Options for one run. Fixed once the runtime is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Path to the envoy executable. `None` resolves it from the binary
    /// store by version key.
    pub envoy_path: Option<PathBuf>,
    /// Process cwd and root of everything the run produces. Archived as
    /// `../<basename>.tar.gz` on termination.
    pub working_dir: PathBuf,
    /// Skip archiving the working directory.
    pub dont_archive_working_dir: bool,
    /// host:port of the admin API.
    pub admin_address: String,
    pub debug: DebugOptions,
}

impl RunOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            envoy_path: None,
            working_dir: working_dir.into(),
            dont_archive_working_dir: false,
            admin_address: DEFAULT_ADMIN_ADDRESS.to_string(),
            debug: DebugOptions::default(),
        }
    }

    pub fn with_envoy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.envoy_path = Some(path.into());
        self
    }

    pub fn with_admin_address(mut self, address: impl Into<String>) -> Self {
        self.admin_address = address.into();
        self
    }

    pub fn with_debug(mut self, debug: DebugOptions) -> Self {
        self.debug = debug;
        self
    }

    pub fn without_archive(mut self) -> Self {
        self.dont_archive_working_dir = true;
        self
    }
}

/// Options shared by every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub run: RunOptions,
    /// Location of the build manifest.
    pub manifest_url: String,
    /// Holds fetched builds and default working directories.
    pub home_dir: PathBuf,
}

impl GlobalOptions {
    /// Resolve from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::resolve(None, None)
    }

    /// Resolve with optional explicit overrides (e.g. CLI flags).
    pub fn resolve(home_dir: Option<PathBuf>, manifest_url: Option<String>) -> Self {
        let home_dir = home_dir
            .or_else(|| std::env::var_os(HOME_ENV).map(PathBuf::from))
            .unwrap_or_else(default_home_dir);
        let manifest_url = manifest_url
            .or_else(|| std::env::var(MANIFEST_URL_ENV).ok())
            .unwrap_or_else(|| envoy_manifest::DEFAULT_MANIFEST_URL.to_string());

        let run = RunOptions::new(default_working_dir(&home_dir));
        Self {
            run,
            manifest_url,
            home_dir,
        }
    }
}

/// `$HOME/.getenvoy`, or `./.getenvoy` when `HOME` is unset.
pub fn default_home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".getenvoy")
}

/// `<home>/debug/<unix seconds>`
pub fn default_working_dir(home_dir: &Path) -> PathBuf {
    home_dir
        .join("debug")
        .join(chrono::Utc::now().timestamp().to_string())
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_defaults() {
        let opts = RunOptions::new("/tmp/run");
        assert_eq!(opts.envoy_path, None);
        assert_eq!(opts.admin_address, DEFAULT_ADMIN_ADDRESS);
        assert!(!opts.dont_archive_working_dir);
        assert!(!opts.debug.admin_data);
        assert_eq!(opts.debug.interval, DEFAULT_COLLECTION_INTERVAL);
    }

    #[test]
    fn test_run_options_builders() {
        let opts = RunOptions::new("/tmp/run")
            .with_envoy_path("/usr/local/bin/envoy")
            .with_admin_address("127.0.0.1:9901")
            .with_debug(DebugOptions::all())
            .without_archive();
        assert_eq!(opts.envoy_path, Some(PathBuf::from("/usr/local/bin/envoy")));
        assert_eq!(opts.admin_address, "127.0.0.1:9901");
        assert!(opts.debug.admin_data && opts.debug.logs);
        assert!(opts.dont_archive_working_dir);
    }

    #[test]
    fn test_explicit_values_win() {
        let opts = GlobalOptions::resolve(
            Some(PathBuf::from("/explicit/home")),
            Some("file:///explicit/manifest.json".to_string()),
        );
        assert_eq!(opts.home_dir, PathBuf::from("/explicit/home"));
        assert_eq!(opts.manifest_url, "file:///explicit/manifest.json");
        assert!(opts.run.working_dir.starts_with("/explicit/home/debug"));
    }

    #[test]
    fn test_debug_interval_serializes_as_millis() {
        let json = serde_json::to_value(DebugOptions::all()).unwrap();
        assert_eq!(json["interval"], 5000);

        let back: DebugOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, DebugOptions::all());
    }
}
