//! Child process launch and signal delivery.

use crate::error::{LaunchError, SignalError};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Starts the envoy executable in its working directory.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    envoy_path: PathBuf,
    working_dir: PathBuf,
    log_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(envoy_path: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            envoy_path: envoy_path.into(),
            working_dir: working_dir.into(),
            log_dir: None,
        }
    }

    /// Send stdout/stderr to `stdout.log`/`stderr.log` in `dir` instead of
    /// inheriting them.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn envoy_path(&self) -> &Path {
        &self.envoy_path
    }

    /// Check the executable exists and carries an execute bit.
    pub fn validate(&self) -> Result<(), LaunchError> {
        let meta = fs::metadata(&self.envoy_path)
            .map_err(|_| LaunchError::NotFound(self.envoy_path.clone()))?;
        if !meta.is_file() || !is_executable(&meta) {
            return Err(LaunchError::NotExecutable(self.envoy_path.clone()));
        }
        Ok(())
    }

    /// Validate, create the working directory and spawn the child.
    ///
    /// The child is killed if its handle is dropped without being reaped.
    pub fn launch(&self, args: &[String]) -> Result<Child, LaunchError> {
        self.validate()?;

        fs::create_dir_all(&self.working_dir).map_err(|source| LaunchError::WorkingDir {
            path: self.working_dir.clone(),
            source,
        })?;

        let mut cmd = Command::new(&self.envoy_path);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match &self.log_dir {
            Some(dir) => {
                let (stdout, stderr) = open_logs(dir).map_err(|source| LaunchError::WorkingDir {
                    path: dir.clone(),
                    source,
                })?;
                cmd.stdout(stdout).stderr(stderr);
            }
            None => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        debug!(path = %self.envoy_path.display(), ?args, "spawning envoy");
        cmd.spawn().map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => LaunchError::NotFound(self.envoy_path.clone()),
            std::io::ErrorKind::PermissionDenied => {
                LaunchError::NotExecutable(self.envoy_path.clone())
            }
            _ => LaunchError::Spawn {
                path: self.envoy_path.clone(),
                source,
            },
        })
    }
}

fn open_logs(dir: &Path) -> std::io::Result<(fs::File, fs::File)> {
    fs::create_dir_all(dir)?;
    let stdout = fs::File::create(dir.join("stdout.log"))?;
    let stderr = fs::File::create(dir.join("stderr.log"))?;
    Ok((stdout, stderr))
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}

/// Deliver `signal` to `pid`.
pub fn deliver_signal(pid: u32, signal: Signal) -> Result<(), SignalError> {
    let raw = i32::try_from(pid).map_err(|_| SignalError::Delivery {
        signal: signal.to_string(),
        pid,
        reason: "pid out of range".to_string(),
    })?;
    kill(Pid::from_raw(raw), signal).map_err(|errno| SignalError::Delivery {
        signal: signal.to_string(),
        pid,
        reason: errno.to_string(),
    })
}
