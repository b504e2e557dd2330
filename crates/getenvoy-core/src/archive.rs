//! Packaging of a finished run's working directory.
//!
//! `<parent>/<name>` is written to `<parent>/<name>.tar.gz` with every entry
//! rooted at `<name>/`.

use crate::error::ArchiveError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;

/// Where the archive of `working_dir` is written.
pub fn archive_path(working_dir: &Path) -> Result<PathBuf, ArchiveError> {
    let name = working_dir
        .file_name()
        .ok_or_else(|| ArchiveError::NoParent(working_dir.to_path_buf()))?;
    let parent = match working_dir.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(ArchiveError::NoParent(working_dir.to_path_buf())),
    };

    let mut file_name = name.to_os_string();
    file_name.push(".tar.gz");
    Ok(parent.join(file_name))
}

/// Archives one working directory, at most once.
#[derive(Debug)]
pub struct Archiver {
    working_dir: PathBuf,
    done: AtomicBool,
}

impl Archiver {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            done: AtomicBool::new(false),
        }
    }

    /// Write the archive and return its path. Any call after the first
    /// returns [`ArchiveError::AlreadyArchived`] without touching disk.
    pub fn archive(&self) -> Result<PathBuf, ArchiveError> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Err(ArchiveError::AlreadyArchived(self.working_dir.clone()));
        }
        write_archive(&self.working_dir)
    }
}

fn write_archive(working_dir: &Path) -> Result<PathBuf, ArchiveError> {
    let target = archive_path(working_dir)?;
    let io_err = |source: std::io::Error| ArchiveError::Io {
        path: working_dir.to_path_buf(),
        source,
    };

    // archive_path guarantees both parts exist.
    let parent = target.parent().unwrap_or(Path::new("."));
    let name = working_dir.file_name().unwrap_or_default();

    let tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    let mut builder = tar::Builder::new(GzEncoder::new(tmp, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(name, working_dir).map_err(io_err)?;
    let tmp = builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(io_err)?;
    tmp.persist(&target).map_err(|e| io_err(e.error))?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    fn entries(archive: &Path) -> Vec<String> {
        let file = std::fs::File::open(archive).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        tar.entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_archive_path_is_sibling() {
        assert_eq!(
            archive_path(Path::new("/home/u/.getenvoy/debug/1700000000")).unwrap(),
            PathBuf::from("/home/u/.getenvoy/debug/1700000000.tar.gz")
        );
        assert_eq!(
            archive_path(Path::new("run")).unwrap(),
            PathBuf::from("./run.tar.gz")
        );
        assert!(archive_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_archive_contains_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let working_dir = dir.path().join("run-1");
        std::fs::create_dir_all(working_dir.join("debug")).unwrap();
        std::fs::write(working_dir.join("debug/stats.json"), b"{}").unwrap();

        let archiver = Archiver::new(&working_dir);
        let path = archiver.archive().unwrap();
        assert_eq!(path, dir.path().join("run-1.tar.gz"));

        let names = entries(&path);
        assert!(names.iter().any(|n| n == "run-1/debug/stats.json"), "{names:?}");
    }

    #[test]
    fn test_archive_runs_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let working_dir = dir.path().join("run-2");
        std::fs::create_dir_all(&working_dir).unwrap();

        let archiver = Archiver::new(&working_dir);
        archiver.archive().unwrap();
        let err = archiver.archive().unwrap_err();
        assert!(matches!(err, ArchiveError::AlreadyArchived(_)));
    }

    #[test]
    fn test_missing_working_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(dir.path().join("never-created"));
        let err = archiver.archive().unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
        assert!(!dir.path().join("never-created.tar.gz").exists());
    }
}
