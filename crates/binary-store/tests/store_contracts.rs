//! Contract tests for BinaryStore.
//!
//! The filesystem store is exercised with tarballs built on the fly and
//! served from `file://` locations.

use binary_store::fakes::MemoryBinaryStore;
use binary_store::{BinaryStore, FsBinaryStore, StoreError};
use envoy_manifest::VersionKey;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};

fn key() -> VersionKey {
    VersionKey::with_platform("standard:1.11.0", "linux-glibc").unwrap()
}

/// Write a gzipped tarball containing `entries` (path, contents).
fn tarball(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (entry, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, entry, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    path
}

#[tokio::test]
async fn fs_not_downloaded_before_fetch_and_downloaded_after() {
    let home = tempfile::tempdir().unwrap();
    let artifact = tarball(
        home.path(),
        "envoy.tar.gz",
        &[("getenvoy-1.11.0/bin/envoy", b"#!/bin/sh\n")],
    );
    let store = FsBinaryStore::new(home.path()).unwrap();

    assert!(!store.already_downloaded(&key()));
    store
        .fetch(&key(), &format!("file://{}", artifact.display()))
        .await
        .unwrap();
    assert!(store.already_downloaded(&key()));

    let contents = std::fs::read(store.binary_path(&key())).unwrap();
    assert_eq!(contents, b"#!/bin/sh\n");
}

#[cfg(unix)]
#[tokio::test]
async fn fs_fetch_marks_binary_executable() {
    use std::os::unix::fs::PermissionsExt;

    let home = tempfile::tempdir().unwrap();
    let artifact = tarball(home.path(), "envoy.tar.gz", &[("bin/envoy", b"x")]);
    let store = FsBinaryStore::new(home.path()).unwrap();
    store
        .fetch(&key(), artifact.to_str().unwrap())
        .await
        .unwrap();

    let mode = std::fs::metadata(store.binary_path(&key()))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o111, 0o111);
}

#[tokio::test]
async fn fs_fetch_is_idempotent() {
    let home = tempfile::tempdir().unwrap();
    let artifact = tarball(home.path(), "envoy.tar.gz", &[("bin/envoy", b"first")]);
    let store = FsBinaryStore::new(home.path()).unwrap();
    let location = artifact.to_str().unwrap().to_string();

    store.fetch(&key(), &location).await.unwrap();
    // Second fetch must not touch the source; prove it by deleting it.
    std::fs::remove_file(&artifact).unwrap();
    store.fetch(&key(), &location).await.unwrap();

    assert!(store.already_downloaded(&key()));
}

#[tokio::test]
async fn fs_archive_without_envoy_leaves_no_cache_entry() {
    let home = tempfile::tempdir().unwrap();
    let artifact = tarball(home.path(), "other.tar.gz", &[("README.md", b"hi")]);
    let store = FsBinaryStore::new(home.path()).unwrap();

    let err = store
        .fetch(&key(), artifact.to_str().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::MissingBinary { .. }));
    assert!(!store.already_downloaded(&key()));
    assert!(!store.binary_path(&key()).parent().unwrap().exists());
}

#[tokio::test]
async fn fs_missing_location_is_io_error() {
    let home = tempfile::tempdir().unwrap();
    let store = FsBinaryStore::new(home.path()).unwrap();

    let err = store
        .fetch(&key(), "file:///definitely/not/here.tar.gz")
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Io(_)));
    assert!(!store.already_downloaded(&key()));
}

#[tokio::test]
async fn memory_store_follows_same_contract() {
    let store = MemoryBinaryStore::new();
    assert!(!store.already_downloaded(&key()));
    store.fetch(&key(), "anywhere").await.unwrap();
    store.fetch(&key(), "anywhere").await.unwrap();
    assert!(store.already_downloaded(&key()));
    assert_eq!(store.fetch_count(), 1);

    let other = VersionKey::with_platform("standard:1.11.0", "darwin").unwrap();
    assert!(!store.already_downloaded(&other));
}

#[tokio::test]
async fn memory_store_failure_leaves_key_absent() {
    let store = MemoryBinaryStore::failing();
    assert!(store.fetch(&key(), "anywhere").await.is_err());
    assert!(!store.already_downloaded(&key()));
}
