//! Store Lifecycle Tests
//!
//! Opening, read-only enforcement, commit headers, on-disk integrity and
//! error rendering.

use cbio::{strerror, Document, DocumentRead, Error, FileStore, OpenMode, StoreConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn create_temp_store_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("testcase.couch");
    (temp_dir, path)
}

fn write_one(path: &Path, id: &str, value: &str) {
    let mut store = FileStore::open(path, OpenMode::Create).unwrap();
    let mut doc = Document::new();
    doc.set_id(id.as_bytes());
    doc.set_value(value.as_bytes());
    store.store_one(&doc).unwrap();
    store.commit().unwrap();
}

// =============================================================================
// Open
// =============================================================================

#[test]
fn test_open_empty_name_not_found() {
    for mode in [OpenMode::ReadOnly, OpenMode::ReadWrite, OpenMode::Create] {
        assert_eq!(FileStore::open("", mode).err(), Some(Error::NotFound));
    }
}

#[test]
fn test_open_malformed_name_invalid_argument() {
    for mode in [OpenMode::ReadOnly, OpenMode::Create] {
        assert_eq!(
            FileStore::open("test\0case.couch", mode).err(),
            Some(Error::InvalidArgument)
        );
    }
}

#[test]
fn test_read_only_open_of_missing_file_not_found() {
    let (_dir, path) = create_temp_store_path();
    assert_eq!(
        FileStore::open(&path, OpenMode::ReadOnly).err(),
        Some(Error::NotFound)
    );
    assert!(!path.exists());
}

#[test]
fn test_read_write_open_creates() {
    let (_dir, path) = create_temp_store_path();
    let store = FileStore::open(&path, OpenMode::ReadWrite).unwrap();
    assert!(store.is_writable());
    store.close();
    assert!(path.exists());
}

#[test]
fn test_open_directory_fails() {
    let (dir, _path) = create_temp_store_path();
    assert!(FileStore::open(dir.path(), OpenMode::ReadOnly).is_err());
}

#[test]
fn test_open_empty_file_has_no_header() {
    let (_dir, path) = create_temp_store_path();
    fs::write(&path, b"").unwrap();
    assert_eq!(
        FileStore::open(&path, OpenMode::ReadOnly).err(),
        Some(Error::NoHeader)
    );
}

// =============================================================================
// Read-only enforcement
// =============================================================================

#[test]
fn test_read_only_rejects_mutation_without_touching_file() {
    let (_dir, path) = create_temp_store_path();
    write_one(&path, "mykey-1", "v");
    let before = fs::read(&path).unwrap();

    let mut store = FileStore::open(&path, OpenMode::ReadOnly).unwrap();
    let mut doc = Document::new();
    doc.set_id(b"mykey-2");
    doc.set_value(b"w");
    assert_eq!(store.store_one(&doc), Err(Error::InvalidArgument));
    assert_eq!(store.store_many(&[]), Err(Error::InvalidArgument));
    assert_eq!(store.commit(), Err(Error::InvalidArgument));
    assert_eq!(store.get(b"mykey-2").err(), Some(Error::NotFound));
    store.close();

    assert_eq!(fs::read(&path).unwrap(), before);
}

// =============================================================================
// Commit headers
// =============================================================================

#[test]
fn test_header_position_advances_on_commit() {
    let (_dir, path) = create_temp_store_path();
    let mut store = FileStore::open(&path, OpenMode::Create).unwrap();
    let initial = store.header_position();

    let mut doc = Document::new();
    doc.set_id(b"mykey-1");
    doc.set_value(b"value");
    store.store_one(&doc).unwrap();
    store.commit().unwrap();

    let committed = store.header_position();
    assert!(committed > initial);
    store.close();

    let store = FileStore::open(&path, OpenMode::ReadOnly).unwrap();
    assert_eq!(store.header_position(), committed);
}

#[test]
fn test_commit_without_writes_keeps_header() {
    let (_dir, path) = create_temp_store_path();
    let mut store = FileStore::open(&path, OpenMode::Create).unwrap();
    let initial = store.header_position();
    store.commit().unwrap();
    assert_eq!(store.header_position(), initial);
}

// =============================================================================
// Integrity
// =============================================================================

#[test]
fn test_flipped_byte_is_detected() {
    let (_dir, path) = create_temp_store_path();
    write_one(&path, "mykey-1", "a value long enough to corrupt in the middle");

    let mut contents = fs::read(&path).unwrap();
    let mid = contents.len() / 2;
    contents[mid] ^= 0xFF;
    fs::write(&path, contents).unwrap();

    let err = FileStore::open(&path, OpenMode::ReadOnly).err();
    assert!(
        matches!(err, Some(Error::ChecksumFail) | Some(Error::Corrupt)),
        "got {:?}",
        err
    );
}

#[test]
fn test_truncated_tail_falls_back_to_last_commit() {
    let (_dir, path) = create_temp_store_path();
    write_one(&path, "committed", "v");
    let committed_len = fs::metadata(&path).unwrap().len() as usize;

    // a second commit, then a crash halfway through writing it
    write_one(&path, "torn", &"w".repeat(200));
    let full = fs::read(&path).unwrap();
    let cut = committed_len + (full.len() - committed_len) / 2;
    fs::write(&path, &full[..cut]).unwrap();

    let store = FileStore::open(&path, OpenMode::ReadOnly).unwrap();
    assert_eq!(store.get(b"committed").unwrap().value().unwrap(), b"v");
    assert_eq!(store.get(b"torn").err(), Some(Error::NotFound));
    store.close();

    // writable open also recovers, and its commit replaces the torn bytes
    write_one(&path, "after", "x");
    let store = FileStore::open(&path, OpenMode::ReadOnly).unwrap();
    assert!(store.get(b"committed").is_ok());
    assert!(store.get(b"after").is_ok());
    assert_eq!(store.get(b"torn").err(), Some(Error::NotFound));
}

#[test]
fn test_damage_before_last_commit_is_fatal() {
    let (_dir, path) = create_temp_store_path();
    write_one(&path, "first", &"a".repeat(64));
    let first_len = fs::metadata(&path).unwrap().len() as usize;
    write_one(&path, "second", "b");

    // flip a byte inside the first commit's document record
    let mut contents = fs::read(&path).unwrap();
    contents[first_len - 30] ^= 0xFF;
    fs::write(&path, contents).unwrap();

    for mode in [OpenMode::ReadOnly, OpenMode::ReadWrite] {
        let err = FileStore::open(&path, mode).err();
        assert!(
            matches!(err, Some(Error::ChecksumFail) | Some(Error::Corrupt)),
            "got {:?}",
            err
        );
    }
}

// =============================================================================
// Configuration and error rendering
// =============================================================================

#[test]
fn test_open_with_json_config() {
    let (_dir, path) = create_temp_store_path();
    let config = StoreConfig::from_json(r#"{"mode": "create", "log_level": "error"}"#).unwrap();
    let store = FileStore::open_with_config(&path, &config).unwrap();
    assert_eq!(store.mode(), OpenMode::Create);
}

#[test]
fn test_strerror_renders_every_outcome() {
    let ok: cbio::Result<()> = Ok(());
    assert_eq!(strerror(&ok), "success");

    let missing = FileStore::open("", OpenMode::ReadOnly).map(|_| ());
    assert_eq!(strerror(&missing), "no entry");
    assert_eq!(Error::ChecksumFail.to_string(), "checksum fail");
}
