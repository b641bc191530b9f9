// crates/bibcache-store-sqlite/tests/book_store_unit.rs
// ============================================================================
// Module: Book Store Unit Tests
// Description: Targeted tests for the SQLite book store.
// Purpose: Validate bootstrap, cache reads/writes, remap resolution,
//          service-config validation, and client credential handling.
// ============================================================================

//! ## Overview
//! Unit-level tests for book store invariants:
//! - Schema bootstrap and open/create preconditions
//! - Write-once cache records and the duplicate-insert outcome
//! - One-hop remap resolution and corruption detection
//! - Lockfile path constraints re-validated on every config read
//! - Client key registration, verification, and removal

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use bibcache_core::Isbn13;
use bibcache_store_sqlite::BookStore;
use bibcache_store_sqlite::BookStoreConfig;
use bibcache_store_sqlite::BookStoreError;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// A valid canonical ISBN-13 used throughout.
const ISBN_A: &str = "9780306406157";
/// A second, distinct valid ISBN-13.
const ISBN_B: &str = "9780804429573";
/// A third valid ISBN-13 for remap-chain tests.
const ISBN_C: &str = "9780201896831";

/// Minimal valid metadata payload.
const SAMPLE_JSON: &str = r#"{"book":{"title":"Sample"}}"#;

fn isbn(text: &str) -> Isbn13 {
    Isbn13::from_canonical(text).expect("test isbn is canonical")
}

fn fresh_store(dir: &TempDir) -> (BookStore, PathBuf) {
    let path = dir.path().join("cache.db");
    let store = BookStore::create(&path, &BookStoreConfig::default()).expect("create store");
    (store, path)
}

fn raw_connection(path: &Path) -> Connection {
    Connection::open(path).expect("open raw connection")
}

fn make_lockfile(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("service.lock");
    fs::write(&path, b"").expect("create lockfile");
    path
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

#[test]
fn create_then_open_roundtrips() {
    let dir = TempDir::new().expect("tempdir");
    let (store, path) = fresh_store(&dir);
    drop(store);
    let reopened = BookStore::open(&path, &BookStoreConfig::default()).expect("reopen store");
    assert!(!reopened.is_cached(&isbn(ISBN_A), false).expect("cache check"));
}

#[test]
fn open_missing_database_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("absent.db");
    let result = BookStore::open(&missing, &BookStoreConfig::default());
    assert!(matches!(result, Err(BookStoreError::MissingDatabase(_))));
}

#[test]
fn create_over_existing_file_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let (_store, path) = fresh_store(&dir);
    let result = BookStore::create(&path, &BookStoreConfig::default());
    assert!(matches!(result, Err(BookStoreError::AlreadyExists(_))));
}

// ============================================================================
// SECTION: Cache Records
// ============================================================================

#[test]
fn insert_then_read_back_full_record() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let key = isbn(ISBN_A);
    store
        .insert_record(&key, 1_700_000_000, SAMPLE_JSON, Some(b"not-actually-a-jpeg"))
        .expect("insert record");
    assert!(store.is_cached(&key, false).expect("deferred check"));
    assert!(store.is_cached(&key, true).expect("exclusive check"));
    assert_eq!(store.metadata_json(&key).expect("json read").as_deref(), Some(SAMPLE_JSON));
    assert_eq!(
        store.cover_image(&key).expect("cover read").as_deref(),
        Some(b"not-actually-a-jpeg".as_slice())
    );
}

#[test]
fn record_without_cover_reads_none() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let key = isbn(ISBN_A);
    store.insert_record(&key, 1_700_000_000, SAMPLE_JSON, None).expect("insert record");
    assert_eq!(store.cover_image(&key).expect("cover read"), None);
    assert!(store.metadata_json(&key).expect("json read").is_some());
}

#[test]
fn missing_record_reads_none() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let key = isbn(ISBN_A);
    assert_eq!(store.metadata_json(&key).expect("json read"), None);
    assert_eq!(store.cover_image(&key).expect("cover read"), None);
}

#[test]
fn duplicate_insert_surfaces_the_distinct_error() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let key = isbn(ISBN_A);
    store.insert_record(&key, 1_700_000_000, SAMPLE_JSON, None).expect("first insert");
    let second = store.insert_record(&key, 1_700_000_001, SAMPLE_JSON, None);
    assert_eq!(second, Err(BookStoreError::Duplicate(ISBN_A.to_string())));
    // The losing write must not have clobbered the original timestamp.
    assert_eq!(store.metadata_json(&key).expect("json read").as_deref(), Some(SAMPLE_JSON));
}

// ============================================================================
// SECTION: Remap Resolution
// ============================================================================

#[test]
fn unmapped_isbn_resolves_to_itself() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let key = isbn(ISBN_A);
    assert_eq!(store.resolve_remap(&key).expect("resolve"), key);
}

#[test]
fn mapped_isbn_resolves_one_hop_only() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    store.set_remap(&isbn(ISBN_A), &isbn(ISBN_B)).expect("remap a->b");
    store.set_remap(&isbn(ISBN_B), &isbn(ISBN_C)).expect("remap b->c");
    // Single-hop: A resolves to B even though B has its own entry.
    assert_eq!(store.resolve_remap(&isbn(ISBN_A)).expect("resolve"), isbn(ISBN_B));
    assert_eq!(store.resolve_remap(&isbn(ISBN_B)).expect("resolve"), isbn(ISBN_C));
}

#[test]
fn set_remap_replaces_an_existing_entry() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    store.set_remap(&isbn(ISBN_A), &isbn(ISBN_B)).expect("remap a->b");
    store.set_remap(&isbn(ISBN_A), &isbn(ISBN_C)).expect("remap a->c");
    assert_eq!(store.resolve_remap(&isbn(ISBN_A)).expect("resolve"), isbn(ISBN_C));
}

#[test]
fn self_remap_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let result = store.set_remap(&isbn(ISBN_A), &isbn(ISBN_A));
    assert!(matches!(result, Err(BookStoreError::InvalidInput(_))));
}

#[test]
fn clear_remap_reports_whether_an_entry_existed() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    store.set_remap(&isbn(ISBN_A), &isbn(ISBN_B)).expect("remap a->b");
    assert!(store.clear_remap(&isbn(ISBN_A)).expect("clear"));
    assert!(!store.clear_remap(&isbn(ISBN_A)).expect("clear again"));
    assert_eq!(store.resolve_remap(&isbn(ISBN_A)).expect("resolve"), isbn(ISBN_A));
}

#[test]
fn corrupt_remap_destination_is_an_integrity_fault() {
    let dir = TempDir::new().expect("tempdir");
    let (store, path) = fresh_store(&dir);
    let raw = raw_connection(&path);
    raw.execute(
        "INSERT INTO remap (src13, dest13) VALUES (?1, ?2)",
        params![ISBN_A, "not-an-isbn"],
    )
    .expect("plant corrupt row");
    let result = store.resolve_remap(&isbn(ISBN_A));
    assert!(matches!(result, Err(BookStoreError::Integrity(_))));
}

// ============================================================================
// SECTION: Service Configuration
// ============================================================================

#[test]
fn missing_rows_read_as_cache_only_mode() {
    let dir = TempDir::new().expect("tempdir");
    let (store, path) = fresh_store(&dir);
    assert_eq!(store.service_config().expect("config read"), None);
    // Credential alone is not a usable configuration.
    let raw = raw_connection(&path);
    raw.execute(
        "INSERT INTO keys (kname, kval) VALUES ('service_key', 'secret-credential')",
        params![],
    )
    .expect("plant credential");
    assert_eq!(store.service_config().expect("config read"), None);
}

#[test]
fn usable_configuration_roundtrips() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let lockfile = make_lockfile(&dir);
    store.set_service_key("secret-credential").expect("set key");
    store.set_service_lock(&lockfile).expect("set lock");
    let config = store.service_config().expect("config read").expect("usable config");
    assert_eq!(config.credential(), "secret-credential");
    assert_eq!(config.lock_path(), lockfile.as_path());
}

#[test]
fn relative_lock_path_reads_as_unusable() {
    let dir = TempDir::new().expect("tempdir");
    let (store, path) = fresh_store(&dir);
    store.set_service_key("secret-credential").expect("set key");
    let raw = raw_connection(&path);
    raw.execute(
        "INSERT INTO keys (kname, kval) VALUES ('service_lock', 'relative/lockfile')",
        params![],
    )
    .expect("plant relative path");
    assert_eq!(store.service_config().expect("config read"), None);
}

#[test]
fn deleted_lockfile_is_detected_on_the_next_read() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let lockfile = make_lockfile(&dir);
    store.set_service_key("secret-credential").expect("set key");
    store.set_service_lock(&lockfile).expect("set lock");
    assert!(store.service_config().expect("config read").is_some());
    fs::remove_file(&lockfile).expect("delete lockfile");
    assert_eq!(store.service_config().expect("config read"), None);
}

#[cfg(unix)]
#[test]
fn symlinked_lockfile_reads_as_unusable() {
    let dir = TempDir::new().expect("tempdir");
    let (store, path) = fresh_store(&dir);
    let target = make_lockfile(&dir);
    let link = dir.path().join("service.lock.link");
    std::os::unix::fs::symlink(&target, &link).expect("create symlink");
    store.set_service_key("secret-credential").expect("set key");
    let raw = raw_connection(&path);
    raw.execute(
        "INSERT INTO keys (kname, kval) VALUES ('service_lock', ?1)",
        params![link.to_str().expect("utf-8 path")],
    )
    .expect("plant symlink path");
    assert_eq!(store.service_config().expect("config read"), None);
}

#[test]
fn set_service_lock_rejects_unusable_paths() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let missing = dir.path().join("missing.lock");
    assert!(matches!(
        store.set_service_lock(&missing),
        Err(BookStoreError::InvalidInput(_))
    ));
    assert!(matches!(
        store.set_service_lock(Path::new("relative/lockfile")),
        Err(BookStoreError::InvalidInput(_))
    ));
}

// ============================================================================
// SECTION: Client Credentials
// ============================================================================

#[test]
fn registered_key_verifies_and_lists() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let key = store.register_client("integration shelf reader", 1_700_000_000).expect("register");
    assert_eq!(key.len(), 32);
    assert!(store.verify_client_key(&key).expect("verify"));
    let listed = store.list_clients().expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].token_id, key[..8].to_string());
    assert_eq!(listed[0].description, "integration shelf reader");
    assert_eq!(listed[0].entered_at, 1_700_000_000);
}

#[test]
fn altered_secret_fails_verification() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let key = store.register_client("reader", 1_700_000_000).expect("register");
    let mut altered = key.clone().into_bytes();
    let last = altered.len() - 1;
    altered[last] = if altered[last] == b'A' { b'B' } else { b'A' };
    let altered = String::from_utf8(altered).expect("ascii key");
    assert!(!store.verify_client_key(&altered).expect("verify altered"));
}

#[test]
fn malformed_and_unknown_keys_verify_false() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    assert!(!store.verify_client_key("").expect("verify empty"));
    assert!(!store.verify_client_key("too-short").expect("verify short"));
    assert!(
        !store
            .verify_client_key("AbCd1234_-efGH56ijKL78mnOP90qrST")
            .expect("verify unknown")
    );
}

#[test]
fn dropped_client_no_longer_verifies() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let key = store.register_client("reader", 1_700_000_000).expect("register");
    assert!(store.drop_client(&key[..8]).expect("drop"));
    assert!(!store.verify_client_key(&key).expect("verify dropped"));
    assert!(!store.drop_client(&key[..8]).expect("drop again"));
}

#[test]
fn blank_description_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _path) = fresh_store(&dir);
    let result = store.register_client("   ", 1_700_000_000);
    assert!(matches!(result, Err(BookStoreError::InvalidInput(_))));
}
