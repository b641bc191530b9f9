// crates/bibcache-engine/tests/lock_race_unit.rs
// ============================================================================
// Module: Single-Flight Race Unit Tests
// Description: Concurrency test for the shared-lockfile fetch protocol.
// Purpose: Prove that racing cache-miss callers produce exactly one external
//          fetch and one persisted record.
// ============================================================================

//! ## Overview
//! Two callers race the same cache-miss ISBN over a shared lockfile, each
//! with its own store handle and lockfile descriptor (the same isolation two
//! unrelated processes would have). The expected outcome: exactly one fetch
//! reaches the scripted service, both callers observe success, and no
//! unique-constraint violation surfaces to either of them.

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
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use bibcache_core::Isbn13;
use bibcache_core::SystemClock;
use bibcache_engine::FetchPolicy;
use bibcache_engine::MetadataSource;
use bibcache_engine::QueryEngine;
use bibcache_store_sqlite::BookStore;
use bibcache_store_sqlite::BookStoreConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// The ISBN both callers race on.
const ISBN_A: &str = "9780306406157";
/// Metadata payload served to the winning fetch.
const SAMPLE_JSON: &str = r#"{"book":{"title":"Sample"}}"#;

fn isbn(text: &str) -> Isbn13 {
    Isbn13::from_canonical(text).expect("test isbn is canonical")
}

/// Fetch client that counts calls and lingers long enough for the loser to
/// queue up behind the advisory lock.
struct SlowCountingSource {
    /// Total metadata calls across both racing callers.
    calls: AtomicU32,
}

impl MetadataSource for SlowCountingSource {
    fn fetch_metadata(&self, _credential: &str, _isbn13: &Isbn13) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(150));
        Some(SAMPLE_JSON.to_string())
    }

    fn fetch_image(&self, _url: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Zero-delay policy so the race is dominated by the lock, not pacing.
fn instant_policy() -> FetchPolicy {
    FetchPolicy {
        metadata_delay_secs: 0.0,
        image_delay_secs: 0.0,
        final_delay_secs: 0.0,
        ..FetchPolicy::default()
    }
}

// ============================================================================
// SECTION: Race
// ============================================================================

#[test]
fn racing_callers_share_one_fetch_and_one_record() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("cache.db");
    let lockfile = dir.path().join("service.lock");
    fs::write(&lockfile, b"").expect("create lockfile");

    // Bootstrap and configure through a setup handle, then drop it so the
    // racers own their connections outright.
    let setup = BookStore::create(&db_path, &BookStoreConfig::default()).expect("create store");
    setup.set_service_key("secret-credential").expect("set key");
    setup.set_service_lock(&lockfile).expect("set lock");
    drop(setup);

    let store_one = BookStore::open(&db_path, &BookStoreConfig::default()).expect("open store");
    let store_two = BookStore::open(&db_path, &BookStoreConfig::default()).expect("open store");
    let source = SlowCountingSource {
        calls: AtomicU32::new(0),
    };
    let clock = SystemClock;

    let (outcome_one, outcome_two) = thread::scope(|scope| {
        let first = scope.spawn(|| {
            let engine = QueryEngine::new(&store_one, &source, &clock, instant_policy())
                .expect("build engine");
            engine.query(&isbn(ISBN_A))
        });
        let second = scope.spawn(|| {
            let engine = QueryEngine::new(&store_two, &source, &clock, instant_policy())
                .expect("build engine");
            engine.query(&isbn(ISBN_A))
        });
        (first.join().expect("first caller"), second.join().expect("second caller"))
    });

    // Both callers observe success and neither sees a constraint violation.
    assert!(outcome_one.expect("first outcome"));
    assert!(outcome_two.expect("second outcome"));
    // Exactly one external fetch happened across both callers.
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    // The record is present through either handle.
    let verify = BookStore::open(&db_path, &BookStoreConfig::default()).expect("open store");
    assert!(verify.is_cached(&isbn(ISBN_A), false).expect("cache check"));
    assert_eq!(
        verify.metadata_json(&isbn(ISBN_A)).expect("json read").as_deref(),
        Some(SAMPLE_JSON)
    );
}
