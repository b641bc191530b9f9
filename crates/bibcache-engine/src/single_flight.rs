// crates/bibcache-engine/src/single_flight.rs
// ============================================================================
// Module: Single-Flight Fetcher
// Description: Cross-process exclusive fetch with bounded retry and pacing.
// Purpose: Guarantee at most one in-flight external fetch per ISBN across
//          every process sharing the lockfile.
// Dependencies: bibcache-core, bibcache-store-sqlite, fs4, serde_json
// ============================================================================

//! ## Overview
//! The single-flight protocol serializes external-service contact across
//! unrelated OS processes through one advisory lockfile. The holder re-checks
//! the cache under an immediate transaction (another process may have filled
//! it while this one waited on the lock), then drives the fetch client
//! through the bounded retry loops and persists the complete record in one
//! write. The lock acquisition blocks without a timeout: the external
//! service's single-credential constraint already implies serialization, so
//! a stalled holder stalling its peers is the intended behavior.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;

use bibcache_core::Clock;
use bibcache_core::Isbn13;
use bibcache_store_sqlite::BookStore;
use bibcache_store_sqlite::ServiceConfig;
use fs4::FileExt;
use serde_json::Value;

use crate::client::MetadataSource;
use crate::error::EngineError;
use crate::policy::FetchPolicy;

// ============================================================================
// SECTION: Lock Guard
// ============================================================================

/// Holds the exclusive advisory lock; releases it on every exit path.
struct LockGuard {
    /// Open handle on the shared lockfile.
    file: File,
}

impl LockGuard {
    /// Opens the lockfile and blocks until the exclusive lock is granted.
    fn acquire(service: &ServiceConfig) -> Result<Self, EngineError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(service.lock_path())
            .map_err(|err| EngineError::Lockfile {
                path: service.lock_path().display().to_string(),
                message: err.to_string(),
            })?;
        file.lock_exclusive().map_err(|err| EngineError::Lockfile {
            path: service.lock_path().display().to_string(),
            message: err.to_string(),
        })?;
        Ok(Self { file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Release failures cannot be reported from drop; closing the handle
        // releases the advisory lock regardless.
        let _ = self.file.unlock();
    }
}

// ============================================================================
// SECTION: Single Flight
// ============================================================================

/// One single-flight fetch attempt over a shared store and fetch client.
pub struct SingleFlight<'a> {
    /// Store the record is double-checked against and persisted into.
    store: &'a BookStore,
    /// Fetch client performing the one-shot network attempts.
    source: &'a dyn MetadataSource,
    /// Injected clock for timestamps and pacing.
    clock: &'a dyn Clock,
    /// Validated retry and pacing policy.
    policy: &'a FetchPolicy,
}

impl<'a> SingleFlight<'a> {
    /// Creates a fetcher over the given collaborators.
    ///
    /// The policy is assumed validated by the constructing engine.
    #[must_use]
    pub fn new(
        store: &'a BookStore,
        source: &'a dyn MetadataSource,
        clock: &'a dyn Clock,
        policy: &'a FetchPolicy,
    ) -> Self {
        Self {
            store,
            source,
            clock,
            policy,
        }
    }

    /// Runs the exclusive fetch protocol for one ISBN.
    ///
    /// Returns `Ok(true)` when the record is in the cache on return (fetched
    /// by this process or by the peer that held the lock first) and
    /// `Ok(false)` when the external service could not supply the record;
    /// transient external failures never surface as errors.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Lockfile`] when the lockfile cannot be opened
    /// or locked, and propagates store faults from the double-check and the
    /// final insert.
    pub fn fetch(&self, service: &ServiceConfig, isbn13: &Isbn13) -> Result<bool, EngineError> {
        let guard = LockGuard::acquire(service)?;
        let outcome = self.fetch_under_lock(service, isbn13);
        drop(guard);
        outcome
    }

    /// Fetch body executed while the exclusive lock is held.
    fn fetch_under_lock(
        &self,
        service: &ServiceConfig,
        isbn13: &Isbn13,
    ) -> Result<bool, EngineError> {
        // Double-check under an immediate transaction: a peer may have
        // persisted the record while this process waited on the lock, and a
        // hit here means no external contact is owed at all.
        if self.store.is_cached(isbn13, true)? {
            return Ok(true);
        }

        let Some(metadata) = self.retry_metadata(service, isbn13) else {
            self.clock.sleep(self.policy.final_delay());
            return Ok(false);
        };

        let mut cover = None;
        if let Some(image_url) = extract_image_url(&metadata) {
            cover = self.retry_image(&image_url);
            if cover.is_none() {
                // A book with an unreachable cover is treated as unavailable:
                // the metadata is discarded and nothing is persisted.
                self.clock.sleep(self.policy.final_delay());
                return Ok(false);
            }
        }

        self.store.insert_record(isbn13, self.clock.now_unix(), &metadata, cover.as_deref())?;
        self.clock.sleep(self.policy.final_delay());
        Ok(true)
    }

    /// Metadata retry loop: bounded attempts, stop at first success.
    fn retry_metadata(&self, service: &ServiceConfig, isbn13: &Isbn13) -> Option<String> {
        for attempt in 0..self.policy.metadata_attempts {
            if attempt > 0 {
                self.clock.sleep(self.policy.metadata_delay());
            }
            if let Some(metadata) = self.source.fetch_metadata(service.credential(), isbn13) {
                return Some(metadata);
            }
        }
        None
    }

    /// Image retry loop: bounded attempts, stop at first success.
    fn retry_image(&self, image_url: &str) -> Option<Vec<u8>> {
        for attempt in 0..self.policy.image_attempts {
            if attempt > 0 {
                self.clock.sleep(self.policy.image_delay());
            }
            if let Some(bytes) = self.source.fetch_image(image_url) {
                return Some(bytes);
            }
        }
        None
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the optional cover-image URL from verified metadata.
///
/// The payload was already verified to be a JSON object with a `book`
/// object, so this looks exactly one field deeper and treats anything but a
/// string value as image-absent.
fn extract_image_url(metadata: &str) -> Option<String> {
    let value: Value = serde_json::from_str(metadata).ok()?;
    let url = value.get("book")?.get("image")?.as_str()?;
    Some(url.to_string())
}
