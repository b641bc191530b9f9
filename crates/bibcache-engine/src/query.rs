// crates/bibcache-engine/src/query.rs
// ============================================================================
// Module: Query Engine
// Description: Per-ISBN cache lookup with fetch-on-miss delegation.
// Purpose: Resolve remaps, answer from cache, and escalate misses to the
//          single-flight fetcher.
// Dependencies: bibcache-core, bibcache-store-sqlite
// ============================================================================

//! ## Overview
//! The query engine is the public per-ISBN operation. `query` resolves the
//! one-hop remap, answers `true` from cache, and on a miss reads the service
//! configuration: an absent or unusable configuration means cache-only mode
//! (a legitimate `false`, not an error), while a usable one delegates to the
//! single-flight protocol. The metadata and cover read-throughs never
//! trigger a fetch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bibcache_core::Clock;
use bibcache_core::Isbn13;
use bibcache_store_sqlite::BookStore;

use crate::client::MetadataSource;
use crate::error::EngineError;
use crate::policy::FetchPolicy;
use crate::single_flight::SingleFlight;

// ============================================================================
// SECTION: Query Engine
// ============================================================================

/// Per-ISBN query surface over a store, fetch client, and clock.
///
/// # Invariants
/// - The held policy has passed validation; the single-flight fetcher relies
///   on it.
/// - Callers present canonical ISBNs; the [`Isbn13`] type carries that
///   invariant from the normalization boundary.
pub struct QueryEngine<'a> {
    /// Cache store and remap/coordination state.
    store: &'a BookStore,
    /// One-shot fetch client for cache misses.
    source: &'a dyn MetadataSource,
    /// Injected clock for timestamps and pacing.
    clock: &'a dyn Clock,
    /// Validated retry and pacing policy.
    policy: FetchPolicy,
}

impl<'a> QueryEngine<'a> {
    /// Creates a query engine after validating the policy.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Policy`] when the policy is out of range.
    pub fn new(
        store: &'a BookStore,
        source: &'a dyn MetadataSource,
        clock: &'a dyn Clock,
        policy: FetchPolicy,
    ) -> Result<Self, EngineError> {
        policy.validate()?;
        Ok(Self {
            store,
            source,
            clock,
            policy,
        })
    }

    /// Ensures the record for an ISBN is cached, fetching it if permitted.
    ///
    /// Returns `true` when the record is in the cache on return and `false`
    /// when it could not be obtained — either because the deployment runs
    /// cache-only (no usable service configuration) or because the external
    /// service could not supply it within the retry policy.
    ///
    /// # Errors
    ///
    /// Propagates store faults (including remap integrity faults) and
    /// lockfile acquisition failures.
    pub fn query(&self, isbn13: &Isbn13) -> Result<bool, EngineError> {
        let resolved = self.store.resolve_remap(isbn13)?;
        if self.store.is_cached(&resolved, false)? {
            return Ok(true);
        }
        let Some(service) = self.store.service_config()? else {
            return Ok(false);
        };
        SingleFlight::new(self.store, self.source, self.clock, &self.policy)
            .fetch(&service, &resolved)
    }

    /// Reads cached metadata JSON after remap resolution; never fetches.
    ///
    /// # Errors
    ///
    /// Propagates store faults.
    pub fn metadata_json(&self, isbn13: &Isbn13) -> Result<Option<String>, EngineError> {
        let resolved = self.store.resolve_remap(isbn13)?;
        Ok(self.store.metadata_json(&resolved)?)
    }

    /// Reads a cached cover image after remap resolution; never fetches.
    ///
    /// # Errors
    ///
    /// Propagates store faults.
    pub fn cover_image(&self, isbn13: &Isbn13) -> Result<Option<Vec<u8>>, EngineError> {
        let resolved = self.store.resolve_remap(isbn13)?;
        Ok(self.store.cover_image(&resolved)?)
    }
}
