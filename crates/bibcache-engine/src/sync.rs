// crates/bibcache-engine/src/sync.rs
// ============================================================================
// Module: Sync Driver
// Description: Batch convergence loop over a line-oriented ISBN list.
// Purpose: Drive the query engine until every listed ISBN is cached, or fail
//          the whole batch on the first unresolvable entry.
// Dependencies: bibcache-core
// ============================================================================

//! ## Overview
//! The sync driver consumes raw ISBN lines and repeatedly invokes the query
//! engine per ISBN up to a bounded ceiling. A line that does not canonicalize
//! aborts the whole batch before any attempt on it; an ISBN that exhausts
//! the ceiling fails the batch immediately. Records persisted before the
//! failure point remain — the operation is transactional per ISBN, not
//! across the batch. Progress is reported through an observer hook so the
//! driver stays free of output concerns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::BufRead;

use bibcache_core::Isbn13;

use crate::error::EngineError;
use crate::query::QueryEngine;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-ISBN query attempts before the batch fails.
pub const DEFAULT_LONG_RETRY: u32 = 20;

// ============================================================================
// SECTION: Progress Observer
// ============================================================================

/// Observer for per-ISBN sync outcomes.
///
/// Kept dependency-light so deployments can report progress however they
/// like; the CLI writes one diagnostic line per event.
pub trait SyncProgress {
    /// Called once for each ISBN confirmed present in the cache.
    fn resolved(&mut self, isbn13: &Isbn13);

    /// Called when an ISBN exhausts the retry ceiling, before the batch
    /// fails.
    fn exhausted(&mut self, isbn13: &Isbn13);
}

// ============================================================================
// SECTION: Sync Driver
// ============================================================================

/// Batch driver that converges a list of ISBNs into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDriver {
    /// Per-ISBN query attempts before the batch fails.
    long_retry: u32,
}

impl Default for SyncDriver {
    fn default() -> Self {
        Self {
            long_retry: DEFAULT_LONG_RETRY,
        }
    }
}

impl SyncDriver {
    /// Creates a driver with a custom retry ceiling (minimum one attempt).
    #[must_use]
    pub fn new(long_retry: u32) -> Self {
        Self {
            long_retry: long_retry.max(1),
        }
    }

    /// Runs the batch to convergence or first failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SyncInput`] when the input stream cannot be
    /// read, [`EngineError::SyncList`] for a line that is not a valid ISBN
    /// (the batch aborts without attempting it), and
    /// [`EngineError::SyncExhausted`] when an ISBN stays unresolved after
    /// the retry ceiling. Store and lockfile faults propagate unchanged.
    pub fn run(
        &self,
        engine: &QueryEngine<'_>,
        input: impl BufRead,
        progress: &mut dyn SyncProgress,
    ) -> Result<(), EngineError> {
        for line in input.lines() {
            let line = line.map_err(|err| EngineError::SyncInput(err.to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some(isbn13) = Isbn13::canonicalize(trimmed) else {
                return Err(EngineError::SyncList(trimmed.to_string()));
            };
            let mut loaded = false;
            for _ in 0..self.long_retry {
                if engine.query(&isbn13)? {
                    loaded = true;
                    break;
                }
            }
            if !loaded {
                progress.exhausted(&isbn13);
                return Err(EngineError::SyncExhausted(isbn13.as_str().to_string()));
            }
            progress.resolved(&isbn13);
        }
        Ok(())
    }
}
