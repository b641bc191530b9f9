// crates/bibcache-engine/src/error.rs
// ============================================================================
// Module: Engine Errors
// Description: Error taxonomy for the fetch and sync paths.
// Purpose: Keep transient external faults out of the error channel entirely.
// Dependencies: bibcache-store-sqlite, thiserror
// ============================================================================

//! ## Overview
//! Engine errors cover validation faults, storage faults, and coordination
//! faults. Transient external faults (network errors, non-200 responses,
//! malformed payloads) are deliberately not represented here: the fetch
//! protocol absorbs them into boolean outcomes per the retry policy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bibcache_store_sqlite::BookStoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by the query, fetch, and sync paths.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying store fault, including integrity faults.
    #[error(transparent)]
    Store(#[from] BookStoreError),
    /// The shared service lockfile could not be opened or locked.
    #[error("cannot acquire service lockfile {path}: {message}")]
    Lockfile {
        /// Path of the lockfile that failed.
        path: String,
        /// Operating-system failure description.
        message: String,
    },
    /// The retry policy was rejected before any I/O.
    #[error("invalid fetch policy: {0}")]
    Policy(String),
    /// The outbound HTTP client could not be constructed.
    #[error("http client could not be constructed: {0}")]
    ClientBuild(String),
    /// The sync input stream could not be read.
    #[error("sync input could not be read: {0}")]
    SyncInput(String),
    /// The sync list contains a line that is not a valid ISBN.
    #[error("sync list contains an invalid isbn: {0}")]
    SyncList(String),
    /// An ISBN could not be loaded within the sync retry ceiling.
    #[error("sync could not load isbn {0}")]
    SyncExhausted(String),
}
