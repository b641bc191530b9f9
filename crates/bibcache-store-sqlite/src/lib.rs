// crates/bibcache-store-sqlite/src/lib.rs
// ============================================================================
// Module: bibcache SQLite Store Library
// Description: Durable book-metadata cache backed by SQLite.
// Purpose: Export the transactional store and its configuration types.
// Dependencies: bibcache-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! SQLite-backed persistence for the bibcache system: cached book records,
//! the one-hop ISBN remap table, external-service configuration, and client
//! credentials. Every operation runs in its own transaction and rolls back
//! on any failure path, so readers never observe a half-written record.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use store::BookStore;
pub use store::BookStoreConfig;
pub use store::BookStoreError;
pub use store::ClientSummary;
pub use store::ServiceConfig;
