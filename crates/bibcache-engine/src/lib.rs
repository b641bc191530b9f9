// crates/bibcache-engine/src/lib.rs
// ============================================================================
// Module: bibcache Engine Library
// Description: Cache-miss fetch protocol and query orchestration.
// Purpose: Export the fetch client, single-flight fetcher, query engine, and
//          sync driver.
// Dependencies: bibcache-core, bibcache-store-sqlite, fs4, reqwest,
//               serde_json, thiserror
// ============================================================================

//! ## Overview
//! The engine crate drives the "cache miss → fetch → persist" path. The
//! [`QueryEngine`] resolves remaps and answers from cache when possible;
//! otherwise it hands the miss to the [`single_flight`] protocol, which holds
//! an exclusive cross-process advisory lock for the duration of external
//! contact so that cooperating processes never fetch the same ISBN twice.
//! The [`SyncDriver`] repeats queries over a line-oriented ISBN list until
//! every entry is cached or the batch fails.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;
mod error;
pub mod policy;
pub mod query;
pub mod single_flight;
pub mod sync;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use client::HttpMetadataSource;
pub use client::HttpSourceConfig;
pub use client::MetadataSource;
pub use error::EngineError;
pub use policy::FetchPolicy;
pub use query::QueryEngine;
pub use sync::SyncDriver;
pub use sync::SyncProgress;
