// crates/bibcache-core/src/lib.rs
// ============================================================================
// Module: bibcache Core Library
// Description: Dependency-light primitives shared by every bibcache crate.
// Purpose: Provide the ISBN codec, the injected clock, and client-key helpers.
// Dependencies: base64, sha2
// ============================================================================

//! ## Overview
//! Core primitives for the bibcache book-metadata cache: ISBN text
//! normalization and checksum validation, the [`Clock`] abstraction that keeps
//! wall-clock reads and retry pacing injectable, and parsing/digest helpers
//! for client API keys. Everything here is pure computation; persistence and
//! network concerns live in the store and engine crates.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod isbn;
pub mod time;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use auth::ClientKey;
pub use isbn::Isbn13;
pub use isbn::check_digit;
pub use isbn::is_valid_isbn13;
pub use isbn::normalize_text;
pub use time::Clock;
pub use time::SystemClock;
