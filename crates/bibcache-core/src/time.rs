// crates/bibcache-core/src/time.rs
// ============================================================================
// Module: bibcache Time Model
// Description: Injected wall-clock reads and sleeps for deterministic pacing.
// Purpose: Keep timestamps and retry delays observable instead of ambient.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Components in bibcache never read wall-clock time or sleep directly; they
//! go through the [`Clock`] trait supplied at construction. Production code
//! passes [`SystemClock`]; tests pass a recording fake so retry pacing and
//! stored timestamps become assertable values rather than wall-clock effects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::thread;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

// ============================================================================
// SECTION: Clock Trait
// ============================================================================

/// Source of wall-clock timestamps and blocking delays.
///
/// # Invariants
/// - `now_unix` returns seconds since the Unix epoch in UTC.
/// - `sleep` blocks the calling thread for at least the requested duration.
pub trait Clock {
    /// Returns the current Unix timestamp in whole seconds (UTC).
    fn now_unix(&self) -> i64;

    /// Blocks the calling thread for the given duration.
    fn sleep(&self, duration: Duration);
}

// ============================================================================
// SECTION: System Clock
// ============================================================================

/// Real wall-clock implementation backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
