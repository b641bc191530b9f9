// crates/bibcache-engine/src/policy.rs
// ============================================================================
// Module: Fetch Retry Policy
// Description: Bounded retry counts and clamped delays for external contact.
// Purpose: Make pacing an explicit, validated parameter instead of ambient
//          module state.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The retry policy bounds how hard the single-flight fetcher leans on the
//! external service: attempt counts for metadata and cover-image fetches,
//! the delay between attempts, and the courtesy delay applied after the last
//! contact regardless of outcome. Attempt counts outside 1–8 are validation
//! faults; delays clamp to [0, 15] seconds at the point of use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum attempts for either retry loop (the first attempt counts).
pub const MIN_ATTEMPTS: u32 = 1;
/// Maximum attempts for either retry loop.
pub const MAX_ATTEMPTS: u32 = 8;
/// Upper clamp for every delay, in seconds.
pub const MAX_DELAY_SECS: f64 = 15.0;

/// Default metadata fetch attempts.
const DEFAULT_METADATA_ATTEMPTS: u32 = 3;
/// Default delay between metadata attempts (seconds).
const DEFAULT_METADATA_DELAY_SECS: f64 = 2.0;
/// Default cover-image fetch attempts.
const DEFAULT_IMAGE_ATTEMPTS: u32 = 3;
/// Default delay between image attempts (seconds).
const DEFAULT_IMAGE_DELAY_SECS: f64 = 1.0;
/// Default courtesy delay after the last contact (seconds).
const DEFAULT_FINAL_DELAY_SECS: f64 = 2.0;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Retry and pacing policy for one single-flight fetch.
///
/// # Invariants
/// - Attempt counts are within [`MIN_ATTEMPTS`]..=[`MAX_ATTEMPTS`] once
///   [`FetchPolicy::validate`] has passed.
/// - Delays are finite and non-negative once validated; values above
///   [`MAX_DELAY_SECS`] clamp rather than fail.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FetchPolicy {
    /// Attempts at fetching metadata JSON, first attempt included.
    #[serde(default = "default_metadata_attempts")]
    pub metadata_attempts: u32,
    /// Delay in seconds before each metadata attempt after the first.
    #[serde(default = "default_metadata_delay_secs")]
    pub metadata_delay_secs: f64,
    /// Attempts at fetching the cover image, first attempt included.
    #[serde(default = "default_image_attempts")]
    pub image_attempts: u32,
    /// Delay in seconds before each image attempt after the first.
    #[serde(default = "default_image_delay_secs")]
    pub image_delay_secs: f64,
    /// Courtesy delay in seconds after the last contact, any outcome.
    #[serde(default = "default_final_delay_secs")]
    pub final_delay_secs: f64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            metadata_attempts: DEFAULT_METADATA_ATTEMPTS,
            metadata_delay_secs: DEFAULT_METADATA_DELAY_SECS,
            image_attempts: DEFAULT_IMAGE_ATTEMPTS,
            image_delay_secs: DEFAULT_IMAGE_DELAY_SECS,
            final_delay_secs: DEFAULT_FINAL_DELAY_SECS,
        }
    }
}

impl FetchPolicy {
    /// Rejects out-of-range attempt counts and malformed delays.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Policy`] when an attempt count is outside
    /// 1–8 or a delay is negative or not finite.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (label, attempts) in [
            ("metadata_attempts", self.metadata_attempts),
            ("image_attempts", self.image_attempts),
        ] {
            if !(MIN_ATTEMPTS..=MAX_ATTEMPTS).contains(&attempts) {
                return Err(EngineError::Policy(format!(
                    "{label} must be between {MIN_ATTEMPTS} and {MAX_ATTEMPTS}, got {attempts}"
                )));
            }
        }
        for (label, delay) in [
            ("metadata_delay_secs", self.metadata_delay_secs),
            ("image_delay_secs", self.image_delay_secs),
            ("final_delay_secs", self.final_delay_secs),
        ] {
            if !delay.is_finite() || delay < 0.0 {
                return Err(EngineError::Policy(format!(
                    "{label} must be a finite non-negative number of seconds, got {delay}"
                )));
            }
        }
        Ok(())
    }

    /// Delay applied before each metadata retry.
    #[must_use]
    pub fn metadata_delay(&self) -> Duration {
        clamp_delay(self.metadata_delay_secs)
    }

    /// Delay applied before each image retry.
    #[must_use]
    pub fn image_delay(&self) -> Duration {
        clamp_delay(self.image_delay_secs)
    }

    /// Courtesy delay applied after the last external contact.
    #[must_use]
    pub fn final_delay(&self) -> Duration {
        clamp_delay(self.final_delay_secs)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Clamps a delay in seconds to [0, [`MAX_DELAY_SECS`]].
fn clamp_delay(secs: f64) -> Duration {
    if secs.is_finite() {
        Duration::from_secs_f64(secs.clamp(0.0, MAX_DELAY_SECS))
    } else {
        Duration::ZERO
    }
}

/// Returns the default metadata attempt count.
const fn default_metadata_attempts() -> u32 {
    DEFAULT_METADATA_ATTEMPTS
}

/// Returns the default metadata retry delay.
const fn default_metadata_delay_secs() -> f64 {
    DEFAULT_METADATA_DELAY_SECS
}

/// Returns the default image attempt count.
const fn default_image_attempts() -> u32 {
    DEFAULT_IMAGE_ATTEMPTS
}

/// Returns the default image retry delay.
const fn default_image_delay_secs() -> f64 {
    DEFAULT_IMAGE_DELAY_SECS
}

/// Returns the default courtesy delay.
const fn default_final_delay_secs() -> f64 {
    DEFAULT_FINAL_DELAY_SECS
}
