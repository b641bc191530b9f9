// crates/bibcache-core/src/auth.rs
// ============================================================================
// Module: Client Key Helpers
// Description: Parsing and digest computation for caller API keys.
// Purpose: Split presented keys into identifier and secret, hash the secret.
// Dependencies: base64, sha2
// ============================================================================

//! ## Overview
//! Client API keys are 32 URL-safe base64 characters: the first eight form
//! the public token identifier, the remaining twenty-four the secret. Only
//! the SHA-256 digest of the secret is ever persisted; verification hashes
//! the presented secret and compares digests. The constant-time comparison
//! itself lives next to the stored digest in the store crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Total length of a client API key in characters.
pub const CLIENT_KEY_LEN: usize = 32;
/// Length of the public token identifier prefix.
pub const TOKEN_ID_LEN: usize = 8;

// ============================================================================
// SECTION: Client Key
// ============================================================================

/// Parsed client API key.
///
/// # Invariants
/// - `token_id` is exactly [`TOKEN_ID_LEN`] URL-safe base64 characters.
/// - `secret` is the remaining [`CLIENT_KEY_LEN`]` - `[`TOKEN_ID_LEN`]
///   URL-safe base64 characters and never leaves this type unhashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey {
    /// Public identifier half of the key.
    token_id: String,
    /// Secret half of the key.
    secret: String,
}

impl ClientKey {
    /// Parses a presented API key into its identifier and secret halves.
    ///
    /// Surrounding whitespace is tolerated. Returns `None` when the trimmed
    /// key is not exactly [`CLIENT_KEY_LEN`] URL-safe base64 characters.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.len() != CLIENT_KEY_LEN {
            return None;
        }
        if !trimmed.bytes().all(is_url_base64_digit) {
            return None;
        }
        let (token_id, secret) = trimmed.split_at(TOKEN_ID_LEN);
        Some(Self {
            token_id: token_id.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Returns the public token identifier.
    #[must_use]
    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    /// Returns the base64-encoded SHA-256 digest of the secret half.
    ///
    /// The digest is computed over the ASCII bytes of the secret as
    /// presented; this is the exact value persisted at registration time.
    #[must_use]
    pub fn secret_digest(&self) -> String {
        let digest = Sha256::digest(self.secret.as_bytes());
        BASE64.encode(digest)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Checks whether a string is a well-formed public token identifier.
#[must_use]
pub fn is_token_id(candidate: &str) -> bool {
    candidate.len() == TOKEN_ID_LEN && candidate.bytes().all(is_url_base64_digit)
}

/// Returns true for characters of the URL-safe base64 alphabet.
const fn is_url_base64_digit(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'
}
