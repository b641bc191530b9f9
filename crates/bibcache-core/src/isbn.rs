// crates/bibcache-core/src/isbn.rs
// ============================================================================
// Module: ISBN Codec
// Description: ISBN normalization, check-digit arithmetic, and canonical keys.
// Purpose: Collapse ISBN-10 and ISBN-13 spellings to one validated cache key.
// Dependencies: none
// ============================================================================

//! ## Overview
//! This module implements the deterministic ISBN codec used as the cache-key
//! gate for the whole system. Raw user text is normalized, check digits are
//! verified, and ISBN-10 numbers are converted to their ISBN-13 form. The
//! [`Isbn13`] newtype carries the validity invariant through the type system
//! so downstream components never re-derive it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

// ============================================================================
// SECTION: Text Normalization
// ============================================================================

/// Normalizes raw ISBN text down to the characters that matter.
///
/// ASCII whitespace (tab, carriage return, line feed, space) and ASCII
/// punctuation/symbols are dropped, ASCII lowercase letters are mapped to
/// uppercase (ISBN-10 check digits may be an `X`), and any control or
/// extended character passes through unchanged. The result is not guaranteed
/// to be a valid ISBN.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_lowercase() {
            normalized.push(ch.to_ascii_uppercase());
        } else if ch.is_ascii_uppercase() || ch.is_ascii_digit() {
            normalized.push(ch);
        } else if matches!(ch, '\t' | '\r' | '\n' | ' ') || ch.is_ascii_graphic() {
            // Whitespace, punctuation, and symbols are dropped; the
            // alphanumeric cases were already taken above.
        } else {
            normalized.push(ch);
        }
    }
    normalized
}

// ============================================================================
// SECTION: Check Digits
// ============================================================================

/// Computes the check digit over the leading digits of an ISBN.
///
/// A 9-digit input yields the ISBN-10 check digit: the weighted sum
/// `Σ (10 - i) · d_i` for `i = 0..8` is reduced mod 11, the digit is
/// `11 - r` when the remainder is positive and `0` otherwise, and the value
/// 10 maps to `'X'`. A 12-digit input yields the ISBN-13 check digit via
/// alternating weights 1 and 3 reduced mod 10. Any other length, or any
/// non-digit character, yields `None`.
#[must_use]
pub fn check_digit(digits: &str) -> Option<char> {
    let bytes = digits.as_bytes();
    if !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    match bytes.len() {
        9 => {
            let mut weighted = 0_u32;
            let mut weight = 10_u32;
            for byte in bytes {
                weighted += weight * u32::from(byte - b'0');
                weight -= 1;
            }
            let remainder = weighted % 11;
            let check = if remainder > 0 { 11 - remainder } else { 0 };
            if check == 10 { Some('X') } else { char::from_digit(check, 10) }
        }
        12 => {
            let mut weighted = 0_u32;
            for (index, byte) in bytes.iter().enumerate() {
                let weight = if index % 2 == 1 { 3 } else { 1 };
                weighted += weight * u32::from(byte - b'0');
            }
            let remainder = weighted % 10;
            let check = if remainder > 0 { 10 - remainder } else { 0 };
            char::from_digit(check, 10)
        }
        _ => None,
    }
}

/// Checks whether a string is a valid, canonical ISBN-13.
///
/// Passes only for exactly 13 ASCII decimal digits whose alternating
/// {1,3}-weighted sum is congruent to zero mod 10. Every other component
/// uses this as the gate for trusting an ISBN string.
#[must_use]
pub fn is_valid_isbn13(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    if bytes.len() != 13 {
        return false;
    }
    let mut weighted = 0_u32;
    for (index, byte) in bytes.iter().enumerate() {
        if !byte.is_ascii_digit() {
            return false;
        }
        let weight = if index % 2 == 1 { 3 } else { 1 };
        weighted += weight * u32::from(byte - b'0');
    }
    weighted % 10 == 0
}

// ============================================================================
// SECTION: Canonical ISBN-13
// ============================================================================

/// Canonical ISBN-13 cache key.
///
/// # Invariants
/// - Always exactly 13 ASCII decimal digits.
/// - The final digit is the correct alternating-weight check digit, i.e. the
///   wrapped string passes [`is_valid_isbn13`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Isbn13(String);

impl Isbn13 {
    /// Normalizes and canonicalizes raw ISBN text to an ISBN-13.
    ///
    /// Length-10 input validates the ISBN-10 check digit, then recomputes the
    /// ISBN-13 check digit over `"978"` plus the first nine digits. Length-13
    /// input validates its own check digit and is returned unchanged. Any
    /// other length, or a check-digit mismatch, yields `None`. The operation
    /// is idempotent: canonicalizing a canonical ISBN-13 returns it as is.
    #[must_use]
    pub fn canonicalize(text: &str) -> Option<Self> {
        let normalized = normalize_text(text);
        if !normalized.is_ascii() {
            return None;
        }
        match normalized.len() {
            10 => {
                let (main, given) = normalized.split_at(9);
                let computed = check_digit(main)?;
                if given.chars().next()? != computed {
                    return None;
                }
                let mut converted = String::with_capacity(13);
                converted.push_str("978");
                converted.push_str(main);
                let check13 = check_digit(&converted)?;
                converted.push(check13);
                Some(Self(converted))
            }
            13 => {
                let (main, given) = normalized.split_at(12);
                let computed = check_digit(main)?;
                (given.chars().next()? == computed).then(|| Self(normalized))
            }
            _ => None,
        }
    }

    /// Wraps a string that is already a canonical ISBN-13.
    ///
    /// Returns `None` unless the input passes [`is_valid_isbn13`]. Used at
    /// trust boundaries such as remap destinations read back from storage.
    #[must_use]
    pub fn from_canonical(candidate: impl Into<String>) -> Option<Self> {
        let owned = candidate.into();
        is_valid_isbn13(&owned).then(|| Self(owned))
    }

    /// Returns the canonical 13-digit string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn13 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Isbn13 {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
