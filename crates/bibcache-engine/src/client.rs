// crates/bibcache-engine/src/client.rs
// ============================================================================
// Module: Metadata Fetch Client
// Description: Stateless, non-retrying HTTP access to the external service.
// Purpose: One attempt per call; every failure collapses to an absent result.
// Dependencies: bibcache-core, reqwest, serde, serde_json
// ============================================================================

//! ## Overview
//! The fetch client performs exactly one network attempt per call and never
//! lets a transport or decoding failure escape as an error: the single-flight
//! fetcher owns retries and pacing, so this layer reports `None` for every
//! failure mode. Metadata responses must be UTF-8 JSON objects carrying an
//! object-typed `book` field; cover-image responses are accepted as opaque
//! bytes with no format validation. No client-side timeout is applied; the
//! surrounding deployment may impose one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bibcache_core::Isbn13;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::Value;

use crate::error::EngineError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default endpoint base; the ISBN-13 is appended verbatim.
pub const DEFAULT_METADATA_ENDPOINT: &str = "https://api2.isbndb.com/book/";
/// Default user agent for outbound requests.
const DEFAULT_USER_AGENT: &str = concat!("bibcache/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// SECTION: Source Trait
// ============================================================================

/// One-shot access to the external metadata service.
///
/// # Invariants
/// - Implementations perform at most one network attempt per call.
/// - Failures of any kind are reported as `None`, never as panics or errors.
pub trait MetadataSource {
    /// Fetches the metadata JSON for one ISBN, or `None` on any failure.
    ///
    /// A successful result has already been verified to parse as a JSON
    /// object containing an object-typed `book` field.
    fn fetch_metadata(&self, credential: &str, isbn13: &Isbn13) -> Option<String>;

    /// Fetches raw cover-image bytes from a URL, or `None` on any failure.
    fn fetch_image(&self, url: &str) -> Option<Vec<u8>>;
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the HTTP metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpSourceConfig {
    /// Endpoint base the ISBN-13 is appended to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// User agent string for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Returns the default endpoint base.
fn default_endpoint() -> String {
    DEFAULT_METADATA_ENDPOINT.to_string()
}

/// Returns the default user agent.
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

// ============================================================================
// SECTION: HTTP Source
// ============================================================================

/// Production metadata source over a blocking HTTP client.
pub struct HttpMetadataSource {
    /// Source configuration.
    config: HttpSourceConfig,
    /// Shared blocking HTTP client.
    client: Client,
}

impl HttpMetadataSource {
    /// Creates a new HTTP metadata source.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ClientBuild`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: HttpSourceConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| EngineError::ClientBuild(err.to_string()))?;
        Ok(Self { config, client })
    }
}

impl MetadataSource for HttpMetadataSource {
    fn fetch_metadata(&self, credential: &str, isbn13: &Isbn13) -> Option<String> {
        let url = format!("{}{}", self.config.endpoint, isbn13);
        let authorization = HeaderValue::from_str(credential).ok()?;
        let response = self.client.get(url).header(AUTHORIZATION, authorization).send().ok()?;
        if response.status() != StatusCode::OK {
            return None;
        }
        let body = response.bytes().ok()?;
        let text = String::from_utf8(body.to_vec()).ok()?;
        has_book_object(&text).then_some(text)
    }

    fn fetch_image(&self, url: &str) -> Option<Vec<u8>> {
        let response = self.client.get(url).send().ok()?;
        if response.status() != StatusCode::OK {
            return None;
        }
        Some(response.bytes().ok()?.to_vec())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Checks that a payload is a JSON object whose `book` field is an object.
fn has_book_object(payload: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return false;
    };
    value
        .as_object()
        .and_then(|object| object.get("book"))
        .is_some_and(Value::is_object)
}
