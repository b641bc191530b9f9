// crates/bibcache-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Book Store
// Description: Transactional cache store for book metadata and coordination
//              state.
// Purpose: Persist cache records, remaps, service config, and client keys.
// Dependencies: bibcache-core, base64, rand, rusqlite, serde, subtle,
//               thiserror
// ============================================================================

//! ## Overview
//! This module implements the durable store behind the bibcache query path.
//! Four tables carry all persisted state: `books` (one immutable row per
//! canonical ISBN-13), `remap` (one-hop ISBN substitutions), `keys`
//! (external-service credential and lockfile path), and `client` (hashed
//! caller credentials). Each public operation opens exactly one transaction,
//! commits on success, and rolls back on every error path via the scoped
//! transaction guard, so concurrent readers never observe partial state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bibcache_core::ClientKey;
use bibcache_core::Isbn13;
use bibcache_core::auth::is_token_id;
use rand::RngCore;
use rand::rngs::OsRng;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms) applied to every connection.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Row name of the external-service credential in the `keys` table.
const SERVICE_KEY_NAME: &str = "service_key";
/// Row name of the external-service lockfile path in the `keys` table.
const SERVICE_LOCK_NAME: &str = "service_lock";
/// Attempts made to allocate a unique client token identifier.
const CLIENT_ID_RETRIES: usize = 16;
/// Random bytes behind each generated client API key.
const CLIENT_KEY_ENTROPY_BYTES: usize = 24;

/// Schema executed by [`BookStore::create`], one statement per element.
const SCHEMA_DDL: &str = "CREATE TABLE remap(
    id INTEGER PRIMARY KEY ASC,
    src13 TEXT UNIQUE NOT NULL,
    dest13 TEXT NOT NULL);
CREATE UNIQUE INDEX ix_remap_src ON remap(src13);
CREATE INDEX ix_remap_dest ON remap(dest13);
CREATE TABLE keys(
    id INTEGER PRIMARY KEY ASC,
    kname TEXT UNIQUE NOT NULL,
    kval TEXT NOT NULL);
CREATE UNIQUE INDEX ix_keys_name ON keys(kname);
CREATE TABLE client(
    id INTEGER PRIMARY KEY ASC,
    entry INTEGER NOT NULL,
    tkid TEXT UNIQUE NOT NULL,
    pswd TEXT NOT NULL,
    desc TEXT NOT NULL);
CREATE UNIQUE INDEX ix_client_tkid ON client(tkid);
CREATE INDEX ix_client_entry ON client(entry);
CREATE TABLE books(
    id INTEGER PRIMARY KEY ASC,
    isbn13 TEXT UNIQUE NOT NULL,
    fetched INTEGER NOT NULL,
    json TEXT NOT NULL,
    cover BLOB);
CREATE UNIQUE INDEX ix_books_isbn ON books(isbn13);";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Store configuration.
///
/// # Invariants
/// - `busy_timeout_ms` is interpreted as milliseconds and bounds how long a
///   statement waits on a competing writer before surfacing a database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BookStoreConfig {
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for BookStoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Returns the default busy timeout in milliseconds.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Book store errors.
///
/// # Invariants
/// - `Integrity` marks persisted state violating a write-time invariant; it
///   is fatal to the surrounding operation and is never retried.
/// - `Duplicate` is the expected unique-constraint outcome of inserting a
///   record that another writer persisted first; it is distinct from `Db` so
///   callers can tell a lost race from a storage fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookStoreError {
    /// The database file does not exist at the given path.
    #[error("book store database not found: {0}")]
    MissingDatabase(String),
    /// The database file already exists and cannot be created fresh.
    #[error("book store database already exists: {0}")]
    AlreadyExists(String),
    /// SQLite engine or connection error, surfaced after rollback.
    #[error("book store db error: {0}")]
    Db(String),
    /// A record with this ISBN is already cached.
    #[error("record for isbn {0} is already cached")]
    Duplicate(String),
    /// Persisted state violates an invariant enforced at write time.
    #[error("book store integrity error: {0}")]
    Integrity(String),
    /// Administrative input rejected before any write.
    #[error("invalid book store input: {0}")]
    InvalidInput(String),
    /// No unique client token identifier could be allocated.
    #[error("could not allocate a unique client token identifier")]
    TokenCollision,
}

// ============================================================================
// SECTION: Service Config
// ============================================================================

/// Verified external-service access configuration.
///
/// # Invariants
/// - `lock_path` satisfied "absolute, existing, regular, not a symlink" at
///   the moment it was read; callers re-read rather than cache because the
///   file can disappear between reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Opaque bearer credential for the external metadata service.
    credential: String,
    /// Absolute path of the shared advisory lockfile.
    lock_path: PathBuf,
}

impl ServiceConfig {
    /// Returns the opaque bearer credential.
    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Returns the advisory lockfile path.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// One registered client, as listed by the administrative surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSummary {
    /// Public token identifier.
    pub token_id: String,
    /// Human-readable description recorded at registration.
    pub description: String,
    /// Unix timestamp of registration.
    pub entered_at: i64,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed store for cached books, remaps, and coordination state.
///
/// # Invariants
/// - Every public operation opens exactly one transaction (never nested) and
///   leaves the connection clean on exit: commit on success, rollback via the
///   transaction guard on any error.
/// - Connection access is serialized through a mutex; cross-process
///   serialization is delegated to SQLite's own locking plus the explicit
///   transaction behaviors selected per operation.
pub struct BookStore {
    /// Underlying connection guarded by a mutex.
    connection: Mutex<Connection>,
}

impl BookStore {
    /// Opens an existing store database.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::MissingDatabase`] when no regular file
    /// exists at `path`, and [`BookStoreError::Db`] when the connection
    /// cannot be opened or configured.
    pub fn open(path: &Path, config: &BookStoreConfig) -> Result<Self, BookStoreError> {
        if !path.is_file() {
            return Err(BookStoreError::MissingDatabase(path.display().to_string()));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(path, flags)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        apply_connection_settings(&connection, config)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Creates a fresh store database and bootstraps the schema.
    ///
    /// The whole schema is created inside one exclusive transaction, so a
    /// failed bootstrap never leaves a partially-created database behind the
    /// already-created file.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::AlreadyExists`] when `path` already exists,
    /// and [`BookStoreError::Db`] on connection or statement failure.
    pub fn create(path: &Path, config: &BookStoreConfig) -> Result<Self, BookStoreError> {
        if path.exists() {
            return Err(BookStoreError::AlreadyExists(path.display().to_string()));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let mut connection = Connection::open_with_flags(path, flags)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        apply_connection_settings(&connection, config)?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Exclusive)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.execute_batch(SCHEMA_DDL).map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    // ------------------------------------------------------------------
    // Cache reads and writes
    // ------------------------------------------------------------------

    /// Checks whether a record for the ISBN is already cached.
    ///
    /// With `exclusive = false` the check runs in a deferred (read-only)
    /// transaction. With `exclusive = true` it runs in an immediate
    /// transaction; this is the double-check performed while holding the
    /// cross-process fetch lock, where a concurrent writer must not be able
    /// to commit between this check and the caller's subsequent insert.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::Db`] on statement failure.
    pub fn is_cached(&self, isbn13: &Isbn13, exclusive: bool) -> Result<bool, BookStoreError> {
        let behavior = if exclusive {
            TransactionBehavior::Immediate
        } else {
            TransactionBehavior::Deferred
        };
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(behavior)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let found = tx
            .query_row("SELECT id FROM books WHERE isbn13 = ?1", params![isbn13.as_str()], |_| {
                Ok(())
            })
            .optional()
            .map_err(|err| BookStoreError::Db(err.to_string()))?
            .is_some();
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        Ok(found)
    }

    /// Inserts a complete cache record in one atomic write.
    ///
    /// Records are write-once: the unique index on `isbn13` rejects a second
    /// insert, which surfaces as [`BookStoreError::Duplicate`]. Callers are
    /// expected to have just re-verified absence under the same coordination
    /// regime (the exclusive fetch lock).
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::Duplicate`] when the key already exists and
    /// [`BookStoreError::Db`] on any other statement failure.
    pub fn insert_record(
        &self,
        isbn13: &Isbn13,
        fetched_at: i64,
        metadata_json: &str,
        cover: Option<&[u8]>,
    ) -> Result<(), BookStoreError> {
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let inserted = tx.execute(
            "INSERT INTO books (isbn13, fetched, json, cover) VALUES (?1, ?2, ?3, ?4)",
            params![isbn13.as_str(), fetched_at, metadata_json, cover],
        );
        match inserted {
            Ok(_) => tx.commit().map_err(|err| BookStoreError::Db(err.to_string())),
            Err(err) if is_unique_violation(&err) => {
                Err(BookStoreError::Duplicate(isbn13.as_str().to_string()))
            }
            Err(err) => Err(BookStoreError::Db(err.to_string())),
        }
    }

    /// Reads the cached metadata JSON for an ISBN, if present.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::Db`] on statement failure.
    pub fn metadata_json(&self, isbn13: &Isbn13) -> Result<Option<String>, BookStoreError> {
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let json = tx
            .query_row(
                "SELECT json FROM books WHERE isbn13 = ?1",
                params![isbn13.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        Ok(json)
    }

    /// Reads the cached cover image for an ISBN, if present.
    ///
    /// A cached record without a cover reads the same as a missing record:
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::Db`] on statement failure.
    pub fn cover_image(&self, isbn13: &Isbn13) -> Result<Option<Vec<u8>>, BookStoreError> {
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let cover = tx
            .query_row(
                "SELECT cover FROM books WHERE isbn13 = ?1",
                params![isbn13.as_str()],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        Ok(cover.flatten())
    }

    // ------------------------------------------------------------------
    // Remap resolution
    // ------------------------------------------------------------------

    /// Resolves the one-hop remap for a canonical ISBN-13.
    ///
    /// Performs exactly one lookup keyed by the given ISBN and never chases
    /// the destination recursively, so a chain `A -> B -> C` resolves `A`
    /// only to `B`. A destination that is not itself a valid ISBN-13 is an
    /// integrity fault: the table enforced validity at write time, so a
    /// violation means the persisted state is corrupt.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::Integrity`] for a corrupt destination and
    /// [`BookStoreError::Db`] on statement failure.
    pub fn resolve_remap(&self, isbn13: &Isbn13) -> Result<Isbn13, BookStoreError> {
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let destination = tx
            .query_row(
                "SELECT dest13 FROM remap WHERE src13 = ?1",
                params![isbn13.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        match destination {
            None => Ok(isbn13.clone()),
            Some(raw) => Isbn13::from_canonical(raw).ok_or_else(|| {
                BookStoreError::Integrity(format!(
                    "remap destination for {isbn13} is not a valid isbn-13"
                ))
            }),
        }
    }

    // ------------------------------------------------------------------
    // Service configuration
    // ------------------------------------------------------------------

    /// Reads the external-service configuration, if usable.
    ///
    /// Both rows must be present and the lockfile path must currently be
    /// absolute and name an existing regular file that is not a symlink.
    /// The path constraints are re-validated on every read because a
    /// previously-valid lockfile may have been deleted since configuration.
    /// An unusable configuration reads as `None` — cache-only mode, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::Db`] on statement failure.
    pub fn service_config(&self) -> Result<Option<ServiceConfig>, BookStoreError> {
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let credential = read_key(&tx, SERVICE_KEY_NAME)?;
        let lock_value = if credential.is_some() {
            read_key(&tx, SERVICE_LOCK_NAME)?
        } else {
            None
        };
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        drop(guard);
        let (Some(credential), Some(lock_value)) = (credential, lock_value) else {
            return Ok(None);
        };
        let lock_path = PathBuf::from(lock_value);
        if !is_usable_lock_path(&lock_path) {
            return Ok(None);
        }
        Ok(Some(ServiceConfig {
            credential,
            lock_path,
        }))
    }

    // ------------------------------------------------------------------
    // Client credentials
    // ------------------------------------------------------------------

    /// Verifies a presented client API key against the stored digest.
    ///
    /// The key splits into a public identifier and a secret; the secret's
    /// SHA-256 digest is compared in constant time against the stored value.
    /// A malformed key or unknown identifier verifies as `false`, not as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::Db`] on statement failure.
    pub fn verify_client_key(&self, presented: &str) -> Result<bool, BookStoreError> {
        let Some(key) = ClientKey::parse(presented) else {
            return Ok(false);
        };
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let stored = tx
            .query_row(
                "SELECT pswd FROM client WHERE tkid = ?1",
                params![key.token_id()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        let Some(stored) = stored else {
            return Ok(false);
        };
        Ok(constant_time_eq(stored.as_bytes(), key.secret_digest().as_bytes()))
    }

    /// Registers a new client and returns the full API key exactly once.
    ///
    /// The key is 32 URL-safe base64 characters derived from fresh random
    /// bytes; only the digest of its secret half is persisted. Identifier
    /// collisions are retried a bounded number of times.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::InvalidInput`] for a blank description,
    /// [`BookStoreError::TokenCollision`] when no unique identifier could be
    /// allocated, and [`BookStoreError::Db`] on statement failure.
    pub fn register_client(
        &self,
        description: &str,
        entered_at: i64,
    ) -> Result<String, BookStoreError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(BookStoreError::InvalidInput(
                "client description must not be blank".to_string(),
            ));
        }
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let mut allocated: Option<(String, ClientKey)> = None;
        for _ in 0..CLIENT_ID_RETRIES {
            let raw = generate_client_key();
            let Some(key) = ClientKey::parse(&raw) else {
                continue;
            };
            let taken = tx
                .query_row(
                    "SELECT tkid FROM client WHERE tkid = ?1",
                    params![key.token_id()],
                    |_| Ok(()),
                )
                .optional()
                .map_err(|err| BookStoreError::Db(err.to_string()))?
                .is_some();
            if !taken {
                allocated = Some((raw, key));
                break;
            }
        }
        let Some((raw, key)) = allocated else {
            return Err(BookStoreError::TokenCollision);
        };
        tx.execute(
            "INSERT INTO client (entry, tkid, pswd, desc) VALUES (?1, ?2, ?3, ?4)",
            params![entered_at, key.token_id(), key.secret_digest(), description],
        )
        .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        Ok(raw)
    }

    /// Removes a registered client by token identifier.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::InvalidInput`] for a malformed identifier
    /// and [`BookStoreError::Db`] on statement failure.
    pub fn drop_client(&self, token_id: &str) -> Result<bool, BookStoreError> {
        let token_id = token_id.trim();
        if !is_token_id(token_id) {
            return Err(BookStoreError::InvalidInput(format!(
                "malformed client token identifier: {token_id}"
            )));
        }
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let removed = tx
            .execute("DELETE FROM client WHERE tkid = ?1", params![token_id])
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        Ok(removed > 0)
    }

    /// Lists registered clients in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::Db`] on statement failure.
    pub fn list_clients(&self) -> Result<Vec<ClientSummary>, BookStoreError> {
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let mut clients = Vec::new();
        {
            let mut statement = tx
                .prepare("SELECT entry, tkid, desc FROM client ORDER BY entry ASC")
                .map_err(|err| BookStoreError::Db(err.to_string()))?;
            let rows = statement
                .query_map(params![], |row| {
                    Ok(ClientSummary {
                        entered_at: row.get(0)?,
                        token_id: row.get(1)?,
                        description: row.get(2)?,
                    })
                })
                .map_err(|err| BookStoreError::Db(err.to_string()))?;
            for row in rows {
                clients.push(row.map_err(|err| BookStoreError::Db(err.to_string()))?);
            }
        }
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        Ok(clients)
    }

    // ------------------------------------------------------------------
    // Administrative writes
    // ------------------------------------------------------------------

    /// Creates or replaces the remap entry for a source ISBN.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::InvalidInput`] when source and destination
    /// are identical and [`BookStoreError::Db`] on statement failure.
    pub fn set_remap(&self, source: &Isbn13, destination: &Isbn13) -> Result<(), BookStoreError> {
        if source == destination {
            return Err(BookStoreError::InvalidInput(
                "remap source and destination are identical".to_string(),
            ));
        }
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.execute(
            "INSERT INTO remap (src13, dest13) VALUES (?1, ?2)
             ON CONFLICT(src13) DO UPDATE SET dest13 = excluded.dest13",
            params![source.as_str(), destination.as_str()],
        )
        .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))
    }

    /// Removes the remap entry for a source ISBN.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::Db`] on statement failure.
    pub fn clear_remap(&self, source: &Isbn13) -> Result<bool, BookStoreError> {
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        let removed = tx
            .execute("DELETE FROM remap WHERE src13 = ?1", params![source.as_str()])
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))?;
        Ok(removed > 0)
    }

    /// Stores or replaces the external-service credential.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::InvalidInput`] for a blank credential and
    /// [`BookStoreError::Db`] on statement failure.
    pub fn set_service_key(&self, credential: &str) -> Result<(), BookStoreError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(BookStoreError::InvalidInput(
                "service credential must not be blank".to_string(),
            ));
        }
        self.upsert_key(SERVICE_KEY_NAME, credential)
    }

    /// Stores or replaces the external-service lockfile path.
    ///
    /// The path must satisfy the same constraints enforced at read time:
    /// absolute, existing, a regular file, not a symlink. Validation here is
    /// a convenience for the administrator; [`BookStore::service_config`]
    /// still re-checks on every read.
    ///
    /// # Errors
    ///
    /// Returns [`BookStoreError::InvalidInput`] for an unusable path and
    /// [`BookStoreError::Db`] on statement failure.
    pub fn set_service_lock(&self, lock_path: &Path) -> Result<(), BookStoreError> {
        if !is_usable_lock_path(lock_path) {
            return Err(BookStoreError::InvalidInput(format!(
                "lockfile path is not an absolute, existing regular file: {}",
                lock_path.display()
            )));
        }
        let Some(value) = lock_path.to_str() else {
            return Err(BookStoreError::InvalidInput(
                "lockfile path is not valid utf-8".to_string(),
            ));
        };
        self.upsert_key(SERVICE_LOCK_NAME, value)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Inserts or replaces one row of the `keys` table.
    fn upsert_key(&self, name: &str, value: &str) -> Result<(), BookStoreError> {
        let mut guard = self.lock_connection()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.execute(
            "INSERT INTO keys (kname, kval) VALUES (?1, ?2)
             ON CONFLICT(kname) DO UPDATE SET kval = excluded.kval",
            params![name, value],
        )
        .map_err(|err| BookStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| BookStoreError::Db(err.to_string()))
    }

    /// Acquires the connection mutex.
    fn lock_connection(&self) -> Result<MutexGuard<'_, Connection>, BookStoreError> {
        self.connection
            .lock()
            .map_err(|_| BookStoreError::Db("connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Applies the busy timeout to a freshly opened connection.
fn apply_connection_settings(
    connection: &Connection,
    config: &BookStoreConfig,
) -> Result<(), BookStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| BookStoreError::Db(err.to_string()))
}

/// Reads one row of the `keys` table inside an existing transaction.
fn read_key(
    tx: &rusqlite::Transaction<'_>,
    name: &str,
) -> Result<Option<String>, BookStoreError> {
    tx.query_row("SELECT kval FROM keys WHERE kname = ?1", params![name], |row| {
        row.get::<_, String>(0)
    })
    .optional()
    .map_err(|err| BookStoreError::Db(err.to_string()))
}

/// Checks the lockfile path constraints: absolute, existing, regular,
/// not a symlink.
fn is_usable_lock_path(path: &Path) -> bool {
    if !path.is_absolute() {
        return false;
    }
    // symlink_metadata does not follow links, so a symlink reports its own
    // file type here and fails the regular-file requirement.
    fs::symlink_metadata(path).is_ok_and(|metadata| metadata.file_type().is_file())
}

/// Returns true when an insert failed on a unique-constraint violation.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err.sqlite_error_code(), Some(ErrorCode::ConstraintViolation))
}

/// Generates a fresh 32-character URL-safe base64 client API key.
fn generate_client_key() -> String {
    let mut entropy = [0_u8; CLIENT_KEY_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut entropy);
    URL_SAFE_NO_PAD.encode(entropy)
}

/// Constant-time byte comparison for stored and presented digests.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
