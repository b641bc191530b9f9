// crates/bibcache-cli/src/main.rs
// ============================================================================
// Module: bibcache CLI Entry Point
// Description: Command dispatcher for the book-metadata cache.
// Purpose: Expose query, read-through, batch-sync, bootstrap, and admin
//          surfaces over one cache database.
// Dependencies: bibcache-core, bibcache-engine, bibcache-store-sqlite, clap,
//               thiserror
// ============================================================================

//! ## Overview
//! The bibcache CLI wraps the query engine and store behind the classic
//! four modes — `json`, `pic`, `query`, `sync` — plus database bootstrap and
//! administration. The query modes keep stdout machine-consumable: they emit
//! the literal `false` instead of breaking the stream when a book cannot be
//! resolved, and diagnostic text goes to stderr. Exit code 0 means the
//! requested operation completed (a legitimate `false` outcome included);
//! any reported error exits nonzero.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use bibcache_core::Clock;
use bibcache_core::Isbn13;
use bibcache_core::SystemClock;
use bibcache_engine::FetchPolicy;
use bibcache_engine::HttpMetadataSource;
use bibcache_engine::HttpSourceConfig;
use bibcache_engine::QueryEngine;
use bibcache_engine::SyncDriver;
use bibcache_engine::SyncProgress;
use bibcache_store_sqlite::BookStore;
use bibcache_store_sqlite::BookStoreConfig;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "bibcache", disable_help_subcommand = true)]
struct Cli {
    /// Path to the cache database.
    database: PathBuf,
    /// Selected mode to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI modes.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print cached metadata JSON for an ISBN, fetching it if necessary.
    Json {
        /// ISBN-10 or ISBN-13, in any spelling.
        isbn: String,
    },
    /// Write the raw cover-image bytes for an ISBN, fetching if necessary.
    Pic {
        /// ISBN-10 or ISBN-13, in any spelling.
        isbn: String,
    },
    /// Report whether an ISBN is (now) cached, fetching it if necessary.
    Query {
        /// ISBN-10 or ISBN-13, in any spelling.
        isbn: String,
    },
    /// Load every ISBN listed on stdin, one per line, until all are cached.
    Sync,
    /// Create a fresh cache database at the given path.
    Init,
    /// Administrative operations on remaps, service access, and clients.
    Admin {
        /// Selected administrative operation.
        #[command(subcommand)]
        command: AdminCommands,
    },
}

/// Administrative subcommands.
#[derive(Subcommand, Debug)]
enum AdminCommands {
    /// Create or replace a remap entry.
    RemapSet {
        /// Source ISBN, any spelling.
        source: String,
        /// Destination ISBN, any spelling.
        destination: String,
    },
    /// Remove a remap entry.
    RemapClear {
        /// Source ISBN, any spelling.
        source: String,
    },
    /// Store the external-service credential.
    ServiceKey {
        /// Opaque bearer credential.
        credential: String,
    },
    /// Store the external-service lockfile path.
    ServiceLock {
        /// Absolute path to an existing regular file.
        path: PathBuf,
    },
    /// Register a new client and print its API key once.
    ClientAdd {
        /// Human-readable description of the client.
        description: String,
    },
    /// Remove a registered client by token identifier.
    ClientDrop {
        /// Eight-character token identifier.
        token_id: String,
    },
    /// List registered clients.
    ClientList,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI-level error with its stdout policy.
///
/// # Invariants
/// - `emit_false` is set for the query modes, whose stdout consumers expect
///   a JSON value even on failure.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// User-facing error message.
    message: String,
    /// Whether `false` must still be written to stdout.
    emit_false: bool,
}

impl CliError {
    /// Error outside the query modes; stdout stays untouched.
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            emit_false: false,
        }
    }

    /// Error inside a query mode; stdout still receives `false`.
    fn query_mode(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            emit_false: true,
        }
    }
}

/// Result alias for CLI operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err),
    }
}

/// Parses arguments and dispatches the selected mode.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Json { isbn } => command_json(&cli.database, &isbn),
        Commands::Pic { isbn } => command_pic(&cli.database, &isbn),
        Commands::Query { isbn } => command_query(&cli.database, &isbn),
        Commands::Sync => command_sync(&cli.database),
        Commands::Init => command_init(&cli.database),
        Commands::Admin { command } => command_admin(&cli.database, command),
    }
}

// ============================================================================
// SECTION: Query Modes
// ============================================================================

/// Executes the `json` mode.
fn command_json(database: &Path, isbn: &str) -> CliResult<ExitCode> {
    let isbn13 = parse_isbn(isbn)?;
    let session = QuerySession::open(database)?;
    let engine = session.engine()?;
    if !engine.query(&isbn13).map_err(|err| CliError::query_mode(err.to_string()))? {
        write_stdout_line("false").map_err(output_error)?;
        return Ok(ExitCode::SUCCESS);
    }
    match engine.metadata_json(&isbn13).map_err(|err| CliError::query_mode(err.to_string()))? {
        Some(json) => write_stdout_line(&json).map_err(output_error)?,
        // The record can disappear between the query and this read if an
        // administrator deletes it; report it like a plain miss.
        None => write_stdout_line("false").map_err(output_error)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `pic` mode.
fn command_pic(database: &Path, isbn: &str) -> CliResult<ExitCode> {
    let isbn13 = parse_isbn(isbn)?;
    let session = QuerySession::open(database)?;
    let engine = session.engine()?;
    if !engine.query(&isbn13).map_err(|err| CliError::query_mode(err.to_string()))? {
        write_stdout_line("false").map_err(output_error)?;
        return Ok(ExitCode::SUCCESS);
    }
    match engine.cover_image(&isbn13).map_err(|err| CliError::query_mode(err.to_string()))? {
        Some(bytes) => write_stdout_bytes(&bytes).map_err(output_error)?,
        None => write_stdout_line("false").map_err(output_error)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `query` mode.
fn command_query(database: &Path, isbn: &str) -> CliResult<ExitCode> {
    let isbn13 = parse_isbn(isbn)?;
    let session = QuerySession::open(database)?;
    let loaded = session
        .engine()?
        .query(&isbn13)
        .map_err(|err| CliError::query_mode(err.to_string()))?;
    write_stdout_line(if loaded { "true" } else { "false" }).map_err(output_error)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `sync` mode over stdin.
fn command_sync(database: &Path) -> CliResult<ExitCode> {
    let session = QuerySession::open(database)?;
    let engine = session.engine()?;
    let mut progress = StderrProgress;
    let stdin = io::stdin();
    match SyncDriver::default().run(&engine, stdin.lock(), &mut progress) {
        Ok(()) => {
            write_stdout_line("true").map_err(output_error)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Err(CliError::query_mode(err.to_string())),
    }
}

// ============================================================================
// SECTION: Bootstrap and Administration
// ============================================================================

/// Executes the `init` mode.
fn command_init(database: &Path) -> CliResult<ExitCode> {
    BookStore::create(database, &BookStoreConfig::default())
        .map_err(|err| CliError::new(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes one administrative operation.
fn command_admin(database: &Path, command: AdminCommands) -> CliResult<ExitCode> {
    let store = open_store(database)?;
    match command {
        AdminCommands::RemapSet {
            source,
            destination,
        } => {
            let source = parse_admin_isbn(&source)?;
            let destination = parse_admin_isbn(&destination)?;
            store
                .set_remap(&source, &destination)
                .map_err(|err| CliError::new(err.to_string()))?;
        }
        AdminCommands::RemapClear { source } => {
            let source = parse_admin_isbn(&source)?;
            if !store.clear_remap(&source).map_err(|err| CliError::new(err.to_string()))? {
                return Err(CliError::new(format!("no remap entry for {source}")));
            }
        }
        AdminCommands::ServiceKey { credential } => {
            store.set_service_key(&credential).map_err(|err| CliError::new(err.to_string()))?;
        }
        AdminCommands::ServiceLock { path } => {
            store.set_service_lock(&path).map_err(|err| CliError::new(err.to_string()))?;
        }
        AdminCommands::ClientAdd { description } => {
            let key = store
                .register_client(&description, SystemClock.now_unix())
                .map_err(|err| CliError::new(err.to_string()))?;
            write_stdout_line(&key).map_err(output_error)?;
        }
        AdminCommands::ClientDrop { token_id } => {
            if !store.drop_client(&token_id).map_err(|err| CliError::new(err.to_string()))? {
                return Err(CliError::new(format!("no client with token id {token_id}")));
            }
        }
        AdminCommands::ClientList => {
            for client in store.list_clients().map_err(|err| CliError::new(err.to_string()))? {
                let line = format_client_line(&client.token_id, client.entered_at, &client.description);
                write_stdout_line(&line).map_err(output_error)?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Query Session
// ============================================================================

/// Store plus the long-lived collaborators behind the query modes.
struct QuerySession {
    /// Open cache store.
    store: BookStore,
    /// Outbound HTTP client for cache misses.
    source: HttpMetadataSource,
    /// Wall clock for timestamps and pacing.
    clock: SystemClock,
}

impl QuerySession {
    /// Opens the store and builds the fetch collaborators.
    fn open(database: &Path) -> CliResult<Self> {
        let store = open_store(database)?;
        let source = HttpMetadataSource::new(HttpSourceConfig::default())
            .map_err(|err| CliError::query_mode(err.to_string()))?;
        Ok(Self {
            store,
            source,
            clock: SystemClock,
        })
    }

    /// Builds a query engine borrowing this session's collaborators.
    fn engine(&self) -> CliResult<QueryEngine<'_>> {
        QueryEngine::new(&self.store, &self.source, &self.clock, FetchPolicy::default())
            .map_err(|err| CliError::query_mode(err.to_string()))
    }
}

/// Progress sink writing one diagnostic line per sync event.
struct StderrProgress;

impl SyncProgress for StderrProgress {
    fn resolved(&mut self, isbn13: &Isbn13) {
        let _ = write_stderr_line(&format_resolved_line(isbn13.as_str()));
    }

    fn exhausted(&mut self, isbn13: &Isbn13) {
        let _ = write_stderr_line(&format_exhausted_line(isbn13.as_str()));
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens the cache store at the given path.
fn open_store(database: &Path) -> CliResult<BookStore> {
    BookStore::open(database, &BookStoreConfig::default())
        .map_err(|err| CliError::new(err.to_string()))
}

/// Normalizes a user-supplied ISBN for the query modes.
fn parse_isbn(isbn: &str) -> CliResult<Isbn13> {
    Isbn13::canonicalize(isbn)
        .ok_or_else(|| CliError::query_mode(format!("provided isbn is not valid: {isbn}")))
}

/// Normalizes a user-supplied ISBN for the admin surface.
fn parse_admin_isbn(isbn: &str) -> CliResult<Isbn13> {
    Isbn13::canonicalize(isbn)
        .ok_or_else(|| CliError::new(format!("provided isbn is not valid: {isbn}")))
}

/// Formats the per-ISBN sync success line.
fn format_resolved_line(isbn13: &str) -> String {
    format!("bibcache: Loaded info for ISBN: {isbn13}")
}

/// Formats the per-ISBN sync failure line.
fn format_exhausted_line(isbn13: &str) -> String {
    format!("bibcache: Can't load ISBN: {isbn13}")
}

/// Formats one row of the client listing.
fn format_client_line(token_id: &str, entered_at: i64, description: &str) -> String {
    format!("{token_id}  {entered_at}  {description}")
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(bytes)
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> io::Result<()> {
    let mut stderr = io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Maps a stdout/stderr write failure into a CLI error.
fn output_error(error: io::Error) -> CliError {
    CliError::new(format!("cannot write output: {error}"))
}

/// Reports an error on stderr, honoring the stdout `false` policy.
fn emit_error(error: &CliError) -> ExitCode {
    let _ = write_stderr_line(&format!("bibcache: {error}"));
    if error.emit_false {
        let _ = write_stdout_line("false");
    }
    ExitCode::FAILURE
}
