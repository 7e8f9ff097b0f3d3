use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use tagstream_core::{Result, TagstreamError};

/// SQLite synchronous mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    Full,
    #[default]
    Normal,
    Off,
}

/// Connection settings shared by the SQLite stores.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub path: PathBuf,
    pub wal_mode: bool,
    pub synchronous: SynchronousMode,
    /// Milliseconds to wait on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: true,
            synchronous: SynchronousMode::Normal,
            busy_timeout_ms: 5_000,
        }
    }
}

pub(crate) fn db_err(e: rusqlite::Error) -> TagstreamError {
    TagstreamError::Storage(e.to_string())
}

/// Open and configure a connection, creating parent directories.
pub(crate) fn open(cfg: &SqliteConfig) -> Result<Connection> {
    if let Some(parent) = cfg.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open_with_flags(
        &cfg.path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )
    .map_err(db_err)?;
    configure(&conn, cfg)?;
    init(&conn)?;
    tracing::debug!(path = %cfg.path.display(), wal = cfg.wal_mode, "opened sqlite store");
    Ok(conn)
}

pub(crate) fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(db_err)?;
    init(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection, cfg: &SqliteConfig) -> Result<()> {
    if cfg.wal_mode {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| TagstreamError::Config(e.to_string()))?;
    }
    let sync_mode = match cfg.synchronous {
        SynchronousMode::Full => "FULL",
        SynchronousMode::Normal => "NORMAL",
        SynchronousMode::Off => "OFF",
    };
    conn.pragma_update(None, "synchronous", sync_mode)
        .map_err(|e| TagstreamError::Config(e.to_string()))?;
    conn.busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms))
        .map_err(|e| TagstreamError::Config(e.to_string()))?;
    Ok(())
}

/// Create both tables if needed.
///
/// Timestamps are RFC 3339 text with fixed nanosecond width, so text
/// comparison orders them correctly.
fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projection_snapshots (
            projector_name TEXT NOT NULL,
            projector_version TEXT NOT NULL,
            payload_type TEXT NOT NULL,
            last_sortable_unique_id TEXT,
            last_event_id TEXT,
            events_processed INTEGER NOT NULL,
            state_data BLOB,
            is_offloaded INTEGER NOT NULL DEFAULT 0,
            offload_key TEXT,
            offload_provider TEXT,
            original_size INTEGER NOT NULL,
            compressed_size INTEGER NOT NULL,
            safe_window_threshold TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            build_source TEXT NOT NULL,
            build_host TEXT NOT NULL,
            PRIMARY KEY (projector_name, projector_version)
        );
        CREATE TABLE IF NOT EXISTS tag_reservations (
            tag TEXT PRIMARY KEY,
            reservation_code TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );",
    )
    .map_err(db_err)?;
    Ok(())
}

pub(crate) fn format_time(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

pub(crate) fn parse_time(raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&chrono::Utc))
        .map_err(|e| TagstreamError::Storage(format!("invalid timestamp {raw:?}: {e}")))
}
