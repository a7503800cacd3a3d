use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Table definitions. `IF NOT EXISTS` makes repeated opens safe.
pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    key        TEXT PRIMARY KEY,
    summary    TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    session_key     TEXT    NOT NULL REFERENCES sessions(key) ON DELETE CASCADE,
    seq             INTEGER NOT NULL,
    role            TEXT    NOT NULL,
    content         TEXT    NOT NULL DEFAULT '',
    tool_calls_json TEXT,
    tool_call_id    TEXT    NOT NULL DEFAULT '',
    created_at      TEXT    NOT NULL,
    UNIQUE(session_key, seq)
);";

/// Connection tuning applied at open time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreOptions {
    /// How long a statement waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Page cache budget in KiB.
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: u32,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}
fn default_cache_size_kib() -> u32 {
    512
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            cache_size_kib: default_cache_size_kib(),
        }
    }
}

impl StoreOptions {
    /// Busy timeout as a [`Duration`].
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Opens the database at `path`, tunes it and makes sure the schema exists.
///
/// The connection is dropped (and so released) on any failure.
pub(crate) fn open_connection(path: &Path, options: &StoreOptions) -> StoreResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let fail = |stage: &'static str| {
        move |source: rusqlite::Error| StoreError::Open {
            path: path.to_path_buf(),
            stage,
            source,
        }
    };

    let conn = Connection::open(path).map_err(fail("connect"))?;

    let journal: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(fail("journal_mode"))?;
    conn.busy_timeout(options.busy_timeout())
        .map_err(fail("busy_timeout"))?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(fail("synchronous"))?;
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(fail("foreign_keys"))?;
    conn.pragma_update(None, "cache_size", -i64::from(options.cache_size_kib))
        .map_err(fail("cache_size"))?;

    conn.execute_batch(SCHEMA).map_err(fail("schema"))?;

    debug!(
        path = %path.display(),
        journal_mode = %journal,
        busy_timeout_ms = options.busy_timeout_ms,
        "session store opened"
    );
    Ok(conn)
}
