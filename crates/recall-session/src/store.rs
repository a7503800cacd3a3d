use crate::codec::ToolCallsColumn;
use crate::context::OpContext;
use crate::error::{StoreError, StoreResult};
use crate::schema::{self, StoreOptions};
use crate::session::{SessionInfo, StoredMessage};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use recall_core::Message;
use rusqlite::{params, Connection, InterruptHandle, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Key recorded in errors raised by operations that span every session.
const ALL_SESSIONS: &str = "*";

// ---------------------------------------------------------------------------
// SessionStore trait
// ---------------------------------------------------------------------------

/// Transactional storage for per-session message histories and summaries.
///
/// Sessions are created implicitly by the first write that targets their key.
/// Every mutation is all-or-nothing and refreshes the session's `updated_at`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Appends a plain text message with no tool call data.
    async fn add_message(
        &self,
        ctx: &OpContext,
        key: &str,
        role: &str,
        content: &str,
    ) -> StoreResult<()> {
        self.add_full_message(ctx, key, Message::new(role, content))
            .await
    }

    /// Appends `message` at the end of the session's history.
    async fn add_full_message(
        &self,
        ctx: &OpContext,
        key: &str,
        message: Message,
    ) -> StoreResult<()>;

    /// Returns the history in ascending sequence order. Unknown sessions
    /// yield an empty vector.
    async fn get_history(&self, ctx: &OpContext, key: &str) -> StoreResult<Vec<Message>>;

    /// Returns the summary, or an empty string for an unknown session.
    async fn get_summary(&self, ctx: &OpContext, key: &str) -> StoreResult<String>;

    /// Overwrites the summary.
    async fn set_summary(&self, ctx: &OpContext, key: &str, summary: &str) -> StoreResult<()>;

    /// Keeps only the `keep_last` most recent messages; `0` clears the history.
    async fn truncate_history(
        &self,
        ctx: &OpContext,
        key: &str,
        keep_last: usize,
    ) -> StoreResult<()>;

    /// Replaces the whole history with `messages`, renumbered from 1.
    async fn set_history(
        &self,
        ctx: &OpContext,
        key: &str,
        messages: Vec<Message>,
    ) -> StoreResult<()>;

    /// Releases the underlying connection. Later operations fail with
    /// [`StoreError::Closed`].
    async fn close(&self) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// Transaction plumbing
// ---------------------------------------------------------------------------

/// Failure inside a blocking store closure, before op/key context is added.
#[derive(Debug)]
pub(crate) enum TxError {
    Sql(rusqlite::Error),
    Codec(serde_json::Error),
    Corrupt(String),
    Cancelled,
    Closed,
}

impl From<rusqlite::Error> for TxError {
    fn from(err: rusqlite::Error) -> Self {
        TxError::Sql(err)
    }
}

impl From<serde_json::Error> for TxError {
    fn from(err: serde_json::Error) -> Self {
        TxError::Codec(err)
    }
}

impl TxError {
    fn into_store_error(self, op: &'static str, key: &str) -> StoreError {
        let key = key.to_string();
        match self {
            TxError::Sql(source) => StoreError::Operation { op, key, source },
            TxError::Codec(source) => StoreError::Codec { op, key, source },
            TxError::Corrupt(detail) => StoreError::Corrupt { op, key, detail },
            TxError::Cancelled => StoreError::Cancelled { op, key },
            TxError::Closed => StoreError::Closed,
        }
    }
}

/// Shared flags between an awaiting caller and its blocking closure.
///
/// `running` is true only while the closure owns the connection. The
/// canceller holds its lock across `interrupt()`, and the closure takes the
/// same lock to clear it before releasing the connection, so an interrupt can
/// never land on a statement belonging to the next operation.
#[derive(Debug, Default)]
pub(crate) struct OpGuard {
    cancelled: AtomicBool,
    running: Mutex<bool>,
}

impl OpGuard {
    /// Fails once the caller's context has fired. Call before every commit.
    pub(crate) fn checkpoint(&self) -> Result<(), TxError> {
        if self.is_cancelled() {
            Err(TxError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct Shared {
    conn: Mutex<Option<Connection>>,
    interrupt: InterruptHandle,
    path: PathBuf,
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TxError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TxError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

/// Inserts the session row if it is missing. An existing row is never
/// overwritten. Returns whether a row was inserted.
///
/// Must run inside a transaction.
pub(crate) fn ensure_session(
    conn: &Connection,
    key: &str,
    summary: &str,
    created_at: &str,
    updated_at: &str,
) -> rusqlite::Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sessions WHERE key = ?1",
            params![key],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO sessions (key, summary, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![key, summary, created_at, updated_at],
    )?;
    Ok(true)
}

fn touch_session(conn: &Connection, key: &str, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE sessions SET updated_at = ?1 WHERE key = ?2",
        params![now, key],
    )?;
    Ok(())
}

fn next_seq(conn: &Connection, key: &str) -> rusqlite::Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(seq) FROM messages WHERE session_key = ?1",
        params![key],
        |row| row.get(0),
    )?;
    Ok(max.map_or(1, |seq| seq + 1))
}

pub(crate) fn message_count(conn: &Connection, key: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE session_key = ?1",
        params![key],
        |row| row.get(0),
    )
}

/// Writes one message row. Tool calls are serialized only when non-empty.
pub(crate) fn insert_message(
    conn: &Connection,
    key: &str,
    seq: i64,
    message: &Message,
    created_at: &str,
) -> Result<(), TxError> {
    let tool_calls = ToolCallsColumn::encode(&message.tool_calls)?;
    conn.execute(
        "INSERT INTO messages (session_key, seq, role, content, tool_calls_json, tool_call_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            key,
            seq,
            message.role,
            message.content,
            tool_calls.as_sql(),
            message.tool_call_id,
            created_at
        ],
    )?;
    Ok(())
}

struct MessageRow {
    seq: i64,
    role: String,
    content: String,
    tool_calls: ToolCallsColumn,
    tool_call_id: String,
    created_at: String,
}

impl MessageRow {
    fn into_stored(self) -> Result<StoredMessage, TxError> {
        let seq = u64::try_from(self.seq)
            .map_err(|_| TxError::Corrupt(format!("negative seq {}", self.seq)))?;
        Ok(StoredMessage {
            seq,
            created_at: parse_timestamp(&self.created_at)?,
            message: Message {
                role: self.role,
                content: self.content,
                tool_calls: self.tool_calls.decode()?,
                tool_call_id: self.tool_call_id,
            },
        })
    }
}

fn load_history(conn: &Connection, key: &str) -> Result<Vec<StoredMessage>, TxError> {
    let mut stmt = conn.prepare(
        "SELECT seq, role, content, tool_calls_json, tool_call_id, created_at
         FROM messages
         WHERE session_key = ?1
         ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![key], |row| {
        Ok(MessageRow {
            seq: row.get(0)?,
            role: row.get(1)?,
            content: row.get(2)?,
            tool_calls: ToolCallsColumn::from_column(row.get(3)?),
            tool_call_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    let mut history = Vec::new();
    for row in rows {
        history.push(row?.into_stored()?);
    }
    Ok(history)
}

// ---------------------------------------------------------------------------
// SqliteSessionStore
// ---------------------------------------------------------------------------

/// SQLite-backed [`SessionStore`].
///
/// Holds exactly one connection. Every operation takes the connection lock
/// for its whole duration, so concurrent callers queue and read-then-write
/// sequences such as sequence assignment cannot interleave. Clones share the
/// same connection.
#[derive(Clone)]
pub struct SqliteSessionStore {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore")
            .field("path", &self.shared.path)
            .finish_non_exhaustive()
    }
}

impl SqliteSessionStore {
    /// Opens (or creates) the store at `path` with default tuning.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with(path, StoreOptions::default()).await
    }

    /// Opens (or creates) the store at `path`.
    ///
    /// Creates the parent directory, applies WAL journaling, the busy
    /// timeout, foreign keys and the page cache budget, then creates any
    /// missing tables. Failure at any step is fatal and releases the
    /// connection.
    pub async fn open_with(path: impl Into<PathBuf>, options: StoreOptions) -> StoreResult<Self> {
        let path = path.into();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || {
            schema::open_connection(&open_path, &options)
        })
        .await
        .map_err(|e| StoreError::Task {
            op: "open",
            message: e.to_string(),
        })??;

        let interrupt = conn.get_interrupt_handle();
        Ok(Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(Some(conn)),
                interrupt,
                path,
            }),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Returns the history along with each message's assigned `seq`.
    pub async fn history_with_seq(
        &self,
        ctx: &OpContext,
        key: &str,
    ) -> StoreResult<Vec<StoredMessage>> {
        let key_owned = key.to_string();
        self.run(ctx, "get_history", key, move |conn, _| {
            load_history(conn, &key_owned)
        })
        .await
    }

    /// Lists every stored session, most recently updated first.
    pub async fn list_sessions(&self, ctx: &OpContext) -> StoreResult<Vec<SessionInfo>> {
        self.run(ctx, "list_sessions", ALL_SESSIONS, |conn, _| {
            let mut stmt = conn.prepare(
                "SELECT s.key, s.summary, s.created_at, s.updated_at, COUNT(m.id)
                 FROM sessions s
                 LEFT JOIN messages m ON m.session_key = s.key
                 GROUP BY s.key
                 ORDER BY s.updated_at DESC, s.key ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?;

            let mut sessions = Vec::new();
            for row in rows {
                let (key, summary, created_at, updated_at, count) = row?;
                sessions.push(SessionInfo {
                    key,
                    summary,
                    message_count: u64::try_from(count).unwrap_or_default(),
                    created_at: parse_timestamp(&created_at)?,
                    updated_at: parse_timestamp(&updated_at)?,
                });
            }
            Ok(sessions)
        })
        .await
    }

    /// Deletes a session; its messages are removed by the foreign key
    /// cascade. Returns whether the session existed.
    pub async fn delete_session(&self, ctx: &OpContext, key: &str) -> StoreResult<bool> {
        let key_owned = key.to_string();
        self.run(ctx, "delete_session", key, move |conn, guard| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let removed = tx.execute("DELETE FROM sessions WHERE key = ?1", params![key_owned])?;
            guard.checkpoint()?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    /// Runs `work` against the connection on the blocking pool.
    ///
    /// The connection lock is held for the whole closure. If `ctx` fires
    /// while the closure runs, the in-flight statement is interrupted and
    /// the next [`OpGuard::checkpoint`] fails, so an uncommitted transaction
    /// is dropped and rolled back. The caller always waits for the closure to
    /// finish before returning.
    pub(crate) async fn run<T, F>(
        &self,
        ctx: &OpContext,
        op: &'static str,
        key: &str,
        work: F,
    ) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &OpGuard) -> Result<T, TxError> + Send + 'static,
    {
        if let Some(reason) = ctx.interruption() {
            return Err(StoreError::interrupted(op, key, reason));
        }

        let guard = Arc::new(OpGuard::default());
        let task_guard = Arc::clone(&guard);
        let shared = Arc::clone(&self.shared);
        let mut task = tokio::task::spawn_blocking(move || {
            let mut slot = shared.conn.lock();
            let conn = slot.as_mut().ok_or(TxError::Closed)?;
            *task_guard.running.lock() = true;
            let result = task_guard
                .checkpoint()
                .and_then(|()| work(conn, &task_guard));
            *task_guard.running.lock() = false;
            drop(slot);
            result
        });

        let joined = tokio::select! {
            joined = &mut task => joined,
            reason = ctx.interrupted() => {
                guard.cancelled.store(true, Ordering::SeqCst);
                {
                    let running = guard.running.lock();
                    if *running {
                        self.shared.interrupt.interrupt();
                    }
                }
                debug!(op, key, ?reason, "interrupting store operation");
                return match task.await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(TxError::Closed)) => Err(StoreError::Closed),
                    Ok(Err(_)) => Err(StoreError::interrupted(op, key, reason)),
                    Err(e) => Err(StoreError::Task { op, message: e.to_string() }),
                };
            }
        };

        match joined {
            Ok(result) => result.map_err(|e| e.into_store_error(op, key)),
            Err(e) => Err(StoreError::Task {
                op,
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn add_full_message(
        &self,
        ctx: &OpContext,
        key: &str,
        message: Message,
    ) -> StoreResult<()> {
        let key_owned = key.to_string();
        self.run(ctx, "add_full_message", key, move |conn, guard| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = timestamp(Utc::now());
            ensure_session(&tx, &key_owned, "", &now, &now)?;
            let seq = next_seq(&tx, &key_owned)?;
            insert_message(&tx, &key_owned, seq, &message, &now)?;
            touch_session(&tx, &key_owned, &now)?;
            guard.checkpoint()?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_history(&self, ctx: &OpContext, key: &str) -> StoreResult<Vec<Message>> {
        let history = self.history_with_seq(ctx, key).await?;
        Ok(history.into_iter().map(Message::from).collect())
    }

    async fn get_summary(&self, ctx: &OpContext, key: &str) -> StoreResult<String> {
        let key_owned = key.to_string();
        self.run(ctx, "get_summary", key, move |conn, _| {
            let summary = conn
                .query_row(
                    "SELECT summary FROM sessions WHERE key = ?1",
                    params![key_owned],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(summary.unwrap_or_default())
        })
        .await
    }

    async fn set_summary(&self, ctx: &OpContext, key: &str, summary: &str) -> StoreResult<()> {
        let key_owned = key.to_string();
        let summary = summary.to_string();
        self.run(ctx, "set_summary", key, move |conn, guard| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = timestamp(Utc::now());
            ensure_session(&tx, &key_owned, "", &now, &now)?;
            tx.execute(
                "UPDATE sessions SET summary = ?1, updated_at = ?2 WHERE key = ?3",
                params![summary, now, key_owned],
            )?;
            guard.checkpoint()?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn truncate_history(
        &self,
        ctx: &OpContext,
        key: &str,
        keep_last: usize,
    ) -> StoreResult<()> {
        let key_owned = key.to_string();
        let keep = i64::try_from(keep_last).unwrap_or(i64::MAX);
        self.run(ctx, "truncate_history", key, move |conn, guard| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let removed = if keep == 0 {
                tx.execute(
                    "DELETE FROM messages WHERE session_key = ?1",
                    params![key_owned],
                )?
            } else {
                tx.execute(
                    "DELETE FROM messages WHERE session_key = ?1 AND id NOT IN (
                        SELECT id FROM messages WHERE session_key = ?1 ORDER BY seq DESC LIMIT ?2
                     )",
                    params![key_owned, keep],
                )?
            };
            touch_session(&tx, &key_owned, &timestamp(Utc::now()))?;
            guard.checkpoint()?;
            tx.commit()?;
            debug!(key = %key_owned, removed, keep_last = keep, "history truncated");
            Ok(())
        })
        .await
    }

    async fn set_history(
        &self,
        ctx: &OpContext,
        key: &str,
        messages: Vec<Message>,
    ) -> StoreResult<()> {
        let key_owned = key.to_string();
        self.run(ctx, "set_history", key, move |conn, guard| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = timestamp(Utc::now());
            ensure_session(&tx, &key_owned, "", &now, &now)?;
            tx.execute(
                "DELETE FROM messages WHERE session_key = ?1",
                params![key_owned],
            )?;
            for (index, message) in messages.iter().enumerate() {
                guard.checkpoint()?;
                insert_message(&tx, &key_owned, index as i64 + 1, message, &now)?;
            }
            touch_session(&tx, &key_owned, &now)?;
            guard.checkpoint()?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StoreResult<()> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let Some(conn) = shared.conn.lock().take() else {
                return Ok(());
            };
            conn.close().map_err(|(_, source)| StoreError::Operation {
                op: "close",
                key: ALL_SESSIONS.to_string(),
                source,
            })?;
            debug!(path = %shared.path.display(), "session store closed");
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task {
            op: "close",
            message: e.to_string(),
        })?
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
