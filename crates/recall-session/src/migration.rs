//! One-shot import of legacy JSON session files.
//!
//! The legacy format stores one session per `<sanitized-key>.json` file.
//! Each imported file is renamed to `<name>.json.migrated` and kept as a
//! backup; a later scan ignores it. Re-running the import is always safe: a
//! session that already has messages is left untouched.

use crate::context::OpContext;
use crate::error::{StoreError, StoreResult};
use crate::store::{
    ensure_session, insert_message, message_count, timestamp, SqliteSessionStore,
};
use chrono::{DateTime, Utc};
use recall_core::serde_util::null_as_default;
use recall_core::Message;
use rusqlite::TransactionBehavior;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix of a legacy session file awaiting import.
pub const LEGACY_SUFFIX: &str = ".json";
/// Suffix appended to a legacy file once it has been imported.
pub const MIGRATED_SUFFIX: &str = ".migrated";

/// A session as serialized by the legacy file store.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacySession {
    /// The real session key. Filenames are sanitized; this is not.
    pub key: String,
    /// History in conversation order. `null` reads as empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<Message>,
    /// Rolling summary.
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    /// Creation time, when recorded.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Last update time, when recorded.
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

/// Counters from one importer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Files committed to the store and renamed.
    pub imported: usize,
    /// Files that could not be read or parsed, or had no key.
    pub skipped: usize,
    /// Files whose import or rename failed; they are retried next run.
    pub failed: usize,
}

/// What a single file's transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportOutcome {
    Inserted(usize),
    AlreadyPresent,
}

/// Imports every pending legacy session file in `legacy_dir` into `store`.
///
/// A missing directory is not an error. Unreadable, unparsable, or keyless
/// files are skipped without stopping the batch. Each file is imported in
/// its own transaction, so a file is either fully present or not at all.
/// Only cancellation of `ctx`, a closed store, or an unreadable directory
/// abort the run.
pub async fn migrate_legacy_sessions(
    ctx: &OpContext,
    legacy_dir: impl AsRef<Path>,
    store: &SqliteSessionStore,
) -> StoreResult<MigrationReport> {
    let legacy_dir = legacy_dir.as_ref();
    let mut report = MigrationReport::default();

    let candidates = match pending_files(legacy_dir).await {
        Ok(files) => files,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %legacy_dir.display(), "no legacy session directory");
            return Ok(report);
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: legacy_dir.to_path_buf(),
                source,
            })
        }
    };

    for path in candidates {
        if let Some(reason) = ctx.interruption() {
            return Err(StoreError::interrupted("migrate", "*", reason));
        }

        let Some(session) = read_legacy_file(&path).await else {
            report.skipped += 1;
            continue;
        };
        let key = session.key.clone();

        match import_session(ctx, store, session).await {
            Ok(ImportOutcome::Inserted(messages)) => {
                debug!(key = %key, messages, "legacy session imported");
            }
            Ok(ImportOutcome::AlreadyPresent) => {
                debug!(key = %key, "legacy session already present, leaving history untouched");
            }
            Err(e) if e.is_interrupted() || matches!(e, StoreError::Closed) => return Err(e),
            Err(e) => {
                warn!(path = %path.display(), key = %key, error = %e, "legacy session import failed");
                report.failed += 1;
                continue;
            }
        }

        let mut backup = path.clone().into_os_string();
        backup.push(MIGRATED_SUFFIX);
        match tokio::fs::rename(&path, &backup).await {
            Ok(()) => report.imported += 1,
            Err(e) => {
                // Data is committed; the next run re-imports as a no-op and retries the rename.
                warn!(path = %path.display(), error = %e, "failed to mark legacy session as migrated");
                report.failed += 1;
            }
        }
    }

    info!(
        dir = %legacy_dir.display(),
        imported = report.imported,
        skipped = report.skipped,
        failed = report.failed,
        "legacy session migration finished"
    );
    Ok(report)
}

/// Lists `*.json` files (not directories, not already migrated), sorted by name.
async fn pending_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_pending_name(name) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn is_pending_name(name: &str) -> bool {
    name.ends_with(LEGACY_SUFFIX) && !name.ends_with(MIGRATED_SUFFIX)
}

/// Reads and parses one file. Returns `None` (after logging) for any
/// per-file problem so the batch can continue.
async fn read_legacy_file(path: &Path) -> Option<LegacySession> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable legacy session");
            return None;
        }
    };
    let session: LegacySession = match serde_json::from_str(&data) {
        Ok(session) => session,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping malformed legacy session");
            return None;
        }
    };
    if session.key.is_empty() {
        warn!(path = %path.display(), "skipping legacy session without a key");
        return None;
    }
    Some(session)
}

/// Writes one legacy session in a single transaction.
///
/// The session row is inserted only if absent. If the session already has
/// messages (a previous run, or live traffic since) nothing else is written.
async fn import_session(
    ctx: &OpContext,
    store: &SqliteSessionStore,
    session: LegacySession,
) -> StoreResult<ImportOutcome> {
    let key = session.key.clone();
    store
        .run(ctx, "migrate", &key, move |conn, guard| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = timestamp(Utc::now());
            let created_at = session.created.map_or_else(|| now.clone(), timestamp);
            let updated_at = session.updated.map_or_else(|| now.clone(), timestamp);

            ensure_session(&tx, &session.key, &session.summary, &created_at, &updated_at)?;

            if message_count(&tx, &session.key)? > 0 {
                guard.checkpoint()?;
                tx.commit()?;
                return Ok(ImportOutcome::AlreadyPresent);
            }

            for (index, message) in session.messages.iter().enumerate() {
                guard.checkpoint()?;
                insert_message(&tx, &session.key, index as i64 + 1, message, &now)?;
            }
            guard.checkpoint()?;
            tx.commit()?;
            Ok(ImportOutcome::Inserted(session.messages.len()))
        })
        .await
}
