//! Persistent session memory for agent processes.
//!
//! Stores ordered per-session message histories and a rolling summary in a
//! single SQLite database, and imports sessions written by the older
//! file-per-session JSON format.
//!
//! # Main types
//!
//! - [`SessionStore`] — Trait exposing the transactional session operations.
//! - [`SqliteSessionStore`] — The SQLite implementation; one connection, all
//!   operations serialized.
//! - [`OpContext`] — Cancellation token plus optional deadline, passed to every
//!   operation.
//! - [`StoreError`] — Errors raised while opening or operating the store.
//! - [`migrate_legacy_sessions`] — One-shot, idempotent importer for legacy
//!   JSON session files.

mod codec;
/// Cancellation and deadline context for store operations.
pub mod context;
/// Store error type.
pub mod error;
/// Legacy JSON session importer.
pub mod migration;
/// Schema creation and connection tuning.
pub mod schema;
/// Read-side session and message projections.
pub mod session;
/// The session store trait and its SQLite implementation.
pub mod store;

pub use context::{Interruption, OpContext};
pub use error::{StoreError, StoreResult};
pub use migration::{migrate_legacy_sessions, LegacySession, MigrationReport};
pub use schema::StoreOptions;
pub use session::{SessionInfo, StoredMessage};
pub use store::{SessionStore, SqliteSessionStore};
