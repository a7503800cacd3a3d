//! Periodic heartbeat for agent workspaces.
//!
//! On every tick the service builds a prompt from the current time and the
//! workspace's `memory/HEARTBEAT.md` notes, hands it to a
//! [`HeartbeatHandler`], and records the classified [`HeartbeatOutcome`] in
//! the tracing stream and in `memory/heartbeat.log`.
//!
//! # Main types
//!
//! - [`HeartbeatService`] — Owns the background loop; start, stop, or beat once.
//! - [`HeartbeatHandler`] — Receives the prompt and reports what happened.
//! - [`HeartbeatOutcome`] — Completed, started asynchronously, or failed.
//! - [`HeartbeatConfig`] — Enable flag, interval, and workspace directory.

/// Heartbeat configuration.
pub mod config;
/// Outcome classification and the handler trait.
pub mod handler;
/// The heartbeat service and its background loop.
pub mod service;

pub use config::HeartbeatConfig;
pub use handler::{HeartbeatHandler, HeartbeatOutcome};
pub use service::{build_prompt, HeartbeatService};
