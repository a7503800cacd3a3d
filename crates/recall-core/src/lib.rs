//! Core types and error definitions for the recall workspace.
//!
//! This crate provides the foundational types shared across all recall crates:
//! the unified error type and the message / tool call representations that the
//! session store persists.
//!
//! # Main types
//!
//! - [`RecallError`] — Unified error enum for all recall subsystems.
//! - [`RecallResult`] — Convenience alias for `Result<T, RecallError>`.
//! - [`Message`] — A single turn within a conversation session.
//! - [`ToolCall`] — An LLM-initiated tool invocation carried by a message.
//! - [`FunctionCall`] — The function name and raw arguments of a [`ToolCall`].

/// Unified error type.
pub mod error;
/// Conversation message type.
pub mod message;
/// Serde helpers for tolerant decoding.
pub mod serde_util;
/// Tool call types attached to assistant messages.
pub mod tool;

pub use error::{RecallError, RecallResult};
pub use message::Message;
pub use tool::{FunctionCall, ToolCall};
