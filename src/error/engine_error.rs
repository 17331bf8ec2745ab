//! Session-level error types.

use super::CollectError;
use crate::domain::SessionId;
use thiserror::Error;

/// Engine-level errors.
///
/// `CounterUnderflow` and `SessionVanished` indicate broken fan-in
/// accounting. They are logged at error level and short-circuit the
/// affected completion, but must never take down sibling tasks.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown page: {0}")]
    UnknownPage(String),
    #[error("unknown tab: {page}/{tab}")]
    UnknownTab { page: String, tab: String },
    #[error("no collector registered for source type: {0}")]
    CollectorNotFound(String),
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("session already running: {0}")]
    SessionAlreadyRunning(SessionId),
    #[error("nothing to execute: no pages selected and no common parameters")]
    EmptyExecution,
    #[error("unprocessed counter underflow at {scope}")]
    CounterUnderflow { scope: String },
    #[error("session vanished mid-flight: {0}")]
    SessionVanished(SessionId),
    #[error("collect error: {0}")]
    Collect(Box<CollectError>),
}

impl From<CollectError> for EngineError {
    fn from(value: CollectError) -> Self {
        EngineError::Collect(Box::new(value))
    }
}
