//! Notification dispatch contract.
//!
//! The engine hands every per-node update to a [`NotificationDispatcher`]
//! as a single publish call; how it reaches subscribers (push channel,
//! message bus, cross-pod forwarding) is a collaborator concern.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::{ActualValue, ParameterPath, SessionId, ValidationInfo, ValidationStatus};

/// One observer-facing progress update. Serializes as the wire shape used
/// for both push transports and cross-instance forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionUpdate {
    Parameter {
        path: ParameterPath,
        values: Vec<ActualValue>,
        validation: ValidationInfo,
    },
    TabStatus {
        page: String,
        tab: String,
        status: ValidationStatus,
    },
    PageStatus {
        page: String,
        status: ValidationStatus,
    },
    SessionStatus {
        status: ValidationStatus,
    },
    /// Parameters still outstanding across the whole session.
    RemainingCount {
        remaining: i64,
    },
    PageInProgress {
        page: String,
    },
    SessionExpired,
}

pub trait NotificationDispatcher: Send + Sync {
    fn publish(&self, session_id: &SessionId, update: SessionUpdate);
}

/// Dispatcher that drops every update.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl NotificationDispatcher for NoopNotifier {
    fn publish(&self, _session_id: &SessionId, _update: SessionUpdate) {}
}

/// Dispatcher that forwards updates onto an unbounded channel; the primary
/// building block for push transports and for tests.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(SessionId, SessionUpdate)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SessionId, SessionUpdate)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationDispatcher for ChannelNotifier {
    fn publish(&self, session_id: &SessionId, update: SessionUpdate) {
        // A closed receiver just means nobody is listening anymore.
        let _ = self.tx.send((session_id.clone(), update));
    }
}
