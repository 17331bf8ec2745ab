//! Cross-instance routing.
//!
//! Deferred results and session updates arrive on a shared transport and
//! are broadcast to every engine instance. Ownership is decided locally:
//! an instance acts on a deferred event only if it holds the tracking id
//! in its registry, and forwards a session update to its subscribers only
//! if it holds the session. Everything else is discarded without error;
//! on a multi-instance deployment most events belong to someone else.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::core::SessionUpdate;
use crate::domain::{ActualValue, SessionId};
use crate::engine::orchestrator::ExecutionOrchestrator;

/// External notification that a deferred collection finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredResultEvent {
    pub tracking_id: String,
    #[serde(default)]
    pub values: Vec<ActualValue>,
    /// Whether the external processing reached a terminal state. Events
    /// for intermediate states carry no resolvable result.
    pub has_ended_status: bool,
}

/// A session update forwarded between instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossInstanceMessage {
    pub session_id: SessionId,
    pub update: SessionUpdate,
}

pub struct CrossInstanceRouter {
    orchestrator: Arc<ExecutionOrchestrator>,
}

impl CrossInstanceRouter {
    pub fn new(orchestrator: Arc<ExecutionOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Route a deferred result event. Returns true when this instance
    /// resolved a parked parameter with it.
    pub async fn handle_deferred_event(&self, event: DeferredResultEvent) -> bool {
        if !event.has_ended_status {
            debug!(
                tracking_id = %event.tracking_id,
                "deferred event without terminal status discarded"
            );
            return false;
        }
        self.orchestrator
            .resolve_deferred(&event.tracking_id, event.values)
            .await
    }

    /// Route a session update from another instance to local subscribers.
    /// Returns true when this instance holds the session and forwarded it.
    pub async fn handle_message(&self, message: CrossInstanceMessage) -> bool {
        if !self.orchestrator.store().contains(&message.session_id).await {
            debug!(session = %message.session_id, "update for session held elsewhere ignored");
            return false;
        }
        self.orchestrator
            .notifier()
            .publish(&message.session_id, message.update);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_event_wire_shape() {
        let json = r#"{
            "tracking_id": "req-9",
            "values": [{"kind": "value", "value": "10"}],
            "has_ended_status": true
        }"#;
        let event: DeferredResultEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.tracking_id, "req-9");
        assert!(event.has_ended_status);
        assert_eq!(event.values, vec![ActualValue::value("10")]);
    }

    #[test]
    fn test_deferred_event_values_default_empty() {
        let json = r#"{"tracking_id": "req-9", "has_ended_status": false}"#;
        let event: DeferredResultEvent = serde_json::from_str(json).unwrap();
        assert!(event.values.is_empty());
    }
}
