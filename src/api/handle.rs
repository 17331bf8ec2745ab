//! Caller-facing handle to a launched session.

use tokio::sync::watch;

use crate::domain::SessionId;
use crate::engine::SessionExecutionStatus;

/// Handle returned by [`ValidationEngine::start_session`]. Holding it is
/// optional; the session runs to completion either way.
///
/// [`ValidationEngine::start_session`]: crate::api::ValidationEngine::start_session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    status_rx: watch::Receiver<SessionExecutionStatus>,
}

impl SessionHandle {
    pub(crate) fn new(
        session_id: SessionId,
        status_rx: watch::Receiver<SessionExecutionStatus>,
    ) -> Self {
        Self {
            session_id,
            status_rx,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn status(&self) -> SessionExecutionStatus {
        *self.status_rx.borrow()
    }

    /// Wait until the session reaches a terminal state.
    pub async fn wait(&mut self) -> SessionExecutionStatus {
        loop {
            let status = *self.status_rx.borrow();
            if status.is_terminal() {
                return status;
            }
            if self.status_rx.changed().await.is_err() {
                // Sender gone; whatever is in the channel is final.
                return *self.status_rx.borrow();
            }
        }
    }
}
