//! Expiration reaper: the periodic sweeps that keep long-lived engine
//! state bounded.
//!
//! Three independent loops: deferred registrations past their lifespan,
//! owned sessions past theirs, and sessions whose owning instance is no
//! longer alive. Each sweep is idempotent and races cleanly with normal
//! completion; a session that finishes between listing and expiry is
//! simply not there anymore.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::orchestrator::ExecutionOrchestrator;

/// Source of truth for which engine instances are currently alive. Backed
/// by a service registry in deployment; static in tests and single-node
/// setups.
pub trait ProcessRegistry: Send + Sync {
    fn live_instances(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct StaticProcessRegistry {
    instances: Vec<String>,
}

impl StaticProcessRegistry {
    pub fn new<I, S>(instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instances: instances.into_iter().map(Into::into).collect(),
        }
    }
}

impl ProcessRegistry for StaticProcessRegistry {
    fn live_instances(&self) -> Vec<String> {
        self.instances.clone()
    }
}

/// Aborts the sweep tasks when dropped.
pub struct ReaperHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub struct ExpirationReaper;

impl ExpirationReaper {
    pub fn spawn(
        orchestrator: Arc<ExecutionOrchestrator>,
        processes: Arc<dyn ProcessRegistry>,
    ) -> ReaperHandle {
        let config = orchestrator.config().clone();
        let mut tasks = Vec::with_capacity(3);

        let deferred = orchestrator.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(config.reaper_interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = deferred.evict_expired_deferred().await;
                if evicted > 0 {
                    info!(evicted, "deferred registrations expired");
                }
            }
        }));

        let owned = orchestrator.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(config.reaper_interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired = owned.expire_overdue_sessions().await;
                if expired > 0 {
                    info!(expired, "overdue sessions expired");
                }
            }
        }));

        tasks.push(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(config.lost_session_interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let live = processes.live_instances();
                debug!(instances = live.len(), "lost-session sweep");
                let removed = orchestrator.remove_lost_sessions(&live).await;
                if removed > 0 {
                    info!(removed, "lost sessions removed");
                }
            }
        }));

        ReaperHandle { tasks }
    }
}
