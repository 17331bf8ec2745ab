//! Deferred result registry.
//!
//! Process-wide table mapping an outstanding external tracking id to the
//! paused execution context awaiting it. Entries leave the table exactly
//! once: on resolution (`take`) or on expiry (`take_expired`). Ownership of
//! a session's deferred work is registry presence; an instance that does
//! not hold the entry ignores the event.
//!
//! The registry is a dumb concurrent map; re-entering the completion path
//! with the stored context is the orchestrator's job, which keeps resolve
//! idempotent (the second `take` for a tracking id finds nothing).

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// A parked execution context plus its registration timestamp.
#[derive(Debug)]
pub struct DeferredRegistration<C> {
    pub context: C,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct DeferredResultRegistry<C> {
    entries: DashMap<String, DeferredRegistration<C>>,
}

impl<C> Default for DeferredResultRegistry<C> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<C> DeferredResultRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tracking_id: impl Into<String>, context: C, now: DateTime<Utc>) {
        self.entries.insert(
            tracking_id.into(),
            DeferredRegistration {
                context,
                registered_at: now,
            },
        );
    }

    /// Remove-and-return. `None` means unknown, already resolved, or
    /// already expired. Duplicate delivery is safe.
    pub fn take(&self, tracking_id: &str) -> Option<DeferredRegistration<C>> {
        self.entries.remove(tracking_id).map(|(_, reg)| reg)
    }

    pub fn contains(&self, tracking_id: &str) -> bool {
        self.entries.contains_key(tracking_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every entry registered earlier than
    /// `now - lifespan`. Expiry is not resolution: callers must still drive
    /// each returned context to a terminal error completion, or fan-in
    /// counters stall forever.
    pub fn take_expired(
        &self,
        now: DateTime<Utc>,
        lifespan: Duration,
    ) -> Vec<(String, DeferredRegistration<C>)> {
        let cutoff = now - lifespan;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().registered_at <= cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|(id, reg)| (id, reg)))
            .collect()
    }
}
