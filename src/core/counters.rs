//! Unprocessed counters, the sole synchronization primitive coordinating
//! fan-in.
//!
//! Each counter is a monotonically decrementing shared integer. Whether a
//! decrement brought the counter to zero is the return value of the
//! decrement itself; callers must never re-read the counter to decide,
//! since a sibling may decrement in between.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Outcome of completing one unit against a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterState {
    /// Units still outstanding after this decrement.
    Remaining(i64),
    /// This decrement brought the counter to exactly zero. Reported to
    /// exactly one caller.
    ReachedZero,
    /// The counter was already at or below zero; fan-in accounting is
    /// broken.
    Underflow,
}

#[derive(Debug)]
pub struct UnprocessedCounter {
    remaining: AtomicI64,
}

impl UnprocessedCounter {
    pub fn new(count: i64) -> Self {
        Self {
            remaining: AtomicI64::new(count),
        }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Atomically record one completed unit.
    pub fn complete_one(&self) -> CounterState {
        let previous = self.remaining.fetch_sub(1, Ordering::AcqRel);
        match previous {
            1 => CounterState::ReachedZero,
            p if p > 1 => CounterState::Remaining(p - 1),
            _ => CounterState::Underflow,
        }
    }
}

/// Per-page counters: tabs outstanding plus the page's synchronous
/// parameters outstanding.
#[derive(Debug)]
pub struct PageCounters {
    pub tabs: UnprocessedCounter,
    pub synchronous_parameters: UnprocessedCounter,
    tab_parameters: HashMap<String, Arc<UnprocessedCounter>>,
}

impl PageCounters {
    pub fn tab_parameters(&self, tab: &str) -> Option<Arc<UnprocessedCounter>> {
        self.tab_parameters.get(tab).cloned()
    }
}

/// All counters for one session, built once from the dispatch plan and
/// shared (not owned) by every in-flight parameter task.
#[derive(Debug)]
pub struct SessionCounters {
    /// Session-level units: one per dispatched page, plus one for the
    /// common pseudo-tab when common parameters exist.
    pub units: UnprocessedCounter,
    /// Parameters outstanding across the whole session, for progress
    /// events.
    pub total_parameters: UnprocessedCounter,
    /// Common parameters outstanding.
    pub common_parameters: UnprocessedCounter,
    pages: HashMap<String, PageCounters>,
}

impl SessionCounters {
    pub fn builder() -> SessionCountersBuilder {
        SessionCountersBuilder {
            common: 0,
            pages: Vec::new(),
        }
    }

    pub fn page(&self, page: &str) -> Option<&PageCounters> {
        self.pages.get(page)
    }

    pub fn tab_parameters(&self, page: &str, tab: &str) -> Option<Arc<UnprocessedCounter>> {
        self.pages.get(page).and_then(|p| p.tab_parameters(tab))
    }
}

pub struct SessionCountersBuilder {
    common: i64,
    pages: Vec<(String, Vec<(String, i64)>, i64)>,
}

impl SessionCountersBuilder {
    pub fn common_parameters(mut self, count: i64) -> Self {
        self.common = count;
        self
    }

    /// Register a page with its per-tab parameter counts and its count of
    /// synchronous parameters.
    pub fn page(
        mut self,
        name: impl Into<String>,
        tabs: Vec<(String, i64)>,
        synchronous_parameters: i64,
    ) -> Self {
        self.pages.push((name.into(), tabs, synchronous_parameters));
        self
    }

    pub fn build(self) -> SessionCounters {
        let mut total = self.common;
        let mut pages = HashMap::new();
        for (name, tabs, sync_count) in self.pages {
            let tab_parameters: HashMap<String, Arc<UnprocessedCounter>> = tabs
                .iter()
                .map(|(tab, count)| {
                    total += count;
                    (tab.clone(), Arc::new(UnprocessedCounter::new(*count)))
                })
                .collect();
            pages.insert(
                name,
                PageCounters {
                    tabs: UnprocessedCounter::new(tabs.len() as i64),
                    synchronous_parameters: UnprocessedCounter::new(sync_count),
                    tab_parameters,
                },
            );
        }
        let units = pages.len() as i64 + i64::from(self.common > 0);
        SessionCounters {
            units: UnprocessedCounter::new(units),
            total_parameters: UnprocessedCounter::new(total),
            common_parameters: UnprocessedCounter::new(self.common),
            pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_one_reaches_zero_exactly_once() {
        let counter = UnprocessedCounter::new(3);
        assert_eq!(counter.complete_one(), CounterState::Remaining(2));
        assert_eq!(counter.complete_one(), CounterState::Remaining(1));
        assert_eq!(counter.complete_one(), CounterState::ReachedZero);
        assert_eq!(counter.complete_one(), CounterState::Underflow);
    }

    #[test]
    fn test_underflow_on_empty_counter() {
        let counter = UnprocessedCounter::new(0);
        assert_eq!(counter.complete_one(), CounterState::Underflow);
    }

    #[tokio::test]
    async fn test_concurrent_decrements_single_zero_crossing() {
        use std::sync::atomic::AtomicUsize;

        let counter = Arc::new(UnprocessedCounter::new(100));
        let zero_crossings = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..100 {
            let counter = counter.clone();
            let zero_crossings = zero_crossings.clone();
            handles.push(tokio::spawn(async move {
                if counter.complete_one() == CounterState::ReachedZero {
                    zero_crossings.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(zero_crossings.load(Ordering::SeqCst), 1);
        assert_eq!(counter.remaining(), 0);
    }

    #[test]
    fn test_session_counters_build() {
        let counters = SessionCounters::builder()
            .common_parameters(2)
            .page(
                "P",
                vec![("T1".to_string(), 3), ("T2".to_string(), 1)],
                2,
            )
            .build();

        // One page plus the common pseudo-tab.
        assert_eq!(counters.units.remaining(), 2);
        assert_eq!(counters.total_parameters.remaining(), 6);
        assert_eq!(counters.common_parameters.remaining(), 2);

        let page = counters.page("P").unwrap();
        assert_eq!(page.tabs.remaining(), 2);
        assert_eq!(page.synchronous_parameters.remaining(), 2);
        assert_eq!(counters.tab_parameters("P", "T1").unwrap().remaining(), 3);
        assert!(counters.tab_parameters("P", "missing").is_none());
    }

    #[test]
    fn test_session_counters_without_common() {
        let counters = SessionCounters::builder()
            .page("P", vec![("T".to_string(), 1)], 0)
            .build();
        assert_eq!(counters.units.remaining(), 1);
        assert_eq!(counters.common_parameters.remaining(), 0);
    }
}
