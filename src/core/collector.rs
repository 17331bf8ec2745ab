//! Parameter collector contract.
//!
//! Collectors are external collaborators: given a parameter spec they return
//! either an immediate value, a deferred ticket to be resolved by a later
//! external event, or an error. The engine neither knows nor cares how a
//! collector reaches its backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::variable_store::VariableSnapshot;
use crate::domain::{ActualValue, LogSearchPeriod, ParameterConfig, SessionId, TimeoutRange};
use crate::error::CollectResult;

/// Outcome of a collect call.
#[derive(Debug, Clone)]
pub enum CollectOutcome {
    /// Values available synchronously. May be empty.
    Immediate(Vec<ActualValue>),
    /// The result will arrive later via an external event carrying this
    /// tracking id.
    Deferred { tracking_id: String },
}

/// Session-scoped context handed to every collect call. Variables are a
/// snapshot taken at dispatch, not a live view.
#[derive(Debug, Clone)]
pub struct CollectContext {
    pub session_id: SessionId,
    pub environment_id: String,
    pub key_parameters: HashMap<String, String>,
    pub variables: VariableSnapshot,
    pub log_search_period: Option<LogSearchPeriod>,
    pub timeout_range: Option<TimeoutRange>,
    /// `query` with `${tab.param}` placeholders already resolved against
    /// the snapshot.
    pub resolved_query: String,
}

#[async_trait]
pub trait ParameterCollector: Send + Sync {
    async fn collect(
        &self,
        spec: &ParameterConfig,
        ctx: &CollectContext,
    ) -> CollectResult<CollectOutcome>;
}

/// Collectors keyed by source type ("sql", "rest", "log-search", ...).
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: HashMap<String, Arc<dyn ParameterCollector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        source_type: impl Into<String>,
        collector: Arc<dyn ParameterCollector>,
    ) {
        self.collectors.insert(source_type.into(), collector);
    }

    pub fn get(&self, source_type: &str) -> Option<Arc<dyn ParameterCollector>> {
        self.collectors.get(source_type).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}
