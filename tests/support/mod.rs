//! Shared fixtures for the integration tests: scripted collectors, a
//! recording notifier, and project-tree builders.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use veriflow::core::{
    CollectContext, CollectOutcome, NotificationDispatcher, ParameterCollector, SessionUpdate,
};
use veriflow::domain::{
    ActualValue, GroupConfig, PageConfig, ParameterConfig, ProjectConfig, SessionId, TabConfig,
};
use veriflow::error::{CollectError, CollectResult};
use veriflow::{ValidationEngine, ValidationEngineBuilder};

/// Per-parameter scripted behavior, keyed by parameter name.
pub enum Script {
    /// Immediate single value.
    Value(&'static str),
    /// Immediate error-typed value.
    Error(&'static str),
    /// Defer with this tracking id.
    Defer(&'static str),
    /// Collector-level failure.
    Fail,
    /// Collector panic.
    Panic,
    /// Sleep, then return the value.
    Sleep(u64, &'static str),
    /// Return the resolved query as the value.
    Echo,
    /// Sleep a random duration up to the limit, then return the resolved
    /// query.
    JitterEcho(u64),
}

#[derive(Default)]
pub struct ScriptedCollector {
    scripts: HashMap<String, Script>,
}

impl ScriptedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(name.into(), script);
        self
    }
}

#[async_trait]
impl ParameterCollector for ScriptedCollector {
    async fn collect(
        &self,
        spec: &ParameterConfig,
        ctx: &CollectContext,
    ) -> CollectResult<CollectOutcome> {
        match self.scripts.get(&spec.name) {
            None => Ok(CollectOutcome::Immediate(vec![ActualValue::value("ok")])),
            Some(Script::Value(v)) => Ok(CollectOutcome::Immediate(vec![ActualValue::value(*v)])),
            Some(Script::Error(d)) => Ok(CollectOutcome::Immediate(vec![ActualValue::error(*d)])),
            Some(Script::Defer(id)) => Ok(CollectOutcome::Deferred {
                tracking_id: id.to_string(),
            }),
            Some(Script::Fail) => Err(CollectError::Source("scripted failure".into())),
            Some(Script::Panic) => panic!("scripted panic"),
            Some(Script::Sleep(millis, v)) => {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
                Ok(CollectOutcome::Immediate(vec![ActualValue::value(*v)]))
            }
            Some(Script::Echo) => Ok(CollectOutcome::Immediate(vec![ActualValue::value(
                ctx.resolved_query.clone(),
            )])),
            Some(Script::JitterEcho(max_millis)) => {
                let millis = rand::thread_rng().gen_range(0..=*max_millis);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(CollectOutcome::Immediate(vec![ActualValue::value(
                    ctx.resolved_query.clone(),
                )]))
            }
        }
    }
}

/// Notifier that records every published update.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    updates: Arc<Mutex<Vec<(SessionId, SessionUpdate)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(SessionId, SessionUpdate)> {
        self.updates.lock().clone()
    }

    pub fn remaining_counts(&self) -> Vec<i64> {
        self.updates
            .lock()
            .iter()
            .filter_map(|(_, u)| match u {
                SessionUpdate::RemainingCount { remaining } => Some(*remaining),
                _ => None,
            })
            .collect()
    }

    pub fn parameter_update_count(&self) -> usize {
        self.updates
            .lock()
            .iter()
            .filter(|(_, u)| matches!(u, SessionUpdate::Parameter { .. }))
            .count()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn publish(&self, session_id: &SessionId, update: SessionUpdate) {
        self.updates.lock().push((session_id.clone(), update));
    }
}

pub fn param(name: &str, expected: Option<&str>) -> ParameterConfig {
    ParameterConfig {
        name: name.into(),
        source_type: "test".into(),
        query: String::new(),
        expected: expected.map(Into::into),
        preconfigured: false,
        manual: false,
        warning_only: false,
    }
}

pub fn query_param(name: &str, query: &str, expected: Option<&str>) -> ParameterConfig {
    ParameterConfig {
        query: query.into(),
        ..param(name, expected)
    }
}

pub fn group(name: &str, synchronous: bool, parameters: Vec<ParameterConfig>) -> GroupConfig {
    GroupConfig {
        name: name.into(),
        synchronous_loading: synchronous,
        parameters,
    }
}

pub fn tab(name: &str, synchronous: bool, groups: Vec<GroupConfig>) -> TabConfig {
    TabConfig {
        name: name.into(),
        synchronous_loading: synchronous,
        groups,
    }
}

/// Tab with a single implicit group.
pub fn simple_tab(name: &str, parameters: Vec<ParameterConfig>) -> TabConfig {
    tab(name, false, vec![group("main", false, parameters)])
}

pub fn page(name: &str, tabs: Vec<TabConfig>) -> PageConfig {
    PageConfig {
        name: name.into(),
        tabs,
    }
}

pub fn project(pages: Vec<PageConfig>) -> ProjectConfig {
    ProjectConfig {
        name: "test-project".into(),
        common_parameters: Vec::new(),
        pages,
    }
}

/// Installs the env-filtered subscriber once per test binary, so a failing
/// run can be replayed with `RUST_LOG=veriflow=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn engine_builder(
    config: ProjectConfig,
    collector: Arc<dyn ParameterCollector>,
) -> ValidationEngineBuilder {
    init_tracing();
    ValidationEngine::builder(config)
        .instance_id("test-node")
        .collector("test", collector)
}

pub fn engine(config: ProjectConfig, collector: Arc<dyn ParameterCollector>) -> ValidationEngine {
    engine_builder(config, collector).build()
}
