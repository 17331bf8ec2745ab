//! Execution orchestrator, the main session driver.
//!
//! The [`ExecutionOrchestrator`] turns a dispatch plan into running
//! parameter tasks, funnels every result (immediate, deferred, timed out,
//! panicked) through the single completion path, and lets the fan-in
//! counters drive tab, page, and session rollup. All cross-task state
//! flows through explicit arguments and the shared counter/variable
//! structures; no task ever navigates from a child record to its parent.

use chrono::Duration as ChronoDuration;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::core::{
    CollectContext, CollectOutcome, CollectorRegistry, CounterState, DeferredResultRegistry,
    ExecutionVariableStore, NotificationDispatcher, ParameterCollector, RuntimeContext,
    SessionCounters, SessionStateStore, SessionUpdate, WorkerPool,
};
use crate::domain::{
    ActualValue, ExecutionFlags, ExecutionRequest, LogSearchPeriod, ParameterConfig, ParameterPath,
    ProjectConfig, SessionId, SessionRecord, TimeoutRange, ValidationInfo, ValidationStatus,
    VariableValue, COMMON_TAB,
};
use crate::engine::plan::{PagePlan, ParameterPlan, SessionPlan, TabPlan};
use crate::error::{CollectError, EngineError, EngineResult};

/// Configuration for the validation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_collection_pool_size")]
    pub collection_pool_size: usize,
    #[serde(default = "default_validation_pool_size")]
    pub validation_pool_size: usize,
    /// How long a deferred registration may wait for its external result.
    #[serde(default = "default_deferred_lifespan_secs")]
    pub deferred_lifespan_secs: u64,
    /// How long a finished or abandoned session record is kept.
    #[serde(default = "default_session_lifespan_secs")]
    pub session_lifespan_secs: u64,
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
    #[serde(default = "default_lost_session_interval_secs")]
    pub lost_session_interval_secs: u64,
    /// Fallback per-collect timeout when the request carries no range.
    #[serde(default = "default_collect_timeout_secs")]
    pub collect_timeout_secs: u64,
}

fn default_collection_pool_size() -> usize {
    16
}
fn default_validation_pool_size() -> usize {
    4
}
fn default_deferred_lifespan_secs() -> u64 {
    600
}
fn default_session_lifespan_secs() -> u64 {
    21_600
}
fn default_reaper_interval_secs() -> u64 {
    60
}
fn default_lost_session_interval_secs() -> u64 {
    300
}
fn default_collect_timeout_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            collection_pool_size: default_collection_pool_size(),
            validation_pool_size: default_validation_pool_size(),
            deferred_lifespan_secs: default_deferred_lifespan_secs(),
            session_lifespan_secs: default_session_lifespan_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
            lost_session_interval_secs: default_lost_session_interval_secs(),
            collect_timeout_secs: default_collect_timeout_secs(),
        }
    }
}

/// Observer-facing lifecycle of one session run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExecutionStatus {
    Running,
    Completed(ValidationStatus),
    Cancelled,
    Expired,
}

impl SessionExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionExecutionStatus::Running)
    }
}

/// In-memory runtime state of one owned session. Everything in here is
/// coordination state; the authoritative record lives in the store.
pub struct SessionRuntime {
    pub session_id: SessionId,
    pub flags: ExecutionFlags,
    pub environment_id: String,
    pub key_parameters: HashMap<String, String>,
    pub log_search_period: Option<LogSearchPeriod>,
    pub timeout_range: Option<TimeoutRange>,
    pub variables: Arc<ExecutionVariableStore>,
    pub counters: Arc<SessionCounters>,
    pub plan: Arc<SessionPlan>,
    pub started_at: DateTime<Utc>,
    cancelled: AtomicBool,
    status_tx: watch::Sender<SessionExecutionStatus>,
}

impl SessionRuntime {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn set_status(&self, status: SessionExecutionStatus) {
        let _ = self.status_tx.send(status);
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionExecutionStatus> {
        self.status_tx.subscribe()
    }
}

/// Everything the completion path needs about one dispatched parameter.
/// For deferred parameters this is what gets parked in the registry; no
/// task sits blocked waiting for the external result.
#[derive(Debug)]
pub struct CompletionContext {
    pub session_id: SessionId,
    pub path: ParameterPath,
    /// Expected value with placeholders already resolved at dispatch.
    pub expected: Option<String>,
    pub warning_only: bool,
    pub manual: bool,
    /// Dispatched by an ordered driver; a non-error result is published to
    /// the variable store for successors.
    pub ordered: bool,
    /// Completion feeds the page's synchronous-parameters counter.
    pub synchronous: bool,
    /// Ordering signal for sequential drivers. Fired exactly once, on any
    /// exit from the completion path.
    pub done_tx: Option<oneshot::Sender<()>>,
}

/// Fires the ordering signal on drop so no early return can wedge an
/// ordered driver.
struct DoneSignal(Option<oneshot::Sender<()>>);

impl Drop for DoneSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

pub struct ExecutionOrchestrator {
    instance_id: String,
    config: EngineConfig,
    project: Arc<ProjectConfig>,
    collectors: Arc<CollectorRegistry>,
    store: Arc<dyn SessionStateStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    deferred: DeferredResultRegistry<CompletionContext>,
    collection_pool: WorkerPool,
    validation_pool: WorkerPool,
    active: DashMap<SessionId, Arc<SessionRuntime>>,
    context: RuntimeContext,
}

impl ExecutionOrchestrator {
    pub fn new(
        instance_id: impl Into<String>,
        config: EngineConfig,
        project: Arc<ProjectConfig>,
        collectors: Arc<CollectorRegistry>,
        store: Arc<dyn SessionStateStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        context: RuntimeContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            instance_id: instance_id.into(),
            collection_pool: WorkerPool::new(config.collection_pool_size),
            validation_pool: WorkerPool::new(config.validation_pool_size),
            config,
            project,
            collectors,
            store,
            notifier,
            deferred: DeferredResultRegistry::new(),
            active: DashMap::new(),
            context,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStateStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationDispatcher> {
        &self.notifier
    }

    pub fn active_session_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_deferred_count(&self) -> usize {
        self.deferred.len()
    }

    pub async fn session(&self, id: &SessionId) -> Option<SessionRecord> {
        self.store.load_session(id).await
    }

    /// Plan, persist, and launch a session. Returns the id and a receiver
    /// tracking the session's lifecycle.
    pub async fn start_session(
        self: &Arc<Self>,
        request: ExecutionRequest,
    ) -> EngineResult<(SessionId, watch::Receiver<SessionExecutionStatus>)> {
        let plan = Arc::new(SessionPlan::build(&self.project, &request)?);
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| SessionId::new(self.context.next_id()));
        let now = self.context.now();

        let record = plan.to_record(session_id.clone(), &self.instance_id, &request, now);
        self.store.insert_session(record).await?;

        let variables = Arc::new(ExecutionVariableStore::new());
        for (name, value) in SessionPlan::seed_variables(&request) {
            variables.set(name, VariableValue::from(value));
        }

        let (status_tx, status_rx) = watch::channel(SessionExecutionStatus::Running);
        let runtime = Arc::new(SessionRuntime {
            session_id: session_id.clone(),
            flags: request.flags,
            environment_id: request.environment_id.clone(),
            key_parameters: request.key_parameters.clone(),
            log_search_period: request.log_search_period.clone(),
            timeout_range: request.timeout_range,
            variables,
            counters: Arc::new(plan.counters()),
            plan: plan.clone(),
            started_at: now,
            cancelled: AtomicBool::new(false),
            status_tx,
        });
        self.active.insert(session_id.clone(), runtime.clone());

        info!(
            session = %session_id,
            environment = %request.environment_id,
            parameters = plan.parameter_count(),
            "session started"
        );

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.drive_session(runtime).await;
        });

        Ok((session_id, status_rx))
    }

    async fn drive_session(self: Arc<Self>, runtime: Arc<SessionRuntime>) {
        let plan = runtime.plan.clone();

        // Common parameters run to completion first; page parameters may
        // reference their published variables.
        if !plan.common.is_empty() {
            let mut waits = Vec::with_capacity(plan.common.len());
            for param in &plan.common {
                let (done_tx, done_rx) = oneshot::channel();
                self.clone()
                    .dispatch_parameter(runtime.clone(), param.clone(), Some(done_tx))
                    .await;
                waits.push(done_rx);
            }
            for wait in waits {
                let _ = wait.await;
            }
        }

        if runtime.is_cancelled() {
            return;
        }

        for page in &plan.pages {
            let orchestrator = self.clone();
            let runtime = runtime.clone();
            let page = page.clone();
            tokio::spawn(async move {
                orchestrator.drive_page(runtime, page).await;
            });
        }
    }

    async fn drive_page(self: Arc<Self>, runtime: Arc<SessionRuntime>, page: PagePlan) {
        self.notifier.publish(
            &runtime.session_id,
            SessionUpdate::PageInProgress {
                page: page.name.clone(),
            },
        );

        if page.tabs.is_empty() {
            self.finalize_page(&runtime, &page.name).await;
            return;
        }

        // Empty tabs have no completion to drive their fan-in; settle them
        // up front.
        for tab in page.tabs.iter().filter(|t| t.parameters.is_empty()) {
            self.finalize_tab(&runtime, &page.name, &tab.name).await;
        }

        if page.synchronous_parameter_count() == 0 {
            self.clone()
                .start_asynchronous_tabs(runtime.clone(), &page.name)
                .await;
            return;
        }

        // Ordered phase. The page's synchronous counter reaching zero is
        // what releases the asynchronous tabs, so a deferred synchronous
        // parameter holds them back until its result arrives.
        for tab in page.synchronous_tabs() {
            self.drive_ordered(&runtime, &tab.parameters).await;
            if runtime.is_cancelled() {
                return;
            }
        }
    }

    async fn start_asynchronous_tabs(
        self: Arc<Self>,
        runtime: Arc<SessionRuntime>,
        page: &str,
    ) {
        let previous = match self
            .store
            .mark_tabs_loading_started(&runtime.session_id, page)
            .await
        {
            Ok(previous) => previous,
            Err(_) => return,
        };
        if previous {
            debug!(session = %runtime.session_id, page, "asynchronous tabs already dispatched");
            return;
        }
        let Some(page_plan) = runtime.plan.page(page) else {
            return;
        };
        for tab in page_plan.asynchronous_tabs() {
            if tab.parameters.is_empty() {
                continue;
            }
            let orchestrator = self.clone();
            let runtime = runtime.clone();
            let tab = tab.clone();
            tokio::spawn(async move {
                orchestrator.drive_tab(runtime, tab).await;
            });
        }
    }

    /// Type-erased wrapper for re-entry from the completion path. The
    /// dispatch chain behind `start_asynchronous_tabs` eventually awaits
    /// `complete_parameter` again, and the compiler rejects the resulting
    /// recursive future type unless this edge is boxed.
    fn start_asynchronous_tabs_boxed(
        self: Arc<Self>,
        runtime: Arc<SessionRuntime>,
        page: String,
    ) -> BoxFuture<'static, ()> {
        async move { self.start_asynchronous_tabs(runtime, &page).await }.boxed()
    }

    async fn drive_tab(self: Arc<Self>, runtime: Arc<SessionRuntime>, tab: TabPlan) {
        let (ordered, concurrent): (Vec<ParameterPlan>, Vec<ParameterPlan>) =
            tab.parameters.iter().cloned().partition(|p| p.ordered);
        self.drive_ordered(&runtime, &ordered).await;
        if runtime.is_cancelled() {
            return;
        }
        for param in concurrent {
            self.clone()
                .dispatch_parameter(runtime.clone(), param, None)
                .await;
        }
    }

    /// Dispatch parameters strictly one after another, each awaited to a
    /// terminal completion (including deferred resolution) before the next
    /// snapshot is taken.
    async fn drive_ordered(
        self: &Arc<Self>,
        runtime: &Arc<SessionRuntime>,
        parameters: &[ParameterPlan],
    ) {
        for param in parameters {
            if runtime.is_cancelled() {
                return;
            }
            let (done_tx, done_rx) = oneshot::channel();
            self.clone()
                .dispatch_parameter(runtime.clone(), param.clone(), Some(done_tx))
                .await;
            let _ = done_rx.await;
        }
    }

    async fn dispatch_parameter(
        self: Arc<Self>,
        runtime: Arc<SessionRuntime>,
        param: ParameterPlan,
        done_tx: Option<oneshot::Sender<()>>,
    ) {
        let snapshot = runtime.variables.snapshot();
        let resolved_query = snapshot.resolve_placeholders(&param.spec.query);
        let expected = param
            .spec
            .expected
            .as_deref()
            .map(|e| snapshot.resolve_placeholders(e));

        let completion = CompletionContext {
            session_id: runtime.session_id.clone(),
            path: param.path.clone(),
            expected,
            warning_only: param.spec.warning_only,
            manual: param.spec.manual,
            ordered: param.ordered,
            synchronous: param.synchronous,
            done_tx,
        };

        if param.spec.manual {
            // Manually verified parameters never reach a collector.
            self.complete_parameter(completion, Vec::new()).await;
            return;
        }

        let Some(collector) = self.collectors.get(&param.spec.source_type) else {
            let description =
                EngineError::CollectorNotFound(param.spec.source_type.clone()).to_string();
            warn!(session = %runtime.session_id, parameter = %param.path, %description, "dispatch failed");
            self.complete_parameter(completion, vec![ActualValue::error(description)])
                .await;
            return;
        };

        let collect_ctx = CollectContext {
            session_id: runtime.session_id.clone(),
            environment_id: runtime.environment_id.clone(),
            key_parameters: runtime.key_parameters.clone(),
            variables: snapshot,
            log_search_period: runtime.log_search_period.clone(),
            timeout_range: runtime.timeout_range,
            resolved_query,
        };
        let timeout = Duration::from_secs(
            runtime
                .timeout_range
                .map(|t| t.max_secs)
                .unwrap_or(self.config.collect_timeout_secs),
        );
        let spec = param.spec.clone();
        let orchestrator = self.clone();
        let runtime = runtime.clone();
        self.collection_pool
            .dispatch(async move {
                orchestrator
                    .run_collect(runtime, collector, spec, collect_ctx, completion, timeout)
                    .await;
            })
            .await;
    }

    async fn run_collect(
        self: Arc<Self>,
        runtime: Arc<SessionRuntime>,
        collector: Arc<dyn ParameterCollector>,
        spec: ParameterConfig,
        collect_ctx: CollectContext,
        completion: CompletionContext,
        timeout: Duration,
    ) {
        let mut completion = completion;
        if runtime.is_cancelled() {
            // Session ended while this dispatch was queued.
            drop(DoneSignal(completion.done_tx.take()));
            return;
        }

        let fut = AssertUnwindSafe(collector.collect(&spec, &collect_ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, fut).await {
            Err(_) => Err(CollectError::Timeout),
            Ok(Err(panic)) => {
                error!(
                    session = %completion.session_id,
                    parameter = %completion.path,
                    "collector panicked: {:?}",
                    panic.downcast_ref::<&str>()
                );
                Err(CollectError::Source("collector panicked".to_string()))
            }
            Ok(Ok(result)) => result,
        };

        match outcome {
            Ok(CollectOutcome::Immediate(values)) => {
                self.complete_parameter(completion, values).await;
            }
            Ok(CollectOutcome::Deferred { tracking_id }) => {
                if self
                    .store
                    .mark_parameter_deferred(&completion.session_id, &completion.path, &tracking_id)
                    .await
                    .is_err()
                {
                    debug!(session = %completion.session_id, %tracking_id, "session gone before deferral registered");
                    drop(DoneSignal(completion.done_tx.take()));
                    return;
                }
                debug!(
                    session = %completion.session_id,
                    parameter = %completion.path,
                    %tracking_id,
                    "parameter deferred"
                );
                self.deferred
                    .register(tracking_id, completion, self.context.now());
            }
            Err(err) => {
                self.complete_parameter(completion, vec![ActualValue::error(err.to_string())])
                    .await;
            }
        }
    }

    /// The single completion path. Every parameter result re-enters here:
    /// immediate collects, deferred resolutions, expiries, timeouts,
    /// collector errors and panics, manual parameters.
    pub(crate) async fn complete_parameter(
        self: &Arc<Self>,
        completion: CompletionContext,
        values: Vec<ActualValue>,
    ) {
        let CompletionContext {
            session_id,
            path,
            expected,
            warning_only,
            manual,
            ordered,
            synchronous,
            done_tx,
        } = completion;
        let _signal = DoneSignal(done_tx);

        let Some(runtime) = self.active.get(&session_id).map(|r| r.value().clone()) else {
            debug!(session = %session_id, parameter = %path, "completion for inactive session ignored");
            return;
        };
        if runtime.is_cancelled() {
            return;
        }

        let validation = validate(manual, expected.as_deref(), warning_only, &values);

        if self
            .store
            .store_parameter_result(&session_id, &path, values.clone(), validation.clone())
            .await
            .is_err()
        {
            debug!(
                session = %session_id,
                parameter = %path,
                "{}",
                EngineError::SessionVanished(session_id.clone())
            );
            return;
        }

        // Ordered and common parameters publish their value for later
        // dispatches, before any sibling can observe this completion.
        if ordered || path.is_common() {
            if let Some(value) = values.iter().find_map(|v| v.as_variable_value()) {
                runtime.variables.set(path.variable_key(), value.clone());
            }
        }

        self.notifier.publish(
            &session_id,
            SessionUpdate::Parameter {
                path: path.clone(),
                values,
                validation,
            },
        );

        match runtime.counters.total_parameters.complete_one() {
            CounterState::Remaining(remaining) => {
                self.notifier
                    .publish(&session_id, SessionUpdate::RemainingCount { remaining });
            }
            CounterState::ReachedZero => {
                self.notifier
                    .publish(&session_id, SessionUpdate::RemainingCount { remaining: 0 });
            }
            CounterState::Underflow => {
                error!(
                    session = %session_id,
                    parameter = %path,
                    "{}",
                    EngineError::CounterUnderflow { scope: "session parameters".into() }
                );
                return;
            }
        }

        if path.is_common() {
            match runtime.counters.common_parameters.complete_one() {
                CounterState::ReachedZero => {
                    let orchestrator = self.clone();
                    let runtime = runtime.clone();
                    self.validation_pool
                        .dispatch(async move {
                            orchestrator.finalize_common(&runtime).await;
                        })
                        .await;
                }
                CounterState::Underflow => {
                    error!(
                        session = %session_id,
                        "{}",
                        EngineError::CounterUnderflow { scope: "common parameters".into() }
                    );
                }
                CounterState::Remaining(_) => {}
            }
            return;
        }

        if synchronous {
            if let Some(page_counters) = runtime.counters.page(&path.page) {
                match page_counters.synchronous_parameters.complete_one() {
                    CounterState::ReachedZero => {
                        tokio::spawn(self.clone().start_asynchronous_tabs_boxed(
                            runtime.clone(),
                            path.page.clone(),
                        ));
                    }
                    CounterState::Underflow => {
                        error!(
                            session = %session_id,
                            page = %path.page,
                            "{}",
                            EngineError::CounterUnderflow {
                                scope: format!("synchronous parameters of page {}", path.page),
                            }
                        );
                    }
                    CounterState::Remaining(_) => {}
                }
            }
        }

        let Some(tab_counter) = runtime.counters.tab_parameters(&path.page, &path.tab) else {
            error!(session = %session_id, parameter = %path, "no counter for tab");
            return;
        };
        match tab_counter.complete_one() {
            CounterState::ReachedZero => {
                let orchestrator = self.clone();
                let runtime = runtime.clone();
                let page = path.page.clone();
                let tab = path.tab.clone();
                self.validation_pool
                    .dispatch(async move {
                        orchestrator.finalize_tab(&runtime, &page, &tab).await;
                    })
                    .await;
            }
            CounterState::Underflow => {
                error!(
                    session = %session_id,
                    parameter = %path,
                    "{}",
                    EngineError::CounterUnderflow {
                        scope: format!("tab {}/{}", path.page, path.tab),
                    }
                );
            }
            CounterState::Remaining(_) => {}
        }
    }

    async fn finalize_common(&self, runtime: &SessionRuntime) {
        let Some(record) = self.store.load_session(&runtime.session_id).await else {
            return;
        };
        let Some(common) = &record.common else {
            return;
        };
        let status = ValidationStatus::rollup(common.parameter_statuses());
        if self
            .store
            .set_tab_status(&runtime.session_id, "", COMMON_TAB, status)
            .await
            .is_err()
        {
            return;
        }
        self.notifier.publish(
            &runtime.session_id,
            SessionUpdate::TabStatus {
                page: String::new(),
                tab: COMMON_TAB.to_string(),
                status,
            },
        );
        self.complete_unit(runtime).await;
    }

    async fn finalize_tab(&self, runtime: &SessionRuntime, page: &str, tab: &str) {
        let Some(record) = self.store.load_session(&runtime.session_id).await else {
            return;
        };
        let Some(tab_record) = record.tab(page, tab) else {
            error!(session = %runtime.session_id, page, tab, "finalizing unknown tab");
            return;
        };
        let status = ValidationStatus::rollup(tab_record.parameter_statuses());
        if self
            .store
            .set_tab_status(&runtime.session_id, page, tab, status)
            .await
            .is_err()
        {
            return;
        }
        self.notifier.publish(
            &runtime.session_id,
            SessionUpdate::TabStatus {
                page: page.to_string(),
                tab: tab.to_string(),
                status,
            },
        );

        let Some(page_counters) = runtime.counters.page(page) else {
            return;
        };
        match page_counters.tabs.complete_one() {
            CounterState::ReachedZero => self.finalize_page(runtime, page).await,
            CounterState::Underflow => {
                error!(
                    session = %runtime.session_id,
                    "{}",
                    EngineError::CounterUnderflow { scope: format!("tabs of page {}", page) }
                );
            }
            CounterState::Remaining(_) => {}
        }
    }

    async fn finalize_page(&self, runtime: &SessionRuntime, page: &str) {
        let Some(record) = self.store.load_session(&runtime.session_id).await else {
            return;
        };
        let Some(page_record) = record.page(page) else {
            error!(session = %runtime.session_id, page, "finalizing unknown page");
            return;
        };
        let status = ValidationStatus::rollup(page_record.tabs.iter().map(|t| t.status));
        if self
            .store
            .set_page_status(&runtime.session_id, page, status)
            .await
            .is_err()
        {
            return;
        }
        self.notifier.publish(
            &runtime.session_id,
            SessionUpdate::PageStatus {
                page: page.to_string(),
                status,
            },
        );
        self.complete_unit(runtime).await;
    }

    async fn complete_unit(&self, runtime: &SessionRuntime) {
        match runtime.counters.units.complete_one() {
            CounterState::ReachedZero => self.finalize_session(runtime).await,
            CounterState::Underflow => {
                error!(
                    session = %runtime.session_id,
                    "{}",
                    EngineError::CounterUnderflow { scope: "session units".into() }
                );
            }
            CounterState::Remaining(_) => {}
        }
    }

    async fn finalize_session(&self, runtime: &SessionRuntime) {
        let Some(record) = self.store.load_session(&runtime.session_id).await else {
            return;
        };
        let status = ValidationStatus::rollup(record.unit_statuses());
        if self
            .store
            .set_session_status(&runtime.session_id, status, true)
            .await
            .is_err()
        {
            return;
        }
        self.notifier
            .publish(&runtime.session_id, SessionUpdate::SessionStatus { status });
        info!(session = %runtime.session_id, %status, "session complete");
        runtime.set_status(SessionExecutionStatus::Completed(status));
        self.active.remove(&runtime.session_id);
    }

    /// Feed an external deferred result back into the completion path.
    /// Returns false when the tracking id is unknown here: resolved
    /// already, expired, or owned by another instance.
    pub async fn resolve_deferred(
        self: &Arc<Self>,
        tracking_id: &str,
        values: Vec<ActualValue>,
    ) -> bool {
        let Some(registration) = self.deferred.take(tracking_id) else {
            debug!(tracking_id, "no deferred registration for tracking id");
            return false;
        };
        self.complete_parameter(registration.context, values).await;
        true
    }

    /// Expire deferred registrations past their lifespan. Expiry is not
    /// resolution: each parked context is still driven to a terminal error
    /// completion so fan-in counters keep moving.
    pub async fn evict_expired_deferred(self: &Arc<Self>) -> usize {
        let lifespan = ChronoDuration::seconds(self.config.deferred_lifespan_secs as i64);
        let expired = self.deferred.take_expired(self.context.now(), lifespan);
        let count = expired.len();
        for (tracking_id, registration) in expired {
            warn!(
                %tracking_id,
                parameter = %registration.context.path,
                "deferred result expired"
            );
            let description = CollectError::DeferredExpired(tracking_id).to_string();
            self.complete_parameter(registration.context, vec![ActualValue::error(description)])
                .await;
        }
        count
    }

    /// Cancel a running session. False means the session was already gone;
    /// racing an expiry or a duplicate cancel is a no-op.
    pub async fn cancel_session(&self, id: &SessionId) -> bool {
        let removed = self.end_session(id, SessionExecutionStatus::Cancelled).await;
        if removed {
            info!(session = %id, "session cancelled");
        }
        removed
    }

    pub async fn expire_session(&self, id: &SessionId) -> bool {
        let removed = self.end_session(id, SessionExecutionStatus::Expired).await;
        if removed {
            self.notifier.publish(id, SessionUpdate::SessionExpired);
            info!(session = %id, "session expired");
        }
        removed
    }

    async fn end_session(&self, id: &SessionId, status: SessionExecutionStatus) -> bool {
        if let Some((_, runtime)) = self.active.remove(id) {
            runtime.cancel();
            runtime.set_status(status);
        }
        self.store.remove_session(id).await.is_some()
    }

    /// Expire every owned session that outlived the configured lifespan.
    pub async fn expire_overdue_sessions(&self) -> usize {
        let cutoff =
            self.context.now() - ChronoDuration::seconds(self.config.session_lifespan_secs as i64);
        let mut expired = 0;
        for meta in self.store.list_sessions().await {
            if meta.owner_instance == self.instance_id && meta.started_at <= cutoff {
                if self.expire_session(&meta.id).await {
                    expired += 1;
                }
            }
        }
        expired
    }

    /// Remove sessions whose owning instance is no longer alive.
    pub async fn remove_lost_sessions(&self, live_instances: &[String]) -> usize {
        let mut removed = 0;
        for meta in self.store.list_sessions().await {
            if !live_instances.contains(&meta.owner_instance) {
                warn!(
                    session = %meta.id,
                    owner = %meta.owner_instance,
                    "removing session lost to a dead instance"
                );
                if self.expire_session(&meta.id).await {
                    removed += 1;
                }
            }
        }
        removed
    }
}

fn validate(
    manual: bool,
    expected: Option<&str>,
    warning_only: bool,
    values: &[ActualValue],
) -> ValidationInfo {
    if manual {
        return ValidationInfo::terminal(ValidationStatus::Manual);
    }
    let failed = if warning_only {
        ValidationStatus::Warning
    } else {
        ValidationStatus::Failed
    };
    if let Some(description) = values.iter().find_map(|v| v.error_description()) {
        return ValidationInfo::with_error(failed, description.to_string());
    }
    let Some(expected) = expected else {
        // No expectation: the parameter reports its value but does not
        // participate in validation.
        return ValidationInfo::terminal(ValidationStatus::None);
    };
    let matched = values
        .iter()
        .filter_map(|v| v.as_variable_value())
        .any(|v| v.to_display_string() == expected);
    if matched {
        ValidationInfo::terminal(ValidationStatus::Passed)
    } else {
        let actual = values
            .iter()
            .map(|v| v.to_display_string())
            .collect::<Vec<_>>()
            .join(", ");
        ValidationInfo::with_error(failed, format!("expected '{}', got '{}'", expected, actual))
    }
}
