//! Public entry point: the [`ValidationEngine`] and its builder.

pub mod handle;

pub use handle::SessionHandle;

use std::sync::Arc;

use crate::core::{
    CollectorRegistry, InMemorySessionStore, NoopNotifier, NotificationDispatcher, RuntimeContext,
    SessionStateStore,
};
use crate::domain::{ActualValue, ExecutionRequest, ProjectConfig, SessionId, SessionRecord};
use crate::engine::{
    CrossInstanceMessage, CrossInstanceRouter, DeferredResultEvent, EngineConfig,
    ExecutionOrchestrator, ExpirationReaper, ProcessRegistry, ReaperHandle,
};
use crate::error::EngineResult;

/// One engine instance: owns the orchestrator, the cross-instance router,
/// and (unless disabled) the expiration reaper.
pub struct ValidationEngine {
    orchestrator: Arc<ExecutionOrchestrator>,
    router: CrossInstanceRouter,
    // Sweeps stop when the engine is dropped.
    _reaper: Option<ReaperHandle>,
}

impl ValidationEngine {
    pub fn builder(project: ProjectConfig) -> ValidationEngineBuilder {
        ValidationEngineBuilder::new(project)
    }

    /// Launch a session and return a handle tracking its lifecycle.
    pub async fn start_session(&self, request: ExecutionRequest) -> EngineResult<SessionHandle> {
        let (session_id, status_rx) = self.orchestrator.start_session(request).await?;
        Ok(SessionHandle::new(session_id, status_rx))
    }

    /// Cancel a running session. Returns false when it was already gone.
    pub async fn cancel_session(&self, id: &SessionId) -> bool {
        self.orchestrator.cancel_session(id).await
    }

    pub async fn session(&self, id: &SessionId) -> Option<SessionRecord> {
        self.orchestrator.session(id).await
    }

    /// Feed a deferred result event from the external transport. Returns
    /// true when this instance resolved a parked parameter with it.
    pub async fn handle_deferred_event(&self, event: DeferredResultEvent) -> bool {
        self.router.handle_deferred_event(event).await
    }

    /// Resolve a deferred parameter directly, bypassing routing.
    pub async fn resolve_deferred(&self, tracking_id: &str, values: Vec<ActualValue>) -> bool {
        self.orchestrator.resolve_deferred(tracking_id, values).await
    }

    /// Route a session update forwarded by another instance.
    pub async fn handle_message(&self, message: CrossInstanceMessage) -> bool {
        self.router.handle_message(message).await
    }

    pub fn orchestrator(&self) -> &Arc<ExecutionOrchestrator> {
        &self.orchestrator
    }
}

pub struct ValidationEngineBuilder {
    instance_id: String,
    config: EngineConfig,
    project: ProjectConfig,
    collectors: CollectorRegistry,
    store: Option<Arc<dyn SessionStateStore>>,
    notifier: Option<Arc<dyn NotificationDispatcher>>,
    context: RuntimeContext,
    processes: Option<Arc<dyn ProcessRegistry>>,
}

impl ValidationEngineBuilder {
    pub fn new(project: ProjectConfig) -> Self {
        Self {
            instance_id: format!("engine-{}", uuid::Uuid::new_v4()),
            config: EngineConfig::default(),
            project,
            collectors: CollectorRegistry::new(),
            store: None,
            notifier: None,
            context: RuntimeContext::system(),
            processes: None,
        }
    }

    pub fn instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = id.into();
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn collector(
        mut self,
        source_type: impl Into<String>,
        collector: Arc<dyn crate::core::ParameterCollector>,
    ) -> Self {
        self.collectors.register(source_type, collector);
        self
    }

    pub fn store(mut self, store: Arc<dyn SessionStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn runtime_context(mut self, context: RuntimeContext) -> Self {
        self.context = context;
        self
    }

    /// Enable the expiration reaper against this process registry.
    pub fn process_registry(mut self, processes: Arc<dyn ProcessRegistry>) -> Self {
        self.processes = Some(processes);
        self
    }

    pub fn build(self) -> ValidationEngine {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(NoopNotifier));
        let orchestrator = ExecutionOrchestrator::new(
            self.instance_id,
            self.config,
            Arc::new(self.project),
            Arc::new(self.collectors),
            store,
            notifier,
            self.context,
        );
        let reaper = self
            .processes
            .map(|processes| ExpirationReaper::spawn(orchestrator.clone(), processes));
        ValidationEngine {
            router: CrossInstanceRouter::new(orchestrator.clone()),
            orchestrator,
            _reaper: reaper,
        }
    }
}
