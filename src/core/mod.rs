//! Core building blocks: shared session-scoped state, collaborator
//! contracts, and the worker pools the orchestrator schedules onto.

pub mod collector;
pub mod counters;
pub mod deferred;
pub mod notifier;
pub mod runtime_context;
pub mod session_store;
pub mod variable_store;
pub mod worker_pool;

pub use collector::{CollectContext, CollectOutcome, CollectorRegistry, ParameterCollector};
pub use counters::{CounterState, SessionCounters, UnprocessedCounter};
pub use deferred::{DeferredRegistration, DeferredResultRegistry};
pub use notifier::{ChannelNotifier, NoopNotifier, NotificationDispatcher, SessionUpdate};
pub use runtime_context::{
    Clock, FakeClock, IdGenerator, RuntimeContext, SequentialIdGenerator, SystemClock,
    UuidIdGenerator,
};
pub use session_store::{InMemorySessionStore, SessionMeta, SessionStateStore};
pub use variable_store::{ExecutionVariableStore, VariableSnapshot};
pub use worker_pool::WorkerPool;
