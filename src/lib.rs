//! # Veriflow: a session execution and validation engine
//!
//! `veriflow` runs validation sessions against a configured project tree
//! (pages → tabs → groups → parameters), collecting each parameter's
//! actual value from pluggable external sources and rolling validation
//! statuses bottom-up to a single session verdict. It supports:
//!
//! - **Concurrent collection**: parameters fan out onto a bounded worker
//!   pool; fan-in is coordinated entirely by monotonically decrementing
//!   counters, never by polling shared state.
//! - **Deferred results**: a collector may answer with a tracking id; the
//!   execution context is parked in a registry and resumed when the
//!   external result event arrives, with no task blocked in between.
//! - **Ordered execution**: synchronous tabs and groups run one parameter
//!   at a time, and each dispatch sees a snapshot of the variables its
//!   predecessors published.
//! - **Expiration**: periodic sweeps expire overdue deferred results and
//!   sessions, and clean up sessions lost to dead instances.
//! - **Cross-instance routing**: deferred events and session updates are
//!   broadcast; each instance acts only on what it owns.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use veriflow::{ExecutionRequest, ProjectConfig, ValidationEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let json = std::fs::read_to_string("project.json").unwrap();
//!     let project: ProjectConfig = serde_json::from_str(&json).unwrap();
//!     let engine = ValidationEngine::builder(project)
//!         // .collector("sql", Arc::new(MySqlCollector::new(...)))
//!         .build();
//!     let mut handle = engine
//!         .start_session(ExecutionRequest::new("uat").with_pages(["Invoices"]))
//!         .await
//!         .unwrap();
//!     let status = handle.wait().await;
//!     println!("{:?}", status);
//! }
//! ```

pub mod api;
pub mod core;
pub mod domain;
pub mod engine;
pub mod error;

pub use crate::api::{SessionHandle, ValidationEngine, ValidationEngineBuilder};
pub use crate::core::{
    ChannelNotifier, CollectContext, CollectOutcome, CollectorRegistry, CounterState,
    DeferredResultRegistry, ExecutionVariableStore, FakeClock, InMemorySessionStore, NoopNotifier,
    NotificationDispatcher, ParameterCollector, RuntimeContext, SequentialIdGenerator,
    SessionStateStore, SessionUpdate, UnprocessedCounter, VariableSnapshot, WorkerPool,
};
pub use crate::domain::{
    ActualValue, ExecutionFlags, ExecutionRequest, ParameterConfig, ParameterPath, ProjectConfig,
    SessionId, SessionRecord, ValidationInfo, ValidationStatus, VariableValue,
};
pub use crate::engine::{
    CrossInstanceMessage, CrossInstanceRouter, DeferredResultEvent, EngineConfig,
    ExpirationReaper, ProcessRegistry, SessionExecutionStatus, StaticProcessRegistry,
};
pub use crate::error::{CollectError, EngineError};
