//! The execution engine: dispatch planning, the session orchestrator, the
//! expiration reaper, and cross-instance routing.

pub mod orchestrator;
pub mod plan;
pub mod reaper;
pub mod router;

pub use orchestrator::{
    CompletionContext, EngineConfig, ExecutionOrchestrator, SessionExecutionStatus, SessionRuntime,
};
pub use plan::{PagePlan, ParameterPlan, SessionPlan, TabPlan};
pub use reaper::{ExpirationReaper, ProcessRegistry, ReaperHandle, StaticProcessRegistry};
pub use router::{CrossInstanceMessage, CrossInstanceRouter, DeferredResultEvent};
