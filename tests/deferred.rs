//! Deferred result lifecycle: registration, idempotent resolution,
//! non-terminal event discard, and expiry.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use support::{engine, page, param, project, simple_tab, Script, ScriptedCollector};
use veriflow::core::{FakeClock, RuntimeContext, SequentialIdGenerator};
use veriflow::domain::ParameterPath;
use veriflow::{
    ActualValue, DeferredResultEvent, ExecutionRequest, SessionExecutionStatus, ValidationEngine,
    ValidationStatus,
};

fn deferring_project() -> veriflow::ProjectConfig {
    project(vec![page(
        "P",
        vec![simple_tab("T", vec![param("a", Some("done"))])],
    )])
}

fn deferring_engine() -> ValidationEngine {
    let collector = ScriptedCollector::new().with("a", Script::Defer("req-1"));
    engine(deferring_project(), Arc::new(collector))
}

async fn wait_for_deferred(engine: &ValidationEngine, count: usize) {
    for _ in 0..200 {
        if engine.orchestrator().pending_deferred_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deferred registration never appeared");
}

fn terminal_event(tracking_id: &str, value: &str) -> DeferredResultEvent {
    DeferredResultEvent {
        tracking_id: tracking_id.to_string(),
        values: vec![ActualValue::value(value)],
        has_ended_status: true,
    }
}

#[tokio::test]
async fn test_deferred_parameter_resolves_and_session_completes() {
    let engine = deferring_engine();
    let mut handle = engine
        .start_session(ExecutionRequest::new("uat").with_pages(["P"]))
        .await
        .unwrap();

    wait_for_deferred(&engine, 1).await;
    let record = engine.session(handle.session_id()).await.unwrap();
    let parked = record
        .parameter(&ParameterPath::new("P", "T", "main", "a"))
        .unwrap();
    assert!(parked.deferred);
    assert_eq!(parked.tracking_id.as_deref(), Some("req-1"));
    assert_eq!(parked.validation.status, ValidationStatus::InProgress);

    assert!(engine.handle_deferred_event(terminal_event("req-1", "done")).await);
    assert_eq!(
        handle.wait().await,
        SessionExecutionStatus::Completed(ValidationStatus::Passed)
    );
}

#[tokio::test]
async fn test_duplicate_resolution_is_noop() {
    let engine = deferring_engine();
    let mut handle = engine
        .start_session(ExecutionRequest::new("uat").with_pages(["P"]))
        .await
        .unwrap();
    wait_for_deferred(&engine, 1).await;

    assert!(engine.handle_deferred_event(terminal_event("req-1", "done")).await);
    // A redelivered event finds nothing to resolve.
    assert!(!engine.handle_deferred_event(terminal_event("req-1", "other")).await);

    assert_eq!(
        handle.wait().await,
        SessionExecutionStatus::Completed(ValidationStatus::Passed)
    );
    let record = engine.session(handle.session_id()).await.unwrap();
    let resolved = record
        .parameter(&ParameterPath::new("P", "T", "main", "a"))
        .unwrap();
    assert_eq!(resolved.actual, vec![ActualValue::value("done")]);
}

#[tokio::test]
async fn test_event_without_terminal_status_is_discarded() {
    let engine = deferring_engine();
    let _handle = engine
        .start_session(ExecutionRequest::new("uat").with_pages(["P"]))
        .await
        .unwrap();
    wait_for_deferred(&engine, 1).await;

    let event = DeferredResultEvent {
        tracking_id: "req-1".to_string(),
        values: vec![],
        has_ended_status: false,
    };
    assert!(!engine.handle_deferred_event(event).await);
    // The registration survives for the real terminal event.
    assert_eq!(engine.orchestrator().pending_deferred_count(), 1);
}

#[tokio::test]
async fn test_unknown_tracking_id_returns_false() {
    let engine = deferring_engine();
    assert!(!engine.handle_deferred_event(terminal_event("never-seen", "x")).await);
}

#[tokio::test]
async fn test_expired_deferred_completes_with_error() {
    let clock = Arc::new(FakeClock::new(Utc::now()));
    let context = RuntimeContext {
        clock: clock.clone(),
        ids: Arc::new(SequentialIdGenerator::default()),
    };
    let collector = ScriptedCollector::new().with("a", Script::Defer("req-1"));
    let engine = support::engine_builder(deferring_project(), Arc::new(collector))
        .runtime_context(context)
        .build();

    let mut handle = engine
        .start_session(ExecutionRequest::new("uat").with_pages(["P"]))
        .await
        .unwrap();
    wait_for_deferred(&engine, 1).await;

    // Past the deferred lifespan; the sweep must still drive the parked
    // context to a terminal completion.
    clock.advance(chrono::Duration::seconds(601));
    assert_eq!(engine.orchestrator().evict_expired_deferred().await, 1);

    assert_eq!(
        handle.wait().await,
        SessionExecutionStatus::Completed(ValidationStatus::Failed)
    );
    let record = engine.session(handle.session_id()).await.unwrap();
    let expired = record
        .parameter(&ParameterPath::new("P", "T", "main", "a"))
        .unwrap();
    assert_eq!(expired.validation.status, ValidationStatus::Failed);
    assert!(expired
        .validation
        .error_description
        .as_deref()
        .unwrap()
        .contains("expired"));

    // Expiry consumed the registration; a late event is a no-op.
    assert!(!engine.handle_deferred_event(terminal_event("req-1", "done")).await);
}

#[tokio::test]
async fn test_fresh_deferred_survives_sweep() {
    let clock = Arc::new(FakeClock::new(Utc::now()));
    let context = RuntimeContext {
        clock: clock.clone(),
        ids: Arc::new(SequentialIdGenerator::default()),
    };
    let collector = ScriptedCollector::new().with("a", Script::Defer("req-1"));
    let engine = support::engine_builder(deferring_project(), Arc::new(collector))
        .runtime_context(context)
        .build();

    let _handle = engine
        .start_session(ExecutionRequest::new("uat").with_pages(["P"]))
        .await
        .unwrap();
    wait_for_deferred(&engine, 1).await;

    clock.advance(chrono::Duration::seconds(60));
    assert_eq!(engine.orchestrator().evict_expired_deferred().await, 0);
    assert_eq!(engine.orchestrator().pending_deferred_count(), 1);
}
