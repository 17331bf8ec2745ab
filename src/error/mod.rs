//! Error types for the validation engine.
//!
//! - [`CollectError`]: errors raised by a single parameter collector.
//! - [`EngineError`]: top-level errors for session construction and execution.

pub mod collect_error;
pub mod engine_error;

pub use collect_error::CollectError;
pub use engine_error::EngineError;

/// Convenience alias for engine-level results.
pub type EngineResult<T> = Result<T, EngineError>;
/// Convenience alias for collector-level results.
pub type CollectResult<T> = Result<T, CollectError>;
