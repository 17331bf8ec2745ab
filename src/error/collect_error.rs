use thiserror::Error;

/// Collector-level errors.
///
/// A collect failure never aborts sibling parameters; it is folded into the
/// parameter's actual values as an error-typed entry and propagates only
/// through status aggregation.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("source error: {0}")]
    Source(String),
    #[error("invalid parameter spec: {0}")]
    InvalidSpec(String),
    #[error("collect timeout: request exceeded time limit")]
    Timeout,
    #[error("deferred result expired for tracking id {0}")]
    DeferredExpired(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CollectError {
    fn from(e: serde_json::Error) -> Self {
        CollectError::Serialization(e.to_string())
    }
}
