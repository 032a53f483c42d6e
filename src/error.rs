use thiserror::Error;

/// Errors the engine returns to callers. Load-time failures are fatal and
/// surface as `anyhow` errors during startup instead; they never reach the
/// serving path.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{0} not found")]
    NotFound(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(vec![msg.into()])
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
