use thiserror::Error;

/// Failures surfaced by the engine and the request boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// The caller supplied bars, a script, or a configuration the engine cannot use.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// An accounting invariant was violated while simulating. Always a bug.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl EngineError {
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        EngineError::InvalidInput(message.into())
    }

    pub fn invariant<S: Into<String>>(message: S) -> Self {
        EngineError::Invariant(message.into())
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, EngineError::InvalidInput(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
