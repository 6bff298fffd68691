use thiserror::Error;

/// Engine-wide error type. The message carried by each variant is the
/// user-facing reason and surfaces verbatim through `Display`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    OutOfRange(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    IoError(String),
}

impl EngineError {
    /// Stable kind name, used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::OutOfRange(_) => "out_of_range",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::IoError(_) => "io_error",
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        EngineError::InvalidArgument(msg.into())
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        EngineError::OutOfRange(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        EngineError::AlreadyExists(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        EngineError::InvalidState(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        EngineError::IoError(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
