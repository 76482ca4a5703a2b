//! Shared error type across taskstat crates.

use thiserror::Error;

/// Stable error codes (safe to match on or log as strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid input: config, route pattern or metric name.
    BadRequest,
    /// `done` without a matching `add`.
    UnmatchedDone,
    /// Metric name already taken in a registry.
    AlreadyRegistered,
    /// Endpoint stop requested before it was ever run.
    NotStarted,
    /// Endpoint run requested twice.
    AlreadyStarted,
    /// Listener could not be bound.
    Bind,
    /// Listener failed while serving.
    Serve,
    /// Graceful shutdown did not finish before the deadline.
    ShutdownTimeout,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::UnmatchedDone => "UNMATCHED_DONE",
            ErrorCode::AlreadyRegistered => "ALREADY_REGISTERED",
            ErrorCode::NotStarted => "NOT_STARTED",
            ErrorCode::AlreadyStarted => "ALREADY_STARTED",
            ErrorCode::Bind => "BIND",
            ErrorCode::Serve => "SERVE",
            ErrorCode::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, TaskStatError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum TaskStatError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("done called without matching add: {0}")]
    UnmatchedDone(String),
    #[error("metric already registered: {0}")]
    AlreadyRegistered(String),
    #[error("metrics endpoint was never started")]
    NotStarted,
    #[error("metrics endpoint already started")]
    AlreadyStarted,
    #[error("bind failed: {0}")]
    Bind(String),
    #[error("serve failed: {0}")]
    Serve(String),
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl TaskStatError {
    /// Map to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            TaskStatError::BadRequest(_) => ErrorCode::BadRequest,
            TaskStatError::UnmatchedDone(_) => ErrorCode::UnmatchedDone,
            TaskStatError::AlreadyRegistered(_) => ErrorCode::AlreadyRegistered,
            TaskStatError::NotStarted => ErrorCode::NotStarted,
            TaskStatError::AlreadyStarted => ErrorCode::AlreadyStarted,
            TaskStatError::Bind(_) => ErrorCode::Bind,
            TaskStatError::Serve(_) => ErrorCode::Serve,
            TaskStatError::ShutdownTimeout => ErrorCode::ShutdownTimeout,
            TaskStatError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            TaskStatError::Internal(_) => ErrorCode::Internal,
        }
    }
}
