use thiserror::Error;

/// Convenience alias for `Result<T, ShardlineError>`.
pub type ShardlineResult<T> = Result<T, ShardlineError>;

/// Error classification for retry/escalation decisions.
///
/// - `UserError`: bad statement, bad configuration (4xx equivalent)
/// - `Retryable`: the backend rejected the work but a retry may succeed
/// - `Transient`: connection loss, timeout, exhausted pool; retry after back-off
/// - `InternalBug`: should never happen; worker panic, broken invariant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Retryable,
    Transient,
    InternalBug,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum ShardlineError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Statement error: {0}")]
    Statement(#[from] StatementError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Internal bug; should never occur in production.
    /// Always carries a unique `error_code` and `debug_context` for post-mortem.
    #[error("InternalBug [{error_code}]: {message} | context: {debug_context}")]
    InternalBug {
        error_code: &'static str,
        message: String,
        debug_context: String,
    },
}

/// Grouping stage could not obtain a physical connection for a target.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("No data source registered for target '{0}'")]
    UnknownTarget(String),

    #[error("Failed to acquire connection to '{target}': {reason}")]
    Acquire { target: String, reason: String },
}

/// Statement factory failure while building an execution unit.
#[derive(Error, Debug, Clone)]
pub enum StatementError {
    #[error("Failed to prepare statement on '{target}': {reason}")]
    Prepare { target: String, reason: String },
}

/// Execution stage errors.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    /// A single unit's backend call failed.
    #[error("Unit #{index} on '{target}' failed: {reason}")]
    Unit {
        index: usize,
        target: String,
        reason: String,
    },

    /// Best-effort mode: every unit was attempted and at least one failed.
    /// `first` is the lowest-indexed failure in route order.
    #[error("{failed} unit(s) failed; first: {first}")]
    Aggregate {
        first: Box<ExecutionError>,
        failed: usize,
    },

    /// A cursor failed while its rows were being drained or read.
    #[error("Cursor on '{target}' failed: {reason}")]
    Cursor { target: String, reason: String },

    /// Closing a tracked statement or cursor failed.
    #[error("Failed to close {resource}: {reason}")]
    Close {
        resource: &'static str,
        reason: String,
    },
}

/// Configuration load/validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ExecutionError {
    /// Unit index in route order, when this error belongs to one unit.
    pub fn unit_index(&self) -> Option<usize> {
        match self {
            ExecutionError::Unit { index, .. } => Some(*index),
            ExecutionError::Aggregate { first, .. } => first.unit_index(),
            _ => None,
        }
    }

    pub fn unit(index: usize, target: impl Into<String>, reason: impl Into<String>) -> Self {
        ExecutionError::Unit {
            index,
            target: target.into(),
            reason: reason.into(),
        }
    }
}

// ── ShardlineError classification & helpers ─────────────────────────────────

impl ShardlineError {
    /// Classify this error for retry/escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShardlineError::Config(_) => ErrorKind::UserError,
            ShardlineError::Statement(StatementError::Prepare { .. }) => ErrorKind::Retryable,
            ShardlineError::Execution(ExecutionError::Close { .. }) => ErrorKind::Retryable,
            ShardlineError::Execution(_) => ErrorKind::Retryable,
            ShardlineError::Connection(ConnectionError::UnknownTarget(_)) => ErrorKind::UserError,
            ShardlineError::Connection(_) => ErrorKind::Transient,
            ShardlineError::InternalBug { .. } => ErrorKind::InternalBug,
        }
    }

    /// Returns true if the caller should retry this operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Retryable)
    }

    /// Returns true if this is a transient connection/resource error.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Returns true if this is an internal bug that should never occur.
    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// Unit index in route order, if the error is tied to one unit.
    pub fn unit_index(&self) -> Option<usize> {
        match self {
            ShardlineError::Execution(e) => e.unit_index(),
            _ => None,
        }
    }

    /// Construct an internal bug error with diagnostic context.
    pub fn internal_bug(
        error_code: &'static str,
        message: impl Into<String>,
        debug_context: impl Into<String>,
    ) -> Self {
        ShardlineError::InternalBug {
            error_code,
            message: message.into(),
            debug_context: debug_context.into(),
        }
    }
}
