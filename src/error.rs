//! Error types for the cairn context orchestration layer.

use thiserror::Error;

/// Errors raised by a backend driver implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend refused to open a transaction because one is already open on the session.
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("Query failed [{code}]: {message}")]
    Query { code: String, message: String },

    #[error("Access mode violation: {0}")]
    AccessMode(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    pub fn query(code: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError::Query {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Result type for backend driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by contexts, executors and factories.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    /// Missing or invalid connection endpoint; raised synchronously at context creation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("Backend query error: {0}")]
    BackendQuery(String),

    /// Failure during streaming. Only ever handed to a stream observer.
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid context state: {0}")]
    InvalidState(String),
}

impl From<DriverError> for ContextError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::TransactionConflict(msg) => ContextError::TransactionConflict(msg),
            other => ContextError::BackendQuery(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        ContextError::Configuration(err.to_string())
    }
}

/// Result type for context operations
pub type Result<T> = std::result::Result<T, ContextError>;
