//! Error types for the changeset query core.
//!
//! Two layers are kept apart:
//! - [`Error`] covers startup and infrastructure faults (configuration,
//!   engine initialisation, I/O). A bad partition template is fatal here.
//! - [`QueryError`] covers per-request problems that are detected before the
//!   engine is touched. Everything that can only be known after scanning is
//!   reported inside [`crate::query::QueryResult`] instead.

use crate::partition::EmptyScope;
use thiserror::Error;

/// A specialized Result type for startup and infrastructure operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for startup and infrastructure operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing configuration, including the partition template
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedded engine could not be opened or prepared
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Engine(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Request-level failures surfaced before any remote read is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Unknown operation name or a parameter failing schema validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The requested scope resolves to zero partitions
    #[error("Empty scope: {0}")]
    EmptyScope(EmptyScope),

    /// Every partition in scope failed to render to a location
    #[error("No available data in scope for operation '{operation}'")]
    NoAvailableData { operation: String },
}

impl QueryError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        QueryError::InvalidRequest(msg.into())
    }
}

impl From<EmptyScope> for QueryError {
    fn from(scope: EmptyScope) -> Self {
        QueryError::EmptyScope(scope)
    }
}
