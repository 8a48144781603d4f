//! Error types for failure handling across the execution engine
//!
//! This module provides the two-level error hierarchy used throughout the
//! engine. `ExecutorError` covers contract violations surfaced to callers at
//! construction and configuration time, while `BackendError` captures raw
//! backend outcomes. The orchestrator converts every `BackendError` into a
//! well-formed `ExecutionResult`, so backend failures never propagate as
//! errors out of the execution entry points.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ExecutorError {
    #[error("Invalid resource limits: {0}")]
    InvalidLimits(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("No isolation backend available: {0}")]
    NoBackendAvailable(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for ExecutorError {
    fn from(err: std::io::Error) -> Self {
        ExecutorError::IoError(err.to_string())
    }
}

// Raw outcomes reported by isolation backends. Timeout and Cancelled are
// ordinary outcomes here; only the orchestrator maps them to statuses.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Docker (bollard) error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("I/O error during backend operation: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to spawn child process: {0}")]
    Spawn(String),
    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Could not create scratch directory: {0}")]
    Scratch(String),
    #[error("Execution exceeded the time limit")]
    Timeout,
    #[error("Execution was cancelled")]
    Cancelled,
    #[error("Backend is not available: {0}")]
    Unavailable(String),
    #[error("Operation not supported by this backend: {0}")]
    Unsupported(String),
}
