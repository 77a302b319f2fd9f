//! Error Handling Infrastructure
//!
//! This module defines the error type used throughout the gateway.
//! Every variant maps to a stable [`StatusCode`] so a failure can be written
//! back onto the request that caused it.
//!
//! # Error Categories
//! - `ConnectionFailure`: the driver could not open a handle (slot becomes `Failed`)
//! - `NotConnected`: operation attempted on a slot that is not open
//! - `QueryNotSet`: read/write triggered without staged or inline SQL
//! - `ExecutionFailure`: the driver rejected a query or command (slot state unchanged)
//! - `UnknownCommand`: symbolic command not in the command table
//! - `InvalidSlot`: slot index outside `0..6`
//! - `ConfigError`: host configuration could not be interpreted
//! - `InvalidInput`: malformed request payload

use thiserror::Error;

use crate::status::StatusCode;

/// Main error type for gateway operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Driver could not open a connection
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    /// Slot is not open
    #[error("Not connected to DB")]
    NotConnected,

    /// No staged or inline SQL for the triggered operation
    #[error("No SQL text staged for this operation")]
    QueryNotSet,

    /// Driver failed a query or command
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    /// Unrecognized symbolic command
    #[error("Unknown command '{0}' not handled.")]
    UnknownCommand(String),

    /// Slot index out of range
    #[error("Invalid slot index {0}")]
    InvalidSlot(usize),

    /// Configuration error (file not found, invalid JSON, bad port, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GatewayError {
    /// Status code written onto a request that failed with this error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionFailure(_) => StatusCode::ConnectionFailure,
            Self::NotConnected => StatusCode::NotConnected,
            Self::QueryNotSet => StatusCode::QueryNotSet,
            Self::ExecutionFailure(_) => StatusCode::ExecutionFailure,
            Self::UnknownCommand(_) => StatusCode::UnknownCommand,
            Self::InvalidSlot(_) => StatusCode::InvalidSlot,
            Self::ConfigError(_) => StatusCode::ConfigError,
            Self::InvalidInput(_) => StatusCode::InvalidInput,
        }
    }

    /// Human-readable error message, never contains credentials
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Underlying driver message for variants that carry one, else the display text
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::ConnectionFailure(detail) | Self::ExecutionFailure(detail) => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Create a connection failure error
    pub fn connection_failure(message: impl Into<String>) -> Self {
        Self::ConnectionFailure(message.into())
    }

    /// Create an execution failure error
    pub fn execution_failure(message: impl Into<String>) -> Self {
        Self::ExecutionFailure(message.into())
    }

    /// Create an unknown command error
    pub fn unknown_command(name: impl Into<String>) -> Self {
        Self::UnknownCommand(name.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
