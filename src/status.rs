//! Per-Request Status Codes
//!
//! Every request in a batch ends with exactly one `StatusCode`. Codes are stable,
//! serialized as SCREAMING_SNAKE_CASE strings and also carry a fixed numeric value
//! for hosts that only understand integers.

use serde::{Deserialize, Serialize};

/// Outcome classification written back onto each request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// Operation completed
    #[default]
    Success,
    /// Slot has no database target configured (terminal, not an error)
    NotConfigured,
    /// Driver could not open a handle
    ConnectionFailure,
    /// Operation attempted on a slot that is not open
    NotConnected,
    /// Read or write triggered with no staged or inline SQL
    QueryNotSet,
    /// Driver rejected or failed a query/command
    ExecutionFailure,
    /// Symbolic command name not in the command table
    UnknownCommand,
    /// Slot index outside the registry
    InvalidSlot,
    /// A panic escaped the request's handling
    InternalFailure,
    /// Host configuration could not be interpreted
    ConfigError,
    /// Malformed request payload
    InvalidInput,
}

impl StatusCode {
    /// Stable numeric value of this code
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::NotConfigured => 1,
            Self::ConnectionFailure => 2,
            Self::NotConnected => 3,
            Self::QueryNotSet => 4,
            Self::ExecutionFailure => 5,
            Self::UnknownCommand => 6,
            Self::InvalidSlot => 7,
            Self::InternalFailure => 8,
            Self::ConfigError => 9,
            Self::InvalidInput => 10,
        }
    }

    /// `Success` and `NotConfigured` are the only non-error outcomes
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::NotConfigured)
    }

    /// Wire name of this code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::ConnectionFailure => "CONNECTION_FAILURE",
            Self::NotConnected => "NOT_CONNECTED",
            Self::QueryNotSet => "QUERY_NOT_SET",
            Self::ExecutionFailure => "EXECUTION_FAILURE",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
            Self::InvalidSlot => "INVALID_SLOT",
            Self::InternalFailure => "INTERNAL_FAILURE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::InvalidInput => "INVALID_INPUT",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_name_matches_as_str() {
        for code in [
            StatusCode::Success,
            StatusCode::NotConfigured,
            StatusCode::ConnectionFailure,
            StatusCode::NotConnected,
            StatusCode::QueryNotSet,
            StatusCode::ExecutionFailure,
            StatusCode::UnknownCommand,
            StatusCode::InvalidSlot,
            StatusCode::InternalFailure,
            StatusCode::ConfigError,
            StatusCode::InvalidInput,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_only_success_and_not_configured_are_success() {
        assert!(StatusCode::Success.is_success());
        assert!(StatusCode::NotConfigured.is_success());
        assert!(!StatusCode::NotConnected.is_success());
        assert!(!StatusCode::UnknownCommand.is_success());
        assert!(!StatusCode::InternalFailure.is_success());
    }

    #[test]
    fn test_numeric_values_are_stable() {
        assert_eq!(StatusCode::Success.as_u32(), 0);
        assert_eq!(StatusCode::ConnectionFailure.as_u32(), 2);
        assert_eq!(StatusCode::UnknownCommand.as_u32(), 6);
        assert_eq!(StatusCode::InvalidInput.as_u32(), 10);
    }
}
