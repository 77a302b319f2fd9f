//! Driver Capability and Core Types
//!
//! This module defines the abstraction the gateway is written against.
//! Each driver (`PostgreSQL`, `MySQL`, `SQLite`) implements the [`Driver`] trait;
//! the connection slots never see a concrete client type.
//!
//! # Handle Ownership
//! `open` hands back an owned handle. The slot that requested it is its only owner
//! and gives it back through `close`, so every driver can release server-side
//! resources explicitly instead of relying on drop.
//!
//! # Abandoned Calls
//! A slot enforces its command timeout by dropping the driver future. The server
//! may still be executing at that point, so every driver arms an [`AbandonGuard`]
//! around its calls and stops the server-side work when the guard is dropped
//! without being disarmed.
//!
//! # Driver Isolation
//! Apart from the guard, each driver implementation is completely independent.
//! No shared SQL helpers or cross-driver abstractions.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::config::{ConfigProvider, Timeouts};
use crate::error::{GatewayError, Result};

// Driver-specific implementations
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(test)]
pub(crate) mod fake;

/// Configuration key holding the server address
pub const KEY_HOST: &str = "AddrServer";
/// Configuration key holding the server port
pub const KEY_PORT: &str = "Port";
/// Configuration key holding the login name
pub const KEY_USERNAME: &str = "username";
/// Configuration key holding the login password
pub const KEY_PASSWORD: &str = "userpassword";

/// Supported database engine types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    #[default]
    Postgres,
    /// `MySQL` database (includes `MariaDB`)
    MySQL,
    /// `SQLite` database
    SQLite,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    /// Port used when the host configuration leaves `Port` empty
    #[must_use]
    pub const fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a driver needs to open one connection
///
/// Built per slot from the host configuration. `database` is the value the slot's
/// target key resolved to (for `SQLite` this is the file path).
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Hostname (for postgres/mysql)
    pub host: Option<String>,

    /// Port number (for postgres/mysql)
    pub port: Option<u16>,

    /// Database name, or file path for sqlite
    pub database: String,

    /// Username (for postgres/mysql)
    pub username: Option<String>,

    /// Password (for postgres/mysql)
    /// WARNING: Sensitive data, do not log or include in error messages
    pub password: Option<String>,

    /// Connect, command and keepalive bounds
    pub timeouts: Timeouts,
}

impl ConnectionDescriptor {
    /// Descriptor for a single named database with default timeouts
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            host: None,
            port: None,
            database: database.into(),
            username: None,
            password: None,
            timeouts: Timeouts::default(),
        }
    }

    /// Resolve the descriptor for `target_key` from the host configuration
    ///
    /// Returns `Ok(None)` when the target key is absent or empty: the slot is
    /// simply not configured. A `Port` value that is present but not a number
    /// is a configuration error.
    pub fn from_config(
        provider: &dyn ConfigProvider,
        target_key: &str,
        engine: DatabaseType,
        timeouts: Timeouts,
    ) -> Result<Option<Self>> {
        let Some(database) = non_empty(provider.get_config_value(target_key)) else {
            return Ok(None);
        };

        let port = match non_empty(provider.get_config_value(KEY_PORT)) {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                GatewayError::config_error(format!("Invalid '{KEY_PORT}' value '{raw}': {e}"))
            })?),
            None => engine.default_port(),
        };

        Ok(Some(Self {
            host: non_empty(provider.get_config_value(KEY_HOST)),
            port,
            database,
            username: non_empty(provider.get_config_value(KEY_USERNAME)),
            password: provider.get_config_value(KEY_PASSWORD),
            timeouts,
        }))
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Tabular result of a query, in column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    /// Column names in result set
    pub columns: Vec<String>,

    /// Result rows, each an ordered list of column values
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryRows {
    /// Build a result from column names and rows
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }
}

/// Database driver capability
///
/// Any relational client that can open, close, query and execute satisfies this
/// trait and can back the slot registry. Implementations must not panic on driver
/// errors; every failure comes back as a [`GatewayError`].
pub trait Driver: Send + Sync + 'static {
    /// Live connection, exclusively owned by one slot
    type Handle: Send + 'static;

    /// Engine this driver speaks
    fn engine(&self) -> DatabaseType;

    /// Open a connection described by `descriptor`
    ///
    /// Errors are reported as `ConnectionFailure`.
    fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> impl Future<Output = Result<Self::Handle>> + Send;

    /// Release a connection
    fn close(&self, handle: Self::Handle) -> impl Future<Output = ()> + Send;

    /// Run a statement that returns rows and collect the full result set
    ///
    /// Errors are reported as `ExecutionFailure`.
    fn execute_query(
        &self,
        handle: &mut Self::Handle,
        sql: &str,
    ) -> impl Future<Output = Result<QueryRows>> + Send;

    /// Run a statement that returns no rows, yielding the affected row count
    ///
    /// Errors are reported as `ExecutionFailure`.
    fn execute_non_query(
        &self,
        handle: &mut Self::Handle,
        sql: &str,
    ) -> impl Future<Output = Result<u64>> + Send;
}

/// Runs a callback when dropped before [`AbandonGuard::disarm`]
#[cfg_attr(not(any(feature = "sqlite", feature = "postgres", feature = "mysql")), allow(dead_code))]
pub(crate) struct AbandonGuard<F: FnOnce()> {
    on_abandon: Option<F>,
}

#[cfg_attr(not(any(feature = "sqlite", feature = "postgres", feature = "mysql")), allow(dead_code))]
impl<F: FnOnce()> AbandonGuard<F> {
    pub(crate) fn new(on_abandon: F) -> Self {
        Self { on_abandon: Some(on_abandon) }
    }

    /// The call completed; dropping no longer fires the callback
    pub(crate) fn disarm(mut self) {
        self.on_abandon = None;
    }
}

impl<F: FnOnce()> Drop for AbandonGuard<F> {
    fn drop(&mut self) {
        if let Some(on_abandon) = self.on_abandon.take() {
            on_abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn provider(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_database_type_serialization() {
        assert_eq!(serde_json::to_string(&DatabaseType::Postgres).unwrap(), r#""postgres""#);
        assert_eq!(serde_json::to_string(&DatabaseType::MySQL).unwrap(), r#""mysql""#);
        assert_eq!(serde_json::to_string(&DatabaseType::SQLite).unwrap(), r#""sqlite""#);
    }

    #[test]
    fn test_descriptor_from_config() {
        let cfg = provider(&[
            ("AddrServer", "10.0.0.5"),
            ("Port", "5433"),
            ("DB", "plant"),
            ("username", "hmi"),
            ("userpassword", "secret"),
        ]);

        let descriptor =
            ConnectionDescriptor::from_config(&cfg, "DB", DatabaseType::Postgres, Timeouts::default())
                .unwrap()
                .unwrap();
        assert_eq!(descriptor.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(descriptor.port, Some(5433));
        assert_eq!(descriptor.database, "plant");
        assert_eq!(descriptor.username.as_deref(), Some("hmi"));
        assert_eq!(descriptor.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_descriptor_absent_or_empty_target_is_not_configured() {
        let cfg = provider(&[("DB", "plant"), ("DB_OP1", "  ")]);

        let absent =
            ConnectionDescriptor::from_config(&cfg, "DB_OP2", DatabaseType::Postgres, Timeouts::default());
        assert_eq!(absent, Ok(None));

        let empty =
            ConnectionDescriptor::from_config(&cfg, "DB_OP1", DatabaseType::Postgres, Timeouts::default());
        assert_eq!(empty, Ok(None));
    }

    #[test]
    fn test_descriptor_default_port() {
        let cfg = provider(&[("DB", "plant")]);
        let descriptor =
            ConnectionDescriptor::from_config(&cfg, "DB", DatabaseType::MySQL, Timeouts::default())
                .unwrap()
                .unwrap();
        assert_eq!(descriptor.port, Some(3306));
    }

    #[test]
    fn test_descriptor_bad_port() {
        let cfg = provider(&[("DB", "plant"), ("Port", "fivefourthreetwo")]);
        let err =
            ConnectionDescriptor::from_config(&cfg, "DB", DatabaseType::Postgres, Timeouts::default())
                .unwrap_err();
        assert!(matches!(err, GatewayError::ConfigError(_)));
        assert!(err.message().contains("Port"));
    }

    #[test]
    fn test_descriptor_debug_redacts_password() {
        let mut descriptor = ConnectionDescriptor::new("plant");
        descriptor.password = Some("hunter2".to_string());
        let rendered = format!("{descriptor:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_abandon_guard_fires_only_when_not_disarmed() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        AbandonGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .disarm();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let counter = Arc::clone(&fired);
        drop(AbandonGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandon_guard_fires_when_timeout_drops_the_call() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let call = async move {
            let guard = AbandonGuard::new(move || flag.store(true, Ordering::SeqCst));
            tokio::time::sleep(Duration::from_secs(60)).await;
            guard.disarm();
        };

        let timed_out = tokio::time::timeout(Duration::from_millis(10), call).await;
        assert!(timed_out.is_err());
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
