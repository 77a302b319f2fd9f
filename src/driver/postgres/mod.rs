//! `PostgreSQL` Driver Implementation
//!
//! This module implements the [`Driver`] trait for `PostgreSQL` databases.
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - The connection task is spawned on open and joined on close
//! - TCP keepalives follow the configured keepalive interval
//! - Statements run over the simple query protocol, so every type arrives as
//!   text; the prepared column types only steer the JSON conversion
//! - Reads accept exactly one statement, writes run every statement in the text
//! - A call abandoned by a timeout sends a cancel request for the running query
//! - JSON/JSONB preserved as nested JSON
//! - BYTEA data is Base64-encoded
//! - Timestamps rendered as ISO 8601
//! - NUMERIC, INTERVAL, arrays and any other type keep their server text

use tokio::task::JoinHandle;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::debug;

use crate::driver::{AbandonGuard, ConnectionDescriptor, DatabaseType, Driver, QueryRows};
use crate::error::{GatewayError, Result};

/// Session settings that pin the text form of dates and times
const SESSION_OPTIONS: &str = "-c DateStyle=ISO -c TimeZone=UTC -c IntervalStyle=postgres";

/// `PostgreSQL` driver
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

/// Live `PostgreSQL` session: the client plus its background connection task
pub struct PostgresHandle {
    client: Client,
    connection: JoinHandle<()>,
}

impl PostgresHandle {
    /// Guard that cancels the running query if the call is dropped
    fn cancel_on_abandon(&self) -> AbandonGuard<impl FnOnce()> {
        let token = self.client.cancel_token();
        AbandonGuard::new(move || {
            debug!("cancelling abandoned postgres query");
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = token.cancel_query(NoTls).await {
                        debug!(error = %e, "postgres cancel request failed");
                    }
                });
            }
        })
    }
}

impl Driver for PostgresDriver {
    type Handle = PostgresHandle;

    fn engine(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<PostgresHandle> {
        let pg_config = build_pg_config(descriptor);

        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|e| GatewayError::connection_failure(e.to_string()))?;

        // Connection errors are not logged to prevent credential leakage
        let connection = tokio::spawn(async move {
            let _ = connection.await;
        });

        Ok(PostgresHandle { client, connection })
    }

    async fn close(&self, handle: PostgresHandle) {
        let PostgresHandle { client, connection } = handle;
        drop(client);
        if connection.await.is_err() {
            debug!("postgres connection task ended abnormally");
        }
    }

    async fn execute_query(&self, handle: &mut PostgresHandle, sql: &str) -> Result<QueryRows> {
        let guard = handle.cancel_on_abandon();
        let result = query_text_rows(&handle.client, sql).await;
        guard.disarm();
        result
    }

    async fn execute_non_query(&self, handle: &mut PostgresHandle, sql: &str) -> Result<u64> {
        let guard = handle.cancel_on_abandon();
        let result = execute_all(&handle.client, sql).await;
        guard.disarm();
        result
    }
}

/// Build `tokio-postgres` config from a connection descriptor
fn build_pg_config(descriptor: &ConnectionDescriptor) -> Config {
    let mut pg_config = Config::new();
    pg_config
        .host(descriptor.host.as_deref().unwrap_or("localhost"))
        .port(descriptor.port.unwrap_or(5432))
        .dbname(&descriptor.database)
        .connect_timeout(descriptor.timeouts.connect())
        .keepalives(true)
        .keepalives_idle(descriptor.timeouts.keepalive())
        .application_name("slotgate")
        .options(SESSION_OPTIONS);

    if let Some(user) = &descriptor.username {
        pg_config.user(user);
    }
    if let Some(password) = &descriptor.password {
        pg_config.password(password);
    }

    pg_config
}

async fn query_text_rows(client: &Client, sql: &str) -> Result<QueryRows> {
    // Preparing rejects multi-statement text and yields the column types
    let stmt = client.prepare(sql).await.map_err(|e| GatewayError::execution_failure(e.to_string()))?;
    let types: Vec<Type> = stmt.columns().iter().map(|c| c.type_().clone()).collect();
    let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();

    let messages =
        client.simple_query(sql).await.map_err(|e| GatewayError::execution_failure(e.to_string()))?;

    let mut data = Vec::new();
    for message in &messages {
        if let SimpleQueryMessage::Row(row) = message {
            let values = types
                .iter()
                .enumerate()
                .map(|(idx, ty)| text_to_json(ty, row.try_get(idx).ok().flatten()))
                .collect();
            data.push(values);
        }
    }

    Ok(QueryRows::new(columns, data))
}

/// Run every statement in `sql`, returning the rows affected across all of them
async fn execute_all(client: &Client, sql: &str) -> Result<u64> {
    let messages =
        client.simple_query(sql).await.map_err(|e| GatewayError::execution_failure(e.to_string()))?;

    Ok(messages
        .iter()
        .map(|message| match message {
            SimpleQueryMessage::CommandComplete(rows) => *rows,
            _ => 0,
        })
        .sum())
}

/// Convert a `PostgreSQL` text value to JSON according to its column type
fn text_to_json(col_type: &Type, text: Option<&str>) -> serde_json::Value {
    use serde_json::Value;

    let Some(text) = text else {
        return Value::Null;
    };

    let converted = match *col_type {
        Type::BOOL => match text {
            "t" => Some(Value::Bool(true)),
            "f" => Some(Value::Bool(false)),
            _ => None,
        },

        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => text.parse::<i64>().ok().map(Value::from),

        // NaN/Infinity become null
        Type::FLOAT4 | Type::FLOAT8 => text
            .parse::<f64>()
            .ok()
            .map(|v| serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)),

        Type::JSON | Type::JSONB => serde_json::from_str(text).ok(),

        Type::BYTEA => decode_bytea_hex(text).map(|bytes| {
            use base64::Engine;
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }),

        Type::TIMESTAMP => chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::TIMESTAMPTZ => chrono::DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .ok()
            .map(|v| Value::String(v.with_timezone(&chrono::Utc).to_rfc3339())),

        Type::UUID => uuid::Uuid::parse_str(text).ok().map(|v| Value::String(v.to_string())),

        _ => None,
    };

    // Out-of-range values (infinity timestamps, 'NaN' numerics) keep the server text
    converted.unwrap_or_else(|| Value::String(text.to_string()))
}

/// Decode the `\x0102..` hex text form of a BYTEA value
fn decode_bytea_hex(text: &str) -> Option<Vec<u8>> {
    let hex = text.strip_prefix("\\x")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len()).step_by(2).map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok()).collect()
}
