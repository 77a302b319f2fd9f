//! MySQL Driver Implementation
//!
//! This module implements the [`Driver`] trait for MySQL databases (including MariaDB).
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - Close performs a protocol-level disconnect rather than dropping the socket
//! - A call abandoned by a timeout issues `KILL QUERY` from a side connection, and
//!   the session is replaced before its next use since unread packets may remain
//! - Column names come from the first row; an empty result set has none
//! - Non-UTF-8 BLOB data is Base64-encoded

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mysql_async::{prelude::*, Conn, Opts, OptsBuilder, Row, Value};
use tracing::debug;

use crate::driver::{AbandonGuard, ConnectionDescriptor, DatabaseType, Driver, QueryRows};
use crate::error::{GatewayError, Result};

/// MySQL driver
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

/// Live MySQL session
pub struct MySqlHandle {
    conn: Conn,
    opts: Opts,
    abandoned: Arc<AtomicBool>,
}

impl MySqlHandle {
    /// Reconnect if the previous call was abandoned
    async fn ready(&mut self) -> Result<()> {
        if self.abandoned.load(Ordering::SeqCst) {
            debug!(connection_id = self.conn.id(), "replacing mysql session after an abandoned call");
            let fresh = Conn::new(self.opts.clone())
                .await
                .map_err(|e| GatewayError::execution_failure(format!("Failed to reconnect: {e}")))?;
            // Dropping hands the stale session to the driver's background cleanup
            drop(std::mem::replace(&mut self.conn, fresh));
            self.abandoned.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Guard that kills the running query if the call is dropped
    fn kill_on_abandon(&self) -> AbandonGuard<impl FnOnce()> {
        let opts = self.opts.clone();
        let id = self.conn.id();
        let abandoned = Arc::clone(&self.abandoned);
        AbandonGuard::new(move || {
            debug!(connection_id = id, "killing abandoned mysql query");
            abandoned.store(true, Ordering::SeqCst);
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(kill_query(opts, id));
            }
        })
    }
}

async fn kill_query(opts: Opts, id: u32) {
    match Conn::new(opts).await {
        Ok(mut side) => {
            if let Err(e) = side.query_drop(kill_query_sql(id)).await {
                debug!(error = %e, connection_id = id, "mysql KILL QUERY failed");
            }
            let _ = side.disconnect().await;
        }
        Err(e) => debug!(error = %e, "mysql side connection for KILL QUERY failed"),
    }
}

fn kill_query_sql(id: u32) -> String {
    format!("KILL QUERY {id}")
}

impl Driver for MySqlDriver {
    type Handle = MySqlHandle;

    fn engine(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<MySqlHandle> {
        let opts = Opts::from(build_mysql_opts(descriptor));
        let conn = Conn::new(opts.clone())
            .await
            .map_err(|e| GatewayError::connection_failure(e.to_string()))?;
        Ok(MySqlHandle { conn, opts, abandoned: Arc::new(AtomicBool::new(false)) })
    }

    async fn close(&self, handle: MySqlHandle) {
        if let Err(e) = handle.conn.disconnect().await {
            debug!(error = %e, "mysql disconnect failed");
        }
    }

    async fn execute_query(&self, handle: &mut MySqlHandle, sql: &str) -> Result<QueryRows> {
        handle.ready().await?;
        let guard = handle.kill_on_abandon();
        let rows: std::result::Result<Vec<Row>, _> = handle.conn.query(sql).await;
        guard.disarm();
        let rows = rows.map_err(|e| GatewayError::execution_failure(e.to_string()))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns_ref().iter().map(|col| col.name_str().to_string()).collect())
            .unwrap_or_default();

        let mut data = Vec::with_capacity(rows.len());
        for row in &rows {
            data.push(row_to_json(row)?);
        }

        Ok(QueryRows::new(columns, data))
    }

    async fn execute_non_query(&self, handle: &mut MySqlHandle, sql: &str) -> Result<u64> {
        handle.ready().await?;
        let guard = handle.kill_on_abandon();
        let done = handle.conn.query_drop(sql).await;
        guard.disarm();
        done.map_err(|e| GatewayError::execution_failure(e.to_string()))?;
        Ok(handle.conn.affected_rows())
    }
}

/// Build MySQL connection options from a connection descriptor
fn build_mysql_opts(descriptor: &ConnectionDescriptor) -> OptsBuilder {
    let keepalive_ms = u32::try_from(descriptor.timeouts.keepalive().as_millis()).unwrap_or(u32::MAX);

    OptsBuilder::default()
        .ip_or_hostname(descriptor.host.as_deref().unwrap_or("localhost"))
        .tcp_port(descriptor.port.unwrap_or(3306))
        .user(descriptor.username.clone())
        .pass(descriptor.password.clone())
        .db_name(Some(descriptor.database.clone()))
        .tcp_keepalive(Some(keepalive_ms))
}

fn row_to_json(row: &Row) -> Result<Vec<serde_json::Value>> {
    (0..row.len()).map(|idx| mysql_value_to_json(row, idx)).collect()
}

/// Convert MySQL value to JSON value
fn mysql_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    let value = row.as_ref(idx).ok_or_else(|| {
        GatewayError::execution_failure(format!("Failed to get value at index {idx}"))
    })?;

    let json_value = match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        },

        Value::Int(i) => serde_json::Value::from(*i),
        Value::UInt(u) => serde_json::Value::from(*u),

        // NaN/Infinity become null
        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Double(d) => {
            serde_json::Number::from_f64(*d).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }

        Value::Date(year, month, day, hour, minute, second, micro) => serde_json::Value::String(format!(
            "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"
        )),

        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    };

    Ok(json_value)
}
