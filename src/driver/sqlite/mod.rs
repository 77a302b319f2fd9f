//! `SQLite` Driver Implementation
//!
//! This module implements the [`Driver`] trait for `SQLite` databases.
//! The slot's database value is the file path (`:memory:` is accepted).
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver); statements run on the blocking pool
//! - A statement abandoned by a timeout is interrupted so the connection frees up
//! - Lock waits are bounded by `busy_timeout` (the command timeout)
//! - The file must already exist, the gateway never creates databases
//! - BLOB data is Base64-encoded
//! - Writes run every statement in the text; reads accept exactly one statement

use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{Batch, Connection, InterruptHandle, OpenFlags, Row, Statement};
use tracing::debug;

use crate::driver::{AbandonGuard, ConnectionDescriptor, DatabaseType, Driver, QueryRows};
use crate::error::{GatewayError, Result};

const MEMORY_DATABASE: &str = ":memory:";

/// `SQLite` driver
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

/// Open `SQLite` connection
pub struct SqliteHandle {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteHandle {
    /// Run `work` against the connection on the blocking pool
    async fn run<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let interrupt = Arc::clone(&self.interrupt);
        let guard = AbandonGuard::new(move || {
            debug!("interrupting abandoned sqlite statement");
            interrupt.interrupt();
        });

        let joined = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            work(&conn)
        })
        .await;

        guard.disarm();
        joined.map_err(|e| GatewayError::execution_failure(format!("SQLite worker failed: {e}")))?
    }
}

impl Driver for SqliteDriver {
    type Handle = SqliteHandle;

    fn engine(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<SqliteHandle> {
        let conn = open_connection(descriptor)?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(SqliteHandle { conn: Arc::new(Mutex::new(conn)), interrupt })
    }

    async fn close(&self, handle: SqliteHandle) {
        let SqliteHandle { conn, interrupt } = handle;
        match Arc::try_unwrap(conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);
                if let Err((_, e)) = conn.close() {
                    debug!(error = %e, "sqlite close failed");
                }
            }
            // A timed-out statement still owns a reference; stop it and let it drop
            Err(_) => interrupt.interrupt(),
        }
    }

    async fn execute_query(&self, handle: &mut SqliteHandle, sql: &str) -> Result<QueryRows> {
        let sql = sql.to_string();
        handle.run(move |conn| query_rows(conn, &sql)).await
    }

    async fn execute_non_query(&self, handle: &mut SqliteHandle, sql: &str) -> Result<u64> {
        let sql = sql.to_string();
        handle.run(move |conn| execute_all(conn, &sql)).await
    }
}

/// Open `SQLite` connection read-write without creating the file
fn open_connection(descriptor: &ConnectionDescriptor) -> Result<Connection> {
    let mut flags =
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if descriptor.database == MEMORY_DATABASE {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }

    let conn = Connection::open_with_flags(&descriptor.database, flags).map_err(|e| {
        GatewayError::connection_failure(format!("Failed to open '{}': {e}", descriptor.database))
    })?;

    conn.busy_timeout(descriptor.timeouts.command())
        .map_err(|e| GatewayError::connection_failure(format!("Failed to set busy timeout: {e}")))?;

    Ok(conn)
}

fn execution_failure(e: rusqlite::Error) -> GatewayError {
    GatewayError::execution_failure(e.to_string())
}

fn total_changes(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT total_changes()", [], |row| row.get(0)).map_err(execution_failure)
}

/// Run every statement in `sql`, returning the rows changed across all of them
///
/// Execution stops at the first failing statement; statements before it stay applied.
fn execute_all(conn: &Connection, sql: &str) -> Result<u64> {
    let before = total_changes(conn)?;

    let mut batch = Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next().map_err(execution_failure)? {
        // Stepping through rows also covers statements that return some (RETURNING, PRAGMA)
        let mut rows = stmt.query([]).map_err(execution_failure)?;
        while rows.next().map_err(execution_failure)?.is_some() {}
    }

    let changed = total_changes(conn)?.saturating_sub(before);
    Ok(u64::try_from(changed).unwrap_or(0))
}

/// Prepare the only statement in `sql`
fn single_statement<'conn>(conn: &'conn Connection, sql: &str) -> Result<Statement<'conn>> {
    let mut batch = Batch::new(conn, sql);
    let stmt = batch
        .next()
        .map_err(execution_failure)?
        .ok_or_else(|| GatewayError::execution_failure("No SQL statement to execute"))?;

    if batch.next().map_err(execution_failure)?.is_some() {
        return Err(GatewayError::execution_failure(
            "Query text holds more than one statement; nothing was executed",
        ));
    }
    Ok(stmt)
}

fn query_rows(conn: &Connection, sql: &str) -> Result<QueryRows> {
    let mut stmt = single_statement(conn, sql)?;

    let columns: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();
    let width = columns.len();

    let rows = stmt
        .query_map([], |row| row_to_json(width, row))
        .map_err(execution_failure)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(execution_failure)?;

    Ok(QueryRows::new(columns, rows))
}

fn row_to_json(width: usize, row: &Row) -> std::result::Result<Vec<serde_json::Value>, rusqlite::Error> {
    (0..width).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

/// Convert `SQLite` value to JSON value
fn sqlite_value_to_json(row: &Row, idx: usize) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    Ok(match row.get_ref(idx)? {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        // NaN/Infinity become null
        ValueRef::Real(f) => {
            serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => {
            use base64::Engine;
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
