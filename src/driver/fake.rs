//! Scripted in-memory driver for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;

use crate::driver::{ConnectionDescriptor, DatabaseType, Driver, QueryRows};
use crate::error::{GatewayError, Result};

/// SQL text that makes the fake driver panic mid-call
pub const PANIC_SQL: &str = "PANIC";

#[derive(Default)]
struct Script {
    open_error: Option<String>,
    open_delay: Option<Duration>,
    sql_errors: HashMap<String, String>,
    sql_delays: HashMap<String, Duration>,
    results: HashMap<String, QueryRows>,
}

#[derive(Default)]
pub struct FakeDriver {
    script: Mutex<Script>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

#[derive(Debug)]
pub struct FakeHandle {
    pub database: String,
}

impl FakeDriver {
    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn fail_open(&self, message: &str) {
        self.script().open_error = Some(message.to_string());
    }

    pub fn succeed_open(&self) {
        self.script().open_error = None;
    }

    pub fn delay_open(&self, delay: Duration) {
        self.script().open_delay = Some(delay);
    }

    pub fn fail_sql(&self, sql: &str, message: &str) {
        self.script().sql_errors.insert(sql.to_string(), message.to_string());
    }

    pub fn delay_sql(&self, sql: &str, delay: Duration) {
        self.script().sql_delays.insert(sql.to_string(), delay);
    }

    pub fn result_for(&self, sql: &str, rows: QueryRows) {
        self.script().results.insert(sql.to_string(), rows);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }

    async fn run(&self, sql: &str) -> Result<QueryRows> {
        if sql == PANIC_SQL {
            panic!("fake driver asked to panic");
        }
        let delay = self.script().sql_delays.get(sql).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }
        let script = self.script();
        if let Some(message) = script.sql_errors.get(sql) {
            return Err(GatewayError::execution_failure(message.clone()));
        }
        Ok(script
            .results
            .get(sql)
            .cloned()
            .unwrap_or_else(|| QueryRows::new(vec!["?column?".to_string()], vec![vec![json!(1)]])))
    }
}

impl Driver for FakeDriver {
    type Handle = FakeHandle;

    fn engine(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<FakeHandle> {
        let (error, delay) = {
            let script = self.script();
            (script.open_error.clone(), script.open_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = error {
            return Err(GatewayError::connection_failure(message));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakeHandle { database: descriptor.database.clone() })
    }

    async fn close(&self, _handle: FakeHandle) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    async fn execute_query(&self, _handle: &mut FakeHandle, sql: &str) -> Result<QueryRows> {
        self.run(sql).await
    }

    async fn execute_non_query(&self, _handle: &mut FakeHandle, sql: &str) -> Result<u64> {
        self.run(sql).await.map(|rows| rows.rows.len() as u64)
    }
}
