//! Connection Slot
//!
//! One addressable database target and its connection lifecycle.
//!
//! # State Machine
//! ```text
//! Unconfigured --connect, target absent--> Disconnected (Not Configured)
//! Disconnected --connect ok--------------> Open
//! Disconnected --connect error/timeout---> Failed
//! Open         --connect-----------------> Open (idempotent, no reopen)
//! Open         --close-------------------> Disconnected
//! Failed       --connect-----------------> Open | Failed
//! ```
//! A handle is held if and only if the state is `Open`. Every driver call is bounded
//! by the configured timeouts, and every driver error is converted into a
//! [`GatewayError`] here; nothing escapes the slot as a fault.

use std::fmt;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Timeouts;
use crate::driver::{ConnectionDescriptor, Driver, QueryRows};
use crate::error::{GatewayError, Result};

/// Lifecycle state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No database target configured when the registry was built
    Unconfigured,
    /// No live handle
    Disconnected,
    /// Live handle held
    Open,
    /// Last connect attempt failed
    Failed,
}

impl SlotState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "Unconfigured",
            Self::Disconnected => "Disconnected",
            Self::Open => "Open",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One database connection context
pub struct ConnectionSlot<D: Driver> {
    index: usize,
    target_key: String,
    handle: Option<D::Handle>,
    state: SlotState,
    database: Option<String>,
    timeouts: Timeouts,
}

impl<D: Driver> ConnectionSlot<D> {
    pub fn new(index: usize, target_key: impl Into<String>, configured: bool) -> Self {
        Self {
            index,
            target_key: target_key.into(),
            handle: None,
            state: if configured { SlotState::Disconnected } else { SlotState::Unconfigured },
            database: None,
            timeouts: Timeouts::default(),
        }
    }

    /// Configuration key naming this slot's database
    #[must_use]
    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    #[must_use]
    pub fn state(&self) -> SlotState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == SlotState::Open
    }

    /// Live state plus database name, e.g. `Open (plant)`
    #[must_use]
    pub fn status_text(&self) -> String {
        match &self.database {
            Some(db) => format!("{} ({db})", self.state),
            None => self.state.to_string(),
        }
    }

    /// Open a connection unless one is already open
    ///
    /// Returns the status text on success. On failure the slot is `Failed`,
    /// holds no handle, and the error is `ConnectionFailure` carrying the
    /// driver's message.
    pub async fn connect(&mut self, driver: &D, descriptor: &ConnectionDescriptor) -> Result<String> {
        if self.is_open() {
            debug!(slot = self.index, "connect on open slot, reusing handle");
            return Ok(self.status_text());
        }

        self.release(driver).await;
        self.timeouts = descriptor.timeouts;

        let bound = descriptor.timeouts.connect();
        let opened = match timeout(bound, driver.open(descriptor)).await {
            Ok(result) => result.map_err(|e| GatewayError::connection_failure(e.detail())),
            Err(_) => Err(GatewayError::connection_failure(format!(
                "Timeout during connect attempt after {}s",
                bound.as_secs()
            ))),
        };

        match opened {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = SlotState::Open;
                self.database = Some(descriptor.database.clone());
                info!(slot = self.index, database = %descriptor.database, "slot connected");
                Ok(self.status_text())
            }
            Err(e) => {
                self.state = SlotState::Failed;
                warn!(slot = self.index, error = %e, "slot connect failed");
                Err(e)
            }
        }
    }

    /// Release the handle (if any) and mark the slot `Disconnected`
    pub async fn close(&mut self, driver: &D) {
        self.release(driver).await;
        self.state = SlotState::Disconnected;
        info!(slot = self.index, "slot closed");
    }

    /// Run a query and collect all rows
    ///
    /// A failing or timed-out query leaves the slot `Open`.
    pub async fn execute_read(&mut self, driver: &D, sql: Option<&str>) -> Result<QueryRows> {
        let bound = self.timeouts.command();
        let (handle, sql) = self.ready(sql)?;

        match timeout(bound, driver.execute_query(handle, sql)).await {
            Ok(result) => result.map_err(|e| GatewayError::execution_failure(e.detail())),
            Err(_) => Err(command_timeout(bound)),
        }
    }

    /// Run a command that returns no rows
    ///
    /// A failing or timed-out command leaves the slot `Open`.
    pub async fn execute_write(&mut self, driver: &D, sql: Option<&str>) -> Result<u64> {
        let bound = self.timeouts.command();
        let (handle, sql) = self.ready(sql)?;

        match timeout(bound, driver.execute_non_query(handle, sql)).await {
            Ok(result) => result.map_err(|e| GatewayError::execution_failure(e.detail())),
            Err(_) => Err(command_timeout(bound)),
        }
    }

    fn ready<'a>(&'a mut self, sql: Option<&'a str>) -> Result<(&'a mut D::Handle, &'a str)> {
        if self.state != SlotState::Open {
            return Err(GatewayError::NotConnected);
        }
        let sql = sql.filter(|s| !s.trim().is_empty()).ok_or(GatewayError::QueryNotSet)?;
        let handle = self.handle.as_mut().ok_or(GatewayError::NotConnected)?;
        Ok((handle, sql))
    }

    async fn release(&mut self, driver: &D) {
        if let Some(handle) = self.handle.take() {
            // Dropping the close future on timeout still drops the handle
            if timeout(self.timeouts.command(), driver.close(handle)).await.is_err() {
                warn!(slot = self.index, "driver close timed out, handle dropped");
            }
        }
    }
}

fn command_timeout(bound: std::time::Duration) -> GatewayError {
    GatewayError::execution_failure(format!("Command timed out after {}s", bound.as_secs()))
}
