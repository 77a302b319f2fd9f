//! Slot Registry
//!
//! Owns the six connection slots and their staged SQL, addressed by index.
//! Slot 0 reads its database from `DB`, slots 1 to 5 from `DB_OP1`..`DB_OP5`.
//!
//! # Concurrency
//! Each slot sits behind its own async mutex together with its pending text, so
//! concurrent batches touching the same slot are serialized while different
//! slots proceed independently. Slot state is never handed out by reference.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{ConfigProvider, ExtensionConfig, Timeouts};
use crate::driver::{ConnectionDescriptor, DatabaseType, Driver};
use crate::encoder;
use crate::error::{GatewayError, Result};
use crate::pending::{PendingKind, PendingOperation, SlotStaging};
use crate::slot::{ConnectionSlot, SlotState};

/// Number of addressable slots
pub const SLOT_COUNT: usize = 6;

/// Status text for a slot without a database target
pub const NOT_CONFIGURED: &str = "Not Configured";

/// Configuration key naming the database of slot `index`
#[must_use]
pub fn target_key(index: usize) -> String {
    if index == 0 {
        "DB".to_string()
    } else {
        format!("DB_OP{index}")
    }
}

/// Result of a connect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Slot is open; carries the status text (e.g. `Open (plant)`)
    Connected(String),
    /// Target key is empty or absent, no connection attempted
    NotConfigured,
}

impl ConnectOutcome {
    #[must_use]
    pub fn status_text(&self) -> &str {
        match self {
            Self::Connected(text) => text,
            Self::NotConfigured => NOT_CONFIGURED,
        }
    }
}

/// Per-registry settings
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    pub engine: DatabaseType,
    pub timeouts: Timeouts,
    pub staging: [SlotStaging; SLOT_COUNT],
}

impl RegistryOptions {
    /// Options taken from a gateway configuration file
    #[must_use]
    pub fn from_config(config: &ExtensionConfig) -> Self {
        Self {
            engine: config.engine,
            timeouts: config.timeouts,
            staging: std::array::from_fn(|i| config.staging_for(&target_key(i))),
        }
    }
}

struct SlotCell<D: Driver> {
    slot: ConnectionSlot<D>,
    pending: PendingOperation,
}

/// The six slots plus their pending operations
pub struct SlotRegistry<D: Driver> {
    driver: D,
    config: Arc<dyn ConfigProvider>,
    options: RegistryOptions,
    cells: [Mutex<SlotCell<D>>; SLOT_COUNT],
}

impl<D: Driver> SlotRegistry<D> {
    /// Registry with default options for the driver's engine
    pub fn new(driver: D, config: Arc<dyn ConfigProvider>) -> Self {
        let options = RegistryOptions { engine: driver.engine(), ..RegistryOptions::default() };
        Self::with_options(driver, config, options)
    }

    pub fn with_options(driver: D, config: Arc<dyn ConfigProvider>, options: RegistryOptions) -> Self {
        let cells = std::array::from_fn(|index| {
            let key = target_key(index);
            let configured = config
                .get_config_value(&key)
                .is_some_and(|value| !value.trim().is_empty());
            Mutex::new(SlotCell {
                slot: ConnectionSlot::new(index, key, configured),
                pending: PendingOperation::new(options.staging[index]),
            })
        });

        Self { driver, config, options, cells }
    }

    /// Registry built from a gateway configuration file
    pub fn from_config(driver: D, config: ExtensionConfig) -> Self {
        let options = RegistryOptions::from_config(&config);
        Self::with_options(driver, Arc::new(config), options)
    }

    fn cell(&self, index: usize) -> Result<&Mutex<SlotCell<D>>> {
        self.cells.get(index).ok_or(GatewayError::InvalidSlot(index))
    }

    /// Raw host configuration value
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<String> {
        self.config.get_config_value(key)
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Connect slot `index`
    ///
    /// An open slot is returned as-is. An empty or absent target key yields
    /// `NotConfigured` without touching the driver.
    pub async fn connect(&self, index: usize) -> Result<ConnectOutcome> {
        let mut cell = self.cell(index)?.lock().await;

        if cell.slot.is_open() {
            return Ok(ConnectOutcome::Connected(cell.slot.status_text()));
        }

        let descriptor = ConnectionDescriptor::from_config(
            self.config.as_ref(),
            cell.slot.target_key(),
            self.options.engine,
            self.options.timeouts,
        )?;

        match descriptor {
            Some(descriptor) => cell
                .slot
                .connect(&self.driver, &descriptor)
                .await
                .map(ConnectOutcome::Connected),
            None => {
                debug!(slot = index, "target not configured, skipping connect");
                cell.slot.close(&self.driver).await;
                Ok(ConnectOutcome::NotConfigured)
            }
        }
    }

    /// Close slot `index`
    pub async fn close(&self, index: usize) -> Result<()> {
        let mut cell = self.cell(index)?.lock().await;
        cell.slot.close(&self.driver).await;
        Ok(())
    }

    /// Close every slot
    pub async fn close_all(&self) {
        for cell in &self.cells {
            let mut cell = cell.lock().await;
            if cell.slot.is_open() {
                cell.slot.close(&self.driver).await;
            }
        }
    }

    pub async fn is_open(&self, index: usize) -> Result<bool> {
        Ok(self.cell(index)?.lock().await.slot.is_open())
    }

    pub async fn state(&self, index: usize) -> Result<SlotState> {
        Ok(self.cell(index)?.lock().await.slot.state())
    }

    /// Run the staged (or inline) query on slot `index` and encode the rows
    ///
    /// The staged text is consumed only if the query succeeds.
    pub async fn read_with(&self, index: usize, inline: Option<String>) -> Result<String> {
        let mut guard = self.cell(index)?.lock().await;
        let cell = &mut *guard;

        let sql = cell.pending.take(PendingKind::Read, inline);
        let rows = cell.slot.execute_read(&self.driver, sql.as_deref()).await?;
        cell.pending.commit(PendingKind::Read);

        Ok(encoder::encode(&rows))
    }

    /// Run the staged (or inline) command on slot `index`
    ///
    /// The staged text is consumed only if the command succeeds.
    pub async fn write_with(&self, index: usize, inline: Option<String>) -> Result<u64> {
        let mut guard = self.cell(index)?.lock().await;
        let cell = &mut *guard;

        let sql = cell.pending.take(PendingKind::Write, inline);
        let affected = cell.slot.execute_write(&self.driver, sql.as_deref()).await?;
        cell.pending.commit(PendingKind::Write);

        Ok(affected)
    }

    pub async fn set_read(&self, index: usize, text: impl Into<String>) -> Result<()> {
        self.cell(index)?.lock().await.pending.set(PendingKind::Read, text);
        Ok(())
    }

    pub async fn set_write(&self, index: usize, text: impl Into<String>) -> Result<()> {
        self.cell(index)?.lock().await.pending.set(PendingKind::Write, text);
        Ok(())
    }

    /// Currently staged query text of slot `index`
    pub async fn peek_read(&self, index: usize) -> Result<String> {
        Ok(self.cell(index)?.lock().await.pending.peek(PendingKind::Read).to_string())
    }

    /// Currently staged command text of slot `index`
    pub async fn peek_write(&self, index: usize) -> Result<String> {
        Ok(self.cell(index)?.lock().await.pending.peek(PendingKind::Write).to_string())
    }
}
