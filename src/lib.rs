//! Slotgate - Command-Routed Database Gateway
//!
//! Slotgate lets an automation host drive up to six relational databases through
//! symbolic commands (`CONNECT`, `READ_OP2`, `setINSERT_OP4`, ...) without knowing
//! anything about drivers, connection lifecycles or result encoding.
//!
//! # Core Principles
//! - One live handle per slot, opened lazily and never reopened while open
//! - Staged SQL is consumed at most once, and only by a successful execution
//! - Results travel back as one flat string per request
//! - A failing request never aborts its batch
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`status`] - Per-request status codes
//! - [`request`] - Host request and batch wire types
//! - [`encoder`] - Flattening of tabular results
//! - [`pending`] - Staged read/write SQL per slot
//! - [`slot`] - Connection slot lifecycle
//! - [`registry`] - The six slots, index-addressed
//! - [`dispatch`] - Command table and batch dispatcher
//! - [`driver`] - Driver capability trait and implementations
//! - [`config`] - Host configuration provider
//! - [`host`] - Line-delimited JSON host loop

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod host;
pub mod pending;
pub mod registry;
pub mod request;
pub mod slot;
pub mod status;

// Re-export commonly used types for convenience
pub use config::{
    load_with_precedence, ConfigLocation, ConfigProvider, ExtensionConfig, Timeouts,
};
pub use dispatch::{CommandTable, Dispatcher, Operation, Route};
pub use driver::{ConnectionDescriptor, DatabaseType, Driver, QueryRows};
pub use error::{GatewayError, Result};
pub use pending::{PendingKind, PendingOperation, SlotStaging, StagingPolicy};
pub use registry::{ConnectOutcome, RegistryOptions, SlotRegistry, SLOT_COUNT};
pub use request::{BatchReport, CommandBatch, InboundRequest};
pub use slot::{ConnectionSlot, SlotState};
pub use status::StatusCode;

#[cfg(feature = "mysql")]
pub use driver::mysql::MySqlDriver;
#[cfg(feature = "postgres")]
pub use driver::postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use driver::sqlite::SqliteDriver;
