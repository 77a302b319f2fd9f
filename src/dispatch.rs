//! Command Dispatcher
//!
//! Translates symbolic command names into slot registry calls and writes the
//! outcome back onto each request.
//!
//! # Command Table
//! Every slot operation exists once per slot: the bare name addresses slot 0 and
//! the `_OP1`..`_OP5` suffixes address the optional slots. `getHOST`, `getPORT`
//! and `getUSER` read shared configuration and are not slot-bound.
//!
//! # Isolation
//! Requests in a batch run one after another. Each request is handled on its own
//! task, so a failure or a panic is reported on that request and the rest of the
//! batch carries on.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::driver::{Driver, KEY_HOST, KEY_PORT, KEY_USERNAME};
use crate::error::GatewayError;
use crate::registry::{target_key, ConnectOutcome, SlotRegistry, SLOT_COUNT};
use crate::request::{BatchReport, CommandBatch, InboundRequest};
use crate::slot::SlotState;
use crate::status::StatusCode;

/// What a command does to its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Read,
    Write,
    Close,
    /// `getCONNECTED`: true iff the slot is open
    Status,
    /// `getQUERY`
    PeekRead,
    /// `getINSERT`
    PeekWrite,
    /// `setQUERY`
    StageRead,
    /// `setINSERT`
    StageWrite,
    GetHost,
    GetPort,
    GetUser,
    /// `getDB`: the slot's configured database name
    GetDatabase,
}

impl Operation {
    /// Command name prefix for slot-bound operations
    const SLOT_COMMANDS: [(&'static str, Self); 10] = [
        ("CONNECT", Self::Connect),
        ("READ", Self::Read),
        ("WRITE", Self::Write),
        ("CLOSE", Self::Close),
        ("getCONNECTED", Self::Status),
        ("getQUERY", Self::PeekRead),
        ("getINSERT", Self::PeekWrite),
        ("setQUERY", Self::StageRead),
        ("setINSERT", Self::StageWrite),
        ("getDB", Self::GetDatabase),
    ];

    const SHARED_COMMANDS: [(&'static str, Self); 3] =
        [("getHOST", Self::GetHost), ("getPORT", Self::GetPort), ("getUSER", Self::GetUser)];

    /// Whether the request's `writeValue` carries SQL text for this operation
    #[must_use]
    pub const fn takes_sql(self) -> bool {
        matches!(self, Self::Read | Self::Write | Self::StageRead | Self::StageWrite)
    }
}

/// Slot index plus operation a command resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub slot: usize,
    pub operation: Operation,
}

/// Symbolic command name to route
#[derive(Debug, Clone)]
pub struct CommandTable {
    routes: HashMap<String, Route>,
}

impl CommandTable {
    /// The full command surface for six slots
    #[must_use]
    pub fn standard() -> Self {
        let mut routes = HashMap::new();

        for slot in 0..SLOT_COUNT {
            let suffix = if slot == 0 { String::new() } else { format!("_OP{slot}") };
            for (prefix, operation) in Operation::SLOT_COMMANDS {
                routes.insert(format!("{prefix}{suffix}"), Route { slot, operation });
            }
        }
        for (name, operation) in Operation::SHARED_COMMANDS {
            routes.insert(name.to_string(), Route { slot: 0, operation });
        }

        Self { routes }
    }

    /// Exact, case-sensitive lookup
    #[must_use]
    pub fn resolve(&self, command_name: &str) -> Option<Route> {
        self.routes.get(command_name).copied()
    }

    /// All command names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Populated output fields for one request
#[derive(Debug, Clone, PartialEq)]
struct Outcome {
    status: StatusCode,
    read_value: Value,
    result_text: String,
}

impl Outcome {
    fn success(read_value: impl Into<Value>, result_text: impl Into<String>) -> Self {
        Self { status: StatusCode::Success, read_value: read_value.into(), result_text: result_text.into() }
    }

    fn failure(error: &GatewayError, text: String) -> Self {
        Self { status: error.status_code(), read_value: Value::String(text.clone()), result_text: text }
    }
}

/// Routes request batches onto a shared slot registry
pub struct Dispatcher<D: Driver> {
    registry: Arc<SlotRegistry<D>>,
    table: CommandTable,
}

impl<D: Driver> Clone for Dispatcher<D> {
    fn clone(&self) -> Self {
        Self { registry: Arc::clone(&self.registry), table: self.table.clone() }
    }
}

impl<D: Driver> Dispatcher<D> {
    pub fn new(registry: Arc<SlotRegistry<D>>) -> Self {
        Self { registry, table: CommandTable::standard() }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SlotRegistry<D>> {
        &self.registry
    }

    #[must_use]
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Process a host batch in place and attach its report
    pub async fn dispatch_batch(&self, batch: &mut CommandBatch) -> BatchReport {
        let report = self.dispatch(&mut batch.commands).await;
        batch.report = Some(report);
        report
    }

    /// Process every request in order, populating its output fields
    ///
    /// The batch itself always succeeds; failures are reported per request.
    pub async fn dispatch(&self, requests: &mut [InboundRequest]) -> BatchReport {
        let mut report = BatchReport::default();

        for request in requests.iter_mut() {
            self.dispatch_one(request).await;
            report.processed += 1;
            if !request.status_code.is_success() {
                report.failed += 1;
            }
        }

        debug!(processed = report.processed, failed = report.failed, "batch dispatched");
        report
    }

    /// Process a single request
    pub async fn dispatch_one(&self, request: &mut InboundRequest) {
        request.reset_outputs();

        let Some(route) = self.table.resolve(&request.command_name) else {
            let error = GatewayError::unknown_command(request.command_name.clone());
            warn!(command = %request.command_name, "unknown command");
            let outcome = Outcome::failure(&error, error.message());
            request.complete(outcome.status, outcome.read_value, outcome.result_text);
            return;
        };

        debug!(
            command = %request.command_name,
            slot = route.slot,
            operation = ?route.operation,
            "dispatching"
        );

        let value = if route.operation.takes_sql() {
            match request.write_text() {
                Ok(value) => value,
                Err(error) => {
                    warn!(command = %request.command_name, error = %error, "rejected request payload");
                    let outcome = Outcome::failure(&error, error.message());
                    request.complete(outcome.status, outcome.read_value, outcome.result_text);
                    return;
                }
            }
        } else {
            None
        };

        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(async move { execute(&registry, route, value).await });

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let detail = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                warn!(command = %request.command_name, error = %detail, "request handler failed");
                let text = format!(
                    "Calling command '{}' failed! Additional information: {detail}",
                    request.command_name
                );
                Outcome {
                    status: StatusCode::InternalFailure,
                    read_value: Value::String(text.clone()),
                    result_text: text,
                }
            }
        };

        if !outcome.status.is_success() {
            warn!(command = %request.command_name, status = %outcome.status, "request failed");
        }
        request.complete(outcome.status, outcome.read_value, outcome.result_text);
    }
}

async fn execute<D: Driver>(registry: &SlotRegistry<D>, route: Route, value: Option<String>) -> Outcome {
    let slot = route.slot;

    match route.operation {
        Operation::Connect => match registry.connect(slot).await {
            Ok(ConnectOutcome::Connected(text)) => Outcome::success(text.clone(), text),
            Ok(ConnectOutcome::NotConfigured) => Outcome {
                status: StatusCode::NotConfigured,
                read_value: Value::String(ConnectOutcome::NotConfigured.status_text().to_string()),
                result_text: ConnectOutcome::NotConfigured.status_text().to_string(),
            },
            Err(e @ GatewayError::ConnectionFailure(_)) => {
                Outcome::failure(&e, format!("No Connection ({})", e.detail()))
            }
            Err(e) => Outcome::failure(&e, e.message()),
        },

        Operation::Read => match registry.read_with(slot, value).await {
            Ok(encoded) => Outcome::success(encoded, "Read from DB"),
            Err(e) => Outcome::failure(&e, read_failure_text(&e)),
        },

        Operation::Write => match registry.write_with(slot, value).await {
            Ok(affected) => Outcome::success("Wrote to DB", format!("Wrote to DB ({affected} rows affected)")),
            Err(e) => Outcome::failure(&e, write_failure_text(&e)),
        },

        Operation::Close => match registry.close(slot).await {
            Ok(()) => Outcome::success(false, "Connection closed"),
            Err(e) => Outcome::failure(&e, e.message()),
        },

        Operation::Status => match registry.state(slot).await {
            Ok(state) => Outcome::success(state == SlotState::Open, state.to_string()),
            Err(e) => Outcome::failure(&e, e.message()),
        },

        Operation::PeekRead => match registry.peek_read(slot).await {
            Ok(text) => {
                let line = format!("Current Query String: {text}");
                Outcome::success(line.clone(), line)
            }
            Err(e) => Outcome::failure(&e, e.message()),
        },

        Operation::PeekWrite => match registry.peek_write(slot).await {
            Ok(text) => {
                let line = format!("Current Insert String: {text}");
                Outcome::success(line.clone(), line)
            }
            Err(e) => Outcome::failure(&e, e.message()),
        },

        Operation::StageRead => {
            let text = value.unwrap_or_default();
            match registry.set_read(slot, text.clone()).await {
                Ok(()) => Outcome::success(text, "Query staged"),
                Err(e) => Outcome::failure(&e, e.message()),
            }
        }

        Operation::StageWrite => {
            let text = value.unwrap_or_default();
            match registry.set_write(slot, text.clone()).await {
                Ok(()) => Outcome::success(text, "Insert staged"),
                Err(e) => Outcome::failure(&e, e.message()),
            }
        }

        Operation::GetHost => config_outcome(registry, KEY_HOST),
        Operation::GetPort => config_outcome(registry, KEY_PORT),
        Operation::GetUser => config_outcome(registry, KEY_USERNAME),
        Operation::GetDatabase => config_outcome(registry, &target_key(slot)),
    }
}

fn config_outcome<D: Driver>(registry: &SlotRegistry<D>, key: &str) -> Outcome {
    match registry.config_value(key) {
        Some(value) => Outcome::success(value.clone(), format!("{key} = {value}")),
        None => Outcome::success(Value::Null, format!("{key} not set")),
    }
}

fn read_failure_text(error: &GatewayError) -> String {
    match error {
        GatewayError::QueryNotSet => {
            "QUERY string null, use setQUERY method before triggering READ".to_string()
        }
        GatewayError::ExecutionFailure(detail) => format!("Failed to read: {detail}"),
        other => other.message(),
    }
}

fn write_failure_text(error: &GatewayError) -> String {
    match error {
        GatewayError::QueryNotSet => {
            "INSERT string null, use setINSERT method before triggering WRITE".to_string()
        }
        GatewayError::ExecutionFailure(detail) => format!("Failed to write: {detail}"),
        other => other.message(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{FakeDriver, PANIC_SQL};
    use crate::driver::QueryRows;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dispatcher(pairs: &[(&str, &str)]) -> Dispatcher<FakeDriver> {
        let config: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Dispatcher::new(Arc::new(SlotRegistry::new(FakeDriver::default(), Arc::new(config))))
    }

    async fn run(dispatcher: &Dispatcher<FakeDriver>, request: InboundRequest) -> InboundRequest {
        let mut requests = vec![request];
        dispatcher.dispatch(&mut requests).await;
        requests.remove(0)
    }

    #[test]
    fn test_standard_table_covers_every_slot() {
        let table = CommandTable::standard();
        assert_eq!(table.len(), 10 * SLOT_COUNT + 3);

        assert_eq!(table.resolve("CONNECT"), Some(Route { slot: 0, operation: Operation::Connect }));
        assert_eq!(table.resolve("READ_OP3"), Some(Route { slot: 3, operation: Operation::Read }));
        assert_eq!(
            table.resolve("setINSERT_OP5"),
            Some(Route { slot: 5, operation: Operation::StageWrite })
        );
        assert_eq!(
            table.resolve("getCONNECTED_OP1"),
            Some(Route { slot: 1, operation: Operation::Status })
        );
        assert_eq!(table.resolve("getHOST"), Some(Route { slot: 0, operation: Operation::GetHost }));
        assert_eq!(table.resolve("CONNECT_OP6"), None);
        assert_eq!(table.resolve("connect"), None);
    }

    #[tokio::test]
    async fn test_unknown_command_leaves_slots_alone() {
        let dispatcher = dispatcher(&[("DB", "plant")]);
        let request = run(&dispatcher, InboundRequest::new("BOGUS")).await;

        assert_eq!(request.status_code, StatusCode::UnknownCommand);
        assert_eq!(request.result_text.as_deref(), Some("Unknown command 'BOGUS' not handled."));
        for slot in 0..SLOT_COUNT {
            assert!(!dispatcher.registry().is_open(slot).await.unwrap());
        }
        assert_eq!(dispatcher.registry().driver().opens(), 0);
    }

    #[tokio::test]
    async fn test_batch_isolation_with_unconfigured_slot() {
        let dispatcher = dispatcher(&[("DB", "plant")]);
        dispatcher.registry().connect(0).await.unwrap();

        let mut batch = vec![
            InboundRequest::new("getCONNECTED"),
            InboundRequest::new("CONNECT_OP2"),
            InboundRequest::new("getCONNECTED"),
        ];
        let report = dispatcher.dispatch(&mut batch).await;

        assert_eq!(batch[0].status_code, StatusCode::Success);
        assert_eq!(batch[0].read_value, json!(true));
        assert_eq!(batch[1].status_code, StatusCode::NotConfigured);
        assert_eq!(batch[1].read_value, json!("Not Configured"));
        assert_eq!(batch[2], batch[0]);
        assert_eq!(report, BatchReport { result: StatusCode::Success, processed: 3, failed: 0 });
    }

    #[tokio::test]
    async fn test_read_flow_and_messages() {
        let dispatcher = dispatcher(&[("DB_OP1", "recipes")]);
        dispatcher.registry().driver().result_for(
            "SELECT name, qty FROM recipe",
            QueryRows::new(
                vec!["name".into(), "qty".into()],
                vec![vec![json!("flour"), json!(2)], vec![json!("salt"), json!(1)]],
            ),
        );

        let not_connected = run(&dispatcher, InboundRequest::new("READ_OP1")).await;
        assert_eq!(not_connected.status_code, StatusCode::NotConnected);
        assert_eq!(not_connected.read_value, json!("Not connected to DB"));

        let connected = run(&dispatcher, InboundRequest::new("CONNECT_OP1")).await;
        assert_eq!(connected.read_value, json!("Open (recipes)"));

        let not_set = run(&dispatcher, InboundRequest::new("READ_OP1")).await;
        assert_eq!(not_set.status_code, StatusCode::QueryNotSet);
        assert_eq!(
            not_set.read_value,
            json!("QUERY string null, use setQUERY method before triggering READ")
        );

        run(&dispatcher, InboundRequest::with_value("setQUERY_OP1", "SELECT name, qty FROM recipe")).await;
        let read = run(&dispatcher, InboundRequest::new("READ_OP1")).await;
        assert_eq!(read.status_code, StatusCode::Success);
        assert_eq!(read.read_value, json!("flour~2*salt~1"));

        let peek = run(&dispatcher, InboundRequest::new("getQUERY_OP1")).await;
        assert_eq!(peek.read_value, json!("Current Query String: "));
    }

    #[tokio::test]
    async fn test_write_failure_keeps_staged_insert() {
        let dispatcher = dispatcher(&[("DB", "plant")]);
        dispatcher.registry().driver().fail_sql("INSERT INTO t VALUES (1)", "duplicate key");

        let mut batch = vec![
            InboundRequest::new("CONNECT"),
            InboundRequest::with_value("setINSERT", "INSERT INTO t VALUES (1)"),
            InboundRequest::new("WRITE"),
            InboundRequest::new("getINSERT"),
        ];
        let report = dispatcher.dispatch(&mut batch).await;

        assert_eq!(batch[2].status_code, StatusCode::ExecutionFailure);
        assert_eq!(batch[2].read_value, json!("Failed to write: duplicate key"));
        assert_eq!(batch[3].read_value, json!("Current Insert String: INSERT INTO t VALUES (1)"));
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_non_string_sql_payload_is_invalid_input() {
        let dispatcher = dispatcher(&[("DB", "plant")]);
        run(&dispatcher, InboundRequest::with_value("setQUERY", "SELECT 1")).await;

        let mut stage = InboundRequest::new("setQUERY");
        stage.write_value = Some(json!(42));
        let mut read = InboundRequest::new("READ");
        read.write_value = Some(json!({"sql": "SELECT 2"}));
        let mut getter = InboundRequest::new("getHOST");
        getter.write_value = Some(json!(true));

        let mut batch = vec![stage, read, getter, InboundRequest::new("getQUERY")];
        let report = dispatcher.dispatch(&mut batch).await;

        assert_eq!(batch[0].status_code, StatusCode::InvalidInput);
        assert_eq!(batch[0].read_value, json!("Invalid input: writeValue must be a string, got a number"));
        assert_eq!(batch[1].status_code, StatusCode::InvalidInput);
        assert_eq!(batch[2].status_code, StatusCode::Success);
        assert_eq!(batch[3].read_value, json!("Current Query String: SELECT 1"));
        assert_eq!(report.failed, 2);
        assert_eq!(dispatcher.registry().driver().opens(), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_message() {
        let dispatcher = dispatcher(&[("DB", "plant")]);
        dispatcher.registry().driver().fail_open("connection refused");

        let request = run(&dispatcher, InboundRequest::new("CONNECT")).await;
        assert_eq!(request.status_code, StatusCode::ConnectionFailure);
        assert_eq!(request.read_value, json!("No Connection (connection refused)"));
        assert_eq!(dispatcher.registry().state(0).await.unwrap(), SlotState::Failed);
    }

    #[tokio::test]
    async fn test_panic_is_reported_on_its_request_only() {
        let dispatcher = dispatcher(&[("DB", "plant")]);

        let mut batch = vec![
            InboundRequest::new("CONNECT"),
            InboundRequest::with_value("READ", PANIC_SQL),
            InboundRequest::new("getCONNECTED_OP4"),
        ];
        let report = dispatcher.dispatch(&mut batch).await;

        assert_eq!(batch[0].status_code, StatusCode::Success);
        assert_eq!(batch[1].status_code, StatusCode::InternalFailure);
        let text = batch[1].result_text.clone().unwrap();
        assert!(text.starts_with("Calling command 'READ' failed!"), "{text}");
        assert!(text.contains("fake driver asked to panic"));
        assert_eq!(batch[2].status_code, StatusCode::Success);
        assert_eq!(batch[2].read_value, json!(false));
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_config_getters_never_expose_password() {
        let dispatcher = dispatcher(&[
            ("AddrServer", "10.0.0.5"),
            ("Port", "5432"),
            ("username", "hmi"),
            ("userpassword", "secret"),
            ("DB_OP2", "recipes"),
        ]);

        let mut batch = vec![
            InboundRequest::new("getHOST"),
            InboundRequest::new("getPORT"),
            InboundRequest::new("getUSER"),
            InboundRequest::new("getDB_OP2"),
            InboundRequest::new("getDB"),
            InboundRequest::new("getPASSWORD"),
        ];
        dispatcher.dispatch(&mut batch).await;

        assert_eq!(batch[0].read_value, json!("10.0.0.5"));
        assert_eq!(batch[1].read_value, json!("5432"));
        assert_eq!(batch[2].read_value, json!("hmi"));
        assert_eq!(batch[3].read_value, json!("recipes"));
        assert_eq!(batch[4].read_value, Value::Null);
        assert_eq!(batch[5].status_code, StatusCode::UnknownCommand);
        assert!(batch.iter().all(|r| r.read_value != json!("secret")));
    }

    #[tokio::test]
    async fn test_dispatch_batch_attaches_report() {
        let dispatcher = dispatcher(&[]);
        let mut batch = CommandBatch::new(vec![InboundRequest::new("CLOSE_OP3")]);

        let report = dispatcher.dispatch_batch(&mut batch).await;
        assert_eq!(batch.report, Some(report));
        assert_eq!(batch.commands[0].status_code, StatusCode::Success);
        assert_eq!(batch.commands[0].read_value, json!(false));
    }
}
