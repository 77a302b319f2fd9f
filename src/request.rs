//! Host Request Wire Types
//!
//! The host hands the gateway an ordered batch of requests. Each request names a
//! symbolic command and may carry a `writeValue`; the dispatcher fills in
//! `readValue`, `resultText` and `statusCode` in place.
//!
//! # Format
//! ```json
//! {"commands":[{"commandName":"CONNECT"},{"commandName":"setQUERY","writeValue":"SELECT 1"}]}
//! ```
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::status::StatusCode;

/// One symbolic command from the host plus the fields the gateway populates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    /// Symbolic operation, e.g. `READ_OP2`
    pub command_name: String,

    /// Inline SQL for read/write triggers, staged text for set commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_value: Option<Value>,

    /// Operation output (encoded rows, status text, or the failure description)
    #[serde(default)]
    pub read_value: Value,

    /// Human-readable outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,

    #[serde(default)]
    pub status_code: StatusCode,

    /// Numeric form of `status_code` for hosts that only map integers
    #[serde(default)]
    pub status_value: u32,
}

impl InboundRequest {
    pub fn new(command_name: impl Into<String>) -> Self {
        Self { command_name: command_name.into(), ..Self::default() }
    }

    /// Request carrying a text payload
    pub fn with_value(command_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { write_value: Some(Value::String(value.into())), ..Self::new(command_name) }
    }

    /// `writeValue` as SQL text
    ///
    /// Strings are taken verbatim and `null` counts as absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for numbers, booleans, arrays and objects.
    pub fn write_text(&self) -> Result<Option<String>> {
        match &self.write_value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(other) => Err(GatewayError::invalid_input(format!(
                "writeValue must be a string, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Populate the output fields
    pub fn complete(&mut self, status: StatusCode, read_value: impl Into<Value>, result_text: impl Into<String>) {
        self.status_code = status;
        self.status_value = status.as_u32();
        self.read_value = read_value.into();
        self.result_text = Some(result_text.into());
    }

    /// Clear any output left over from a previous pass
    pub fn reset_outputs(&mut self) {
        self.read_value = Value::Null;
        self.result_text = None;
        self.status_code = StatusCode::Success;
        self.status_value = 0;
    }
}

/// Summary of one processed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Batch-level outcome; per-request status carries the detail
    pub result: StatusCode,
    /// Requests handled
    pub processed: usize,
    /// Requests that ended with an error status
    pub failed: usize,
}

/// Ordered batch of requests as delivered by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandBatch {
    pub commands: Vec<InboundRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
}

impl CommandBatch {
    pub fn new(commands: Vec<InboundRequest>) -> Self {
        Self { commands, report: None }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
