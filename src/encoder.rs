//! Result Encoder
//!
//! The host reads back exactly one scalar per request, so a tabular result is
//! flattened into a single delimited string:
//!
//! - columns within a row are joined with `~`
//! - every row is followed by `*`, and the final trailing `*` is trimmed
//!
//! `[[a,b,c],[d,e,f]]` encodes as `a~b~c*d~e~f`; `[[x],[y]]` encodes as `x*y`.
//! A result with no rows encodes as the empty string.

use serde_json::Value;

use crate::driver::QueryRows;

/// Separator between column values within a row
pub const COLUMN_SEPARATOR: char = '~';

/// Terminator written after each row
pub const ROW_SEPARATOR: char = '*';

/// Token used for SQL NULL
pub const NULL_TOKEN: &str = "null";

/// Flatten a result set into one string
#[must_use]
pub fn encode(result: &QueryRows) -> String {
    encode_rows(&result.rows)
}

/// Flatten rows into one string
#[must_use]
pub fn encode_rows(rows: &[Vec<Value>]) -> String {
    let mut out = String::new();

    for row in rows {
        for (idx, value) in row.iter().enumerate() {
            if idx > 0 {
                out.push(COLUMN_SEPARATOR);
            }
            push_value(&mut out, value);
        }
        out.push(ROW_SEPARATOR);
    }

    // Trim exactly the final row terminator
    if out.ends_with(ROW_SEPARATOR) {
        out.pop();
    }

    out
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str(NULL_TOKEN),
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        // Arrays and objects (JSON columns) keep their compact JSON text
        other => out.push_str(&other.to_string()),
    }
}
