//! Conversion of backend-native results into the two shapes tools return.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::SecondsFormat;
use rmcp::model::{CallToolResult, Content};
use serde_json::{Map, Value, json};
use std::collections::HashSet;

use crate::backends::{BackendKind, BrokerMessage, RowSet, SqlValue};

/// Fields HTTP APIs add for hypermedia navigation. Dropped at every depth.
const ENVELOPE_FIELDS: [&str; 5] = ["self", "_links", "links", "expand", "_expandable"];

/// What a tool hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResult {
    Structured(Value),
    Text(String),
}

impl NormalizedResult {
    /// Render as an MCP tool result.
    ///
    /// Structured values carry a JSON text rendering too. MCP structured
    /// content must be an object, so other values are wrapped under `result`.
    pub fn into_call_result(self) -> CallToolResult {
        match self {
            Self::Text(text) => CallToolResult::success(vec![Content::text(text)]),
            Self::Structured(value) => {
                let rendered =
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                let structured = match value {
                    Value::Object(_) => value,
                    other => json!({ "result": other }),
                };
                CallToolResult {
                    content: vec![Content::text(rendered)],
                    structured_content: Some(structured),
                    is_error: Some(false),
                    meta: None,
                }
            }
        }
    }
}

/// A tool's result before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// Rows from a relational store.
    Rows(RowSet),
    /// The outcome of a key-value lookup.
    KvValue { key: String, value: Option<Vec<u8>> },
    /// Consumed broker records.
    Messages(Vec<BrokerMessage>),
    /// A JSON document.
    Document(Value),
    /// Plain text.
    Text(String),
}

/// Turn a raw result from a backend of `kind` into a [`NormalizedResult`].
///
/// Pure and order-preserving: the same input always renders to the same
/// output.
pub fn normalize(kind: BackendKind, raw: RawOutput) -> NormalizedResult {
    match raw {
        RawOutput::Rows(rows) => NormalizedResult::Structured(rows_to_json(&rows)),
        RawOutput::KvValue { key, value } => NormalizedResult::Structured(kv_to_json(key, value)),
        RawOutput::Messages(messages) => NormalizedResult::Structured(Value::Array(
            messages.into_iter().map(message_to_json).collect(),
        )),
        RawOutput::Document(value) if kind == BackendKind::HttpApi => {
            NormalizedResult::Structured(strip_envelope(value))
        }
        RawOutput::Document(value) => NormalizedResult::Structured(value),
        RawOutput::Text(text) => NormalizedResult::Text(text),
    }
}

fn rows_to_json(rows: &RowSet) -> Value {
    let keys = unique_keys(&rows.columns);
    Value::Array(
        rows.rows
            .iter()
            .map(|row| {
                let fields: Map<String, Value> = keys
                    .iter()
                    .cloned()
                    .zip(row.iter().map(sql_value_to_json))
                    .collect();
                Value::Object(fields)
            })
            .collect(),
    )
}

/// Object keys for a result's columns. A repeated name (`SELECT a.id, b.id`)
/// becomes `id_2`, `id_3`, ... skipping any name the query already returns.
fn unique_keys(columns: &[String]) -> Vec<String> {
    let returned: HashSet<&str> = columns.iter().map(String::as_str).collect();
    let mut used: HashSet<String> = HashSet::with_capacity(columns.len());
    columns
        .iter()
        .map(|name| {
            if used.insert(name.clone()) {
                return name.clone();
            }
            let mut n = 2;
            loop {
                let candidate = format!("{name}_{n}");
                if !returned.contains(candidate.as_str()) && used.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

fn sql_value_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(n) => Value::from(*n),
        SqlValue::Float(f) if f.is_finite() => Value::from(*f),
        SqlValue::Float(f) => Value::String(non_finite(*f).to_string()),
        SqlValue::Numeric(text) | SqlValue::Text(text) => Value::String(text.clone()),
        SqlValue::Bytes(bytes) => Value::String(BASE64.encode(bytes)),
        SqlValue::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        SqlValue::LocalTimestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        SqlValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        SqlValue::Time(time) => Value::String(time.format("%H:%M:%S%.f").to_string()),
        SqlValue::Json(json) => json.clone(),
    }
}

fn non_finite(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn kv_to_json(key: String, value: Option<Vec<u8>>) -> Value {
    let mut out = Map::new();
    out.insert("key".to_string(), Value::String(key));
    out.insert("found".to_string(), Value::Bool(value.is_some()));
    insert_bytes(&mut out, "value", value);
    Value::Object(out)
}

fn message_to_json(message: BrokerMessage) -> Value {
    let mut out = Map::new();
    out.insert("topic".to_string(), Value::String(message.topic));
    out.insert("partition".to_string(), Value::from(message.partition));
    out.insert("offset".to_string(), Value::from(message.offset));
    insert_bytes(&mut out, "key", message.key);
    insert_bytes(&mut out, "value", message.value);
    out.insert("timestamp".to_string(), Value::from(message.timestamp_ms));
    Value::Object(out)
}

/// Insert bytes as text when they are valid UTF-8, otherwise as base64 with a
/// `<field>_encoding` marker.
fn insert_bytes(out: &mut Map<String, Value>, field: &str, bytes: Option<Vec<u8>>) {
    let value = match bytes {
        None => Value::Null,
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::String(text),
            Err(err) => {
                out.insert(format!("{field}_encoding"), Value::String("base64".to_string()));
                Value::String(BASE64.encode(err.as_bytes()))
            }
        },
    };
    out.insert(field.to_string(), value);
}

fn strip_envelope(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !ENVELOPE_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k, strip_envelope(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_envelope).collect()),
        other => other,
    }
}
