//! Command responses, primary-value extraction and server events

use serde_json::{Map, Value};

use crate::common::{Error, Result};

/// Result of a command, as seen by callers of the façade
///
/// Transport failures, server-reported failures and successes all share
/// this shape; `success` tells them apart from a caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Whether the command succeeded
    pub success: bool,
    /// Full result object
    pub data: Map<String, Value>,
    /// Human-readable error message (if failed)
    pub error: Option<String>,
    /// Structured error code such as `ELEMENT_NOT_FOUND` (if failed)
    pub error_code: Option<String>,
    /// Server-side execution time
    pub duration_ms: u64,
}

impl Response {
    /// Build a response from a raw `{"type":"response", ...}` frame
    pub fn from_raw(raw: &Value) -> Self {
        let success = raw.get("success").and_then(Value::as_bool).unwrap_or(false);
        let data = raw
            .get("result")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let (error, error_code) = if success {
            (None, None)
        } else {
            error_fields(raw)
        };

        Self {
            success,
            data,
            error,
            error_code,
            duration_ms: raw.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
        }
    }

    /// Build a transaction response from the server's transaction reply
    ///
    /// `total_steps` falls back to the number of steps that were sent.
    pub fn from_transaction(raw: &Value, steps_sent: usize) -> Self {
        let success = raw.get("success").and_then(Value::as_bool).unwrap_or(false);
        let mut data = Map::new();
        data.insert(
            "completed_steps".to_string(),
            raw.get("completed_steps").cloned().unwrap_or(Value::from(0)),
        );
        data.insert(
            "total_steps".to_string(),
            raw.get("total_steps").cloned().unwrap_or(Value::from(steps_sent)),
        );
        data.insert(
            "steps_results".to_string(),
            raw.get("steps_results").cloned().unwrap_or(Value::Array(Vec::new())),
        );
        data.insert(
            "rollback_performed".to_string(),
            raw.get("rollback_performed").cloned().unwrap_or(Value::Bool(false)),
        );
        let (error, error_code) = if success {
            (None, None)
        } else {
            error_fields(raw)
        };

        Self {
            success,
            data,
            error,
            error_code,
            duration_ms: raw.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
        }
    }

    /// Fold a client-side failure (timeout, lost connection, ...) into a response
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: Map::new(),
            error: Some(err.to_string()),
            error_code: Some(err.code().to_string()),
            duration_ms: 0,
        }
    }

    /// The primary result value, or `null` if the command failed
    pub fn value(&self) -> Value {
        if !self.success {
            return Value::Null;
        }
        primary_value(&self.data)
    }

    /// Convert a failed response into an error
    pub fn raise_for_error(self) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        Err(Error::command(
            self.error_code.as_deref().unwrap_or("UNKNOWN"),
            self.error.as_deref().unwrap_or("Unknown error"),
        ))
    }
}

fn error_fields(raw: &Value) -> (Option<String>, Option<String>) {
    let error = raw.get("error");
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let code = error
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string);
    (message, code)
}

/// Event pushed by the server
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub data: Map<String, Value>,
}

type Extractor = fn(&Map<String, Value>) -> Option<Value>;

/// Keys that confirm an action took place
const ACTION_KEYS: [&str; 9] = [
    "clicked", "typed", "focused", "scrolled", "hovered", "waited", "invoked", "dragged", "set",
];

/// Primary-value extractors, highest priority first
///
/// Each entry names the rule so the ordering can be inspected and tested on
/// its own. The first extractor that returns `Some` wins.
pub const VALUE_EXTRACTORS: &[(&str, Extractor)] = &[
    ("value", explicit_value),
    ("exists", exists_state),
    ("visible", visible_state),
    ("passed", passed_state),
    ("enabled", enabled_state),
    ("matches", match_list),
    ("widgets", widget_list),
    ("screenshot", screenshot_data),
    ("return", return_value),
    ("action", action_confirmation),
];

fn explicit_value(d: &Map<String, Value>) -> Option<Value> {
    d.get("value").cloned()
}

// `exists` only counts when the payload is not also a visibility report
fn exists_state(d: &Map<String, Value>) -> Option<Value> {
    if d.contains_key("visible") {
        return None;
    }
    d.get("exists").cloned()
}

fn visible_state(d: &Map<String, Value>) -> Option<Value> {
    d.get("visible").cloned()
}

fn passed_state(d: &Map<String, Value>) -> Option<Value> {
    d.get("passed").cloned()
}

fn enabled_state(d: &Map<String, Value>) -> Option<Value> {
    d.get("enabled").cloned()
}

fn match_list(d: &Map<String, Value>) -> Option<Value> {
    d.get("matches").cloned()
}

fn widget_list(d: &Map<String, Value>) -> Option<Value> {
    d.get("widgets").cloned()
}

fn screenshot_data(d: &Map<String, Value>) -> Option<Value> {
    d.get("screenshot").cloned()
}

fn return_value(d: &Map<String, Value>) -> Option<Value> {
    d.get("return").cloned()
}

fn action_confirmation(d: &Map<String, Value>) -> Option<Value> {
    ACTION_KEYS.iter().find_map(|key| d.get(*key).cloned())
}

/// Extract the most relevant value from a result payload
///
/// Total: falls back to the whole object when no extractor matches.
pub fn primary_value(data: &Map<String, Value>) -> Value {
    VALUE_EXTRACTORS
        .iter()
        .find_map(|(_, extract)| extract(data))
        .unwrap_or_else(|| Value::Object(data.clone()))
}

/// Truthiness of a JSON value: null, false, 0, "" and empty containers are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// JSON equality where `1` and `1.0` compare equal
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}
