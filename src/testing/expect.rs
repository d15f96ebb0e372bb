//! Semantic validation of step responses
//!
//! A transport-level `success` is necessary but not sufficient: boolean
//! probes must report true, `assert` must report a pass, and any `expect`
//! block on the step must hold.

use serde_json::Value;

use crate::client::response::{is_truthy, values_equal, Response};

use super::config::{Expectation, TestStep};

/// Outcome of a check; the error is a human-readable reason
pub type Check = std::result::Result<(), String>;

/// Validate a successful response against the step that produced it
pub fn check_step_result(step: &TestStep, resp: &Response) -> Check {
    let command = step.command.as_str();
    let value = resp.value();

    if matches!(command, "exists" | "is_visible") && !is_truthy(&value) {
        return Err(format!(
            "{} returned false for target {}",
            command,
            step.target().unwrap_or("null")
        ));
    }

    if command == "assert" && !is_truthy(&value) {
        let field = |key: &str| display(resp.data.get(key).unwrap_or(&Value::Null));
        return Err(format!(
            "assert failed: {} {} {}, got {}",
            field("property"),
            field("operator"),
            field("expected"),
            field("actual")
        ));
    }

    match &step.expect {
        Some(expect) => check_expectation(expect, resp, &value),
        None => Ok(()),
    }
}

/// Check every present key of an `expect` block, stopping at the first failure
pub fn check_expectation(expect: &Expectation, resp: &Response, value: &Value) -> Check {
    if let Some(expected) = &expect.value {
        if !values_equal(value, expected) {
            return Err(format!("expected value {}, got {}", repr(expected), repr(value)));
        }
    }

    if let Some(needle) = &expect.value_contains {
        check_value_contains(needle, value)?;
    }

    if let Some(min) = &expect.count_min {
        let min = min
            .as_i64()
            .ok_or_else(|| format!("expect.count_min must be an integer, got {}", repr(min)))?;
        let count = resp.data.get("count");
        if !count.and_then(Value::as_i64).is_some_and(|c| c >= min) {
            return Err(format!(
                "expected count >= {}, got {}",
                min,
                repr(count.unwrap_or(&Value::Null))
            ));
        }
    }

    if let Some(required) = &expect.data_contains {
        let required = required
            .as_object()
            .ok_or_else(|| "expect.data_contains must be an object".to_string())?;
        for (key, expected) in required {
            let actual = resp
                .data
                .get(key)
                .ok_or_else(|| format!("expected response data to contain key {:?}", key))?;
            if !values_equal(actual, expected) {
                return Err(format!(
                    "expected response data[{:?}] == {}, got {}",
                    key,
                    repr(expected),
                    repr(actual)
                ));
            }
        }
    }

    if let Some(requirements) = &expect.data_list_contains {
        let requirements = requirements
            .as_object()
            .ok_or_else(|| "expect.data_list_contains must be an object".to_string())?;
        for (key, item) in requirements {
            let list = match resp.data.get(key) {
                Some(Value::Array(list)) => list,
                other => {
                    return Err(format!(
                        "expected response data[{:?}] to be a list, got {}",
                        key,
                        type_name(other.unwrap_or(&Value::Null))
                    ))
                }
            };
            if !list.iter().any(|v| values_equal(v, item)) {
                return Err(format!(
                    "expected response data[{:?}] to contain {}",
                    key,
                    repr(item)
                ));
            }
        }
    }

    Ok(())
}

fn check_value_contains(needle: &Value, haystack: &Value) -> Check {
    match haystack {
        Value::String(s) => {
            let found = match needle {
                Value::String(n) => s.contains(n.as_str()),
                _ => false,
            };
            if found {
                Ok(())
            } else {
                Err(format!(
                    "expected value to contain {}, got {}",
                    repr(needle),
                    repr(haystack)
                ))
            }
        }
        Value::Array(items) => {
            if items.iter().any(|v| values_equal(v, needle)) {
                Ok(())
            } else {
                Err(format!(
                    "expected value list to contain {}, got {}",
                    repr(needle),
                    repr(haystack)
                ))
            }
        }
        other => Err(format!(
            "value_contains requires string/list value, got {}",
            type_name(other)
        )),
    }
}

/// Quoted JSON rendering used in mismatch messages
fn repr(value: &Value) -> String {
    value.to_string()
}

/// Plain rendering: strings without quotes, everything else as JSON
pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
