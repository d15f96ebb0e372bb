//! Test document types
//!
//! Suites are loaded from JSON or YAML:
//!
//! ```yaml
//! name: Login dialog
//! setup:
//!   - command: click
//!     params: { target: "#openLogin" }
//! tests:
//!   - name: rejects empty password
//!     steps:
//!       - command: type
//!         params: { target: "#user", text: "alice" }
//!         delay_ms: 50
//!       - command: click
//!         params: { target: "#submit" }
//!       - command: get_property
//!         params: { target: "#status", property: "text" }
//!         expect: { value_contains: "password" }
//!     assertions:
//!       - { target: "#submit", property: enabled, operator: "==", value: true }
//! teardown:
//!   - command: click
//!     params: { target: "#cancel" }
//! ```

use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::client::protocol::Params;
use crate::common::{Error, Result};

/// A complete suite document
#[derive(Deserialize, Debug, Clone)]
pub struct TestSuite {
    #[serde(default = "default_name")]
    pub name: String,
    /// Steps run once before any test; a failure aborts the suite
    #[serde(default)]
    pub setup: Vec<TestStep>,
    /// Steps run once after all tests, best-effort
    #[serde(default)]
    pub teardown: Vec<TestStep>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// One named test
#[derive(Deserialize, Debug, Clone)]
pub struct TestCase {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<TestStep>,
    /// Checked in order once every step has passed
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

/// A command to execute, with optional validation
#[derive(Deserialize, Debug, Clone)]
pub struct TestStep {
    pub command: String,
    #[serde(default)]
    pub params: Params,
    pub expect: Option<Expectation>,
    /// Pause after the step passes; a malformed value is ignored
    #[serde(default, deserialize_with = "delay")]
    pub delay_ms: Option<u64>,
}

impl TestStep {
    pub fn new(command: &str, params: Params) -> Self {
        Self {
            command: command.to_string(),
            params,
            expect: None,
            delay_ms: None,
        }
    }

    /// The step's `target` param, if it is a string
    pub fn target(&self) -> Option<&str> {
        self.params.get("target").and_then(Value::as_str)
    }
}

/// Checks applied to a step's response
///
/// Each field is only checked when present in the document. An explicit
/// `value: null` is present and expects a null primary value.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Expectation {
    /// Exact match against the primary value
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    /// Substring (string value) or member (list value)
    #[serde(default, deserialize_with = "present")]
    pub value_contains: Option<Value>,
    /// Lower bound on `data.count`
    #[serde(default, deserialize_with = "present")]
    pub count_min: Option<Value>,
    /// Object of keys that must equal the given values in `data`
    #[serde(default, deserialize_with = "present")]
    pub data_contains: Option<Value>,
    /// Object of keys whose `data` lists must contain the given items
    #[serde(default, deserialize_with = "present")]
    pub data_list_contains: Option<Value>,
}

/// Server-side property assertion
#[derive(Deserialize, Debug, Clone)]
pub struct Assertion {
    pub target: String,
    pub property: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

fn default_name() -> String {
    "unnamed".to_string()
}

fn default_operator() -> String {
    "==".to_string()
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn delay<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    let delay = value.as_u64();
    if delay.is_none() {
        tracing::warn!("Ignoring delay_ms {}: expected a non-negative integer", value);
    }
    Ok(delay)
}

/// Document format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// `.yaml`/`.yml` are YAML; everything else is read as JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                DocumentFormat::Yaml
            }
            _ => DocumentFormat::Json,
        }
    }
}

impl TestSuite {
    /// Load a suite from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content, DocumentFormat::from_path(path))
            .map_err(|reason| Error::test_document(path, reason))
    }

    /// Parse suite text, returning the parser's message on failure
    pub fn parse(content: &str, format: DocumentFormat) -> std::result::Result<Self, String> {
        match format {
            DocumentFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        }
    }

    /// Test names in document order
    pub fn test_names(&self) -> Vec<&str> {
        self.tests.iter().map(|t| t.name.as_str()).collect()
    }
}
