//! Suite execution against an in-process mock server

mod common;

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{fail, ok, MockServer};
use serde_json::{json, Value};
use widgeteer::cli::wait_for_server;
use widgeteer::testing::{TestExecutor, SETUP_RESULT_NAME};
use widgeteer::WidgeteerClient;

/// A tiny fake application: a few widgets with mutable properties
async fn fake_app() -> MockServer {
    let widgets: Arc<Mutex<HashMap<String, Value>>> = Arc::new(Mutex::new(HashMap::from([
        ("@name:user".to_string(), json!({ "text": "", "enabled": true })),
        ("@name:submit".to_string(), json!({ "text": "Sign in", "enabled": true })),
        ("@name:status".to_string(), json!({ "text": "", "enabled": true })),
    ])));

    MockServer::start(move |req| {
        let mut widgets = widgets.lock().unwrap();
        let params = &req["params"];
        let target = params["target"].as_str().unwrap_or_default().to_string();
        let frame = match req["command"].as_str().unwrap_or_default() {
            "get_tree" => ok(req, json!({ "widgets": [] })),
            "exists" => ok(req, json!({ "exists": widgets.contains_key(&target), "target": target })),
            "type" => match widgets.get_mut(&target) {
                Some(w) => {
                    w["text"] = params["text"].clone();
                    ok(req, json!({ "typed": true }))
                }
                None => fail(req, "ELEMENT_NOT_FOUND", &format!("No widget {target}")),
            },
            "click" if target == "@name:submit" => {
                let user = widgets["@name:user"]["text"].clone();
                widgets.get_mut("@name:status").unwrap()["text"] = json!(format!("Welcome {}", user.as_str().unwrap_or("")));
                ok(req, json!({ "clicked": true }))
            }
            "get_property" => {
                let prop = params["property"].as_str().unwrap_or_default();
                match widgets.get(&target) {
                    Some(w) => ok(req, json!({ "value": w[prop] })),
                    None => fail(req, "ELEMENT_NOT_FOUND", "no widget"),
                }
            }
            "find" => {
                let matches: Vec<&String> = widgets.keys().collect();
                ok(req, json!({ "matches": matches, "count": matches.len() }))
            }
            "assert" => {
                let prop = params["property"].as_str().unwrap_or_default();
                let actual = widgets.get(&target).map(|w| w[prop].clone()).unwrap_or(Value::Null);
                ok(
                    req,
                    json!({
                        "passed": actual == params["value"],
                        "property": prop,
                        "operator": params["operator"],
                        "expected": params["value"],
                        "actual": actual
                    }),
                )
            }
            _ => fail(req, "INVALID_COMMAND", "unknown command"),
        };
        vec![frame]
    })
    .await
}

fn write_suite(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_json_suite_end_to_end() {
    let server = fake_app().await;
    let client = WidgeteerClient::with_url(server.url());
    assert!(wait_for_server(&client, Duration::from_secs(2), Duration::from_millis(50)).await);

    let suite = write_suite(
        ".json",
        r##"{
            "name": "Login",
            "setup": [ { "command": "exists", "params": { "target": "#submit" } } ],
            "tests": [
                {
                    "name": "welcome message",
                    "steps": [
                        { "command": "type", "params": { "target": "#user", "text": "alice" } },
                        { "command": "click", "params": { "target": "#submit" }, "delay_ms": 5 },
                        { "command": "get_property",
                          "params": { "target": "#status", "property": "text" },
                          "expect": { "value_contains": "alice" } }
                    ],
                    "assertions": [
                        { "target": "#status", "property": "text", "value": "Welcome alice" }
                    ]
                },
                {
                    "name": "missing widget",
                    "steps": [
                        { "command": "exists", "params": { "target": "#nope" } },
                        { "command": "click", "params": { "target": "#submit" } }
                    ]
                },
                {
                    "name": "enough widgets",
                    "steps": [ { "command": "find", "params": { "query": "*" }, "expect": { "count_min": 3 } } ]
                },
                {
                    "name": "wrong assertion",
                    "assertions": [
                        { "target": "#submit", "property": "text", "operator": "==", "value": "Log in" }
                    ]
                }
            ],
            "teardown": [ { "command": "explode" } ]
        }"##,
    );

    let result = TestExecutor::new(&client, false)
        .run_file(suite.path())
        .await
        .unwrap();

    assert_eq!(result.name, "Login");
    assert_eq!(result.total(), 4);
    assert_eq!(result.passed(), 2);

    let welcome = &result.results[0];
    assert!(welcome.passed, "{:?}", welcome.error);
    assert_eq!(welcome.steps_completed, 3);

    let missing = &result.results[1];
    assert_eq!(
        missing.error.as_deref(),
        Some("Step 1 failed: exists returned false for target #nope")
    );
    assert_eq!(missing.steps_completed, 0);
    assert_eq!(missing.steps_total, 2);

    assert!(result.results[2].passed);
    assert_eq!(
        result.results[3].error.as_deref(),
        Some("Assertion failed: Expected text == Log in, got Sign in")
    );

    // Teardown ran even though it fails
    assert_eq!(server.commands_named("explode").len(), 1);
    client.disconnect().await;
}

#[tokio::test]
async fn test_yaml_suite_setup_failure() {
    let server = fake_app().await;
    let client = WidgeteerClient::with_url(server.url());
    client.connect().await.unwrap();

    let suite = write_suite(
        ".yml",
        r##"
name: Broken setup
setup:
  - command: exists
    params: { target: "#user" }
  - command: type
    params: { target: "#ghost", text: "x" }
  - command: exists
    params: { target: "#submit" }
tests:
  - name: never runs
    steps:
      - command: click
        params: { target: "#submit" }
"##,
    );

    let result = TestExecutor::new(&client, false)
        .run_file(suite.path())
        .await
        .unwrap();

    assert_eq!(result.total(), 1);
    let setup = &result.results[0];
    assert_eq!(setup.name, SETUP_RESULT_NAME);
    assert_eq!(setup.steps_completed, 1);
    assert_eq!(setup.steps_total, 3);
    assert!(server.commands_named("click").is_empty());
}

#[tokio::test]
async fn test_unreachable_server_fails_every_step_cleanly() {
    let client = WidgeteerClient::with_url("ws://127.0.0.1:1");
    let suite = write_suite(
        ".json",
        r##"{ "tests": [ { "name": "t", "steps": [ { "command": "focus", "params": { "target": "#a" } } ] } ] }"##,
    );

    let result = TestExecutor::new(&client, false)
        .run_file(suite.path())
        .await
        .unwrap();
    assert_eq!(result.failed(), 1);
    assert!(result.results[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Step 1 failed: Not connected"));
}
