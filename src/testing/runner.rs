//! Test executor
//!
//! Runs suites through any [`CommandSink`], so the same executor drives a
//! live server or a scripted stand-in.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::{Duration, Instant};

use colored::Colorize;
use futures_util::FutureExt;
use serde_json::{Map, Value};

use crate::client::response::Response;
use crate::client::CommandSink;
use crate::common::Result;

use super::config::{Assertion, TestCase, TestStep, TestSuite};
use super::expect::{check_step_result, display, Check};

/// Name of the synthetic result recorded when setup fails
pub const SETUP_RESULT_NAME: &str = "__setup__";

/// Result of a single test
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub duration_ms: f64,
    pub error: Option<String>,
    /// Steps that passed before the first failure
    pub steps_completed: usize,
    pub steps_total: usize,
}

/// Results of a suite run, in execution order
#[derive(Debug, Clone, PartialEq)]
pub struct TestSuiteResult {
    pub name: String,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// True when nothing failed
    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

/// Executes steps, assertions, tests and suites against a command sink
pub struct TestExecutor<'a, C: CommandSink + ?Sized> {
    client: &'a C,
    verbose: bool,
}

impl<'a, C: CommandSink + ?Sized> TestExecutor<'a, C> {
    pub fn new(client: &'a C, verbose: bool) -> Self {
        Self { client, verbose }
    }

    fn log(&self, message: &str) {
        if self.verbose {
            println!("  {}", message.dimmed());
        }
    }

    /// Send the step's command
    pub async fn execute_step(&self, step: &TestStep) -> Response {
        let shown = match step.target() {
            Some(target) => target.to_string(),
            None => Value::Object(step.params.clone()).to_string(),
        };
        self.log(&format!("  -> {}: {}", step.command, shown));
        tracing::debug!("Executing step '{}' with {:?}", step.command, step.params);

        self.client.command(&step.command, step.params.clone()).await
    }

    /// Run one step and validate it; the error is the failure reason
    async fn run_step(&self, step: &TestStep) -> Check {
        let resp = self.execute_step(step).await;
        if !resp.success {
            return Err(resp
                .error
                .unwrap_or_else(|| "command failed without an error message".to_string()));
        }
        check_step_result(step, &resp)
    }

    /// Check a property assertion on the server
    ///
    /// The pass flag and actual value are read from the top level of the
    /// response data. Older servers nest them under `result`; that shape is
    /// still accepted.
    pub async fn check_assertion(&self, assertion: &Assertion) -> Check {
        let resp = self
            .client
            .assert_property(
                &assertion.target,
                &assertion.property,
                &assertion.operator,
                assertion.value.clone(),
            )
            .await;

        if !resp.success {
            return Err(resp
                .error
                .unwrap_or_else(|| "assert command failed".to_string()));
        }

        let outcome = assertion_payload(&resp.data);
        let passed = outcome.get("passed").and_then(Value::as_bool).unwrap_or(false);
        if passed {
            return Ok(());
        }

        Err(format!(
            "Expected {} {} {}, got {}",
            assertion.property,
            assertion.operator,
            display(&assertion.value),
            display(outcome.get("actual").unwrap_or(&Value::Null))
        ))
    }

    /// Run a test's steps, then its assertions, stopping at the first failure
    pub async fn run_test(&self, test: &TestCase) -> TestResult {
        let start = Instant::now();
        let mut steps_completed = 0;
        let mut error = None;

        self.log(&format!("Running test: {}", test.name));

        for (i, step) in test.steps.iter().enumerate() {
            if let Err(reason) = self.run_step(step).await {
                error = Some(format!("Step {} failed: {}", i + 1, reason));
                break;
            }
            steps_completed += 1;

            if let Some(delay) = step.delay_ms.filter(|d| *d > 0) {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        if error.is_none() {
            for assertion in &test.assertions {
                if let Err(reason) = self.check_assertion(assertion).await {
                    error = Some(format!("Assertion failed: {}", reason));
                    break;
                }
            }
        }

        TestResult {
            name: test.name.clone(),
            passed: error.is_none(),
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            error,
            steps_completed,
            steps_total: test.steps.len(),
        }
    }

    /// Run setup, every test, then teardown
    ///
    /// A failing setup step stops the suite before any test runs and is
    /// reported as a single failed result named [`SETUP_RESULT_NAME`].
    pub async fn run_suite(&self, suite: &TestSuite) -> TestSuiteResult {
        let mut result = TestSuiteResult::new(&suite.name);

        println!("\n{}", "=".repeat(60));
        println!("{} {}", "Test Suite:".blue().bold(), suite.name.white().bold());
        println!("{}", "=".repeat(60));

        if !suite.setup.is_empty() {
            self.log("Running setup...");
            for (i, step) in suite.setup.iter().enumerate() {
                let outcome = AssertUnwindSafe(self.run_step(step))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err("step aborted by a panic".to_string()));
                if let Err(reason) = outcome {
                    println!("  {} Setup failed (step {}): {}", "✗".red(), i + 1, reason);
                    result.results.push(TestResult {
                        name: SETUP_RESULT_NAME.to_string(),
                        passed: false,
                        duration_ms: 0.0,
                        error: Some(format!("Setup step {} failed: {}", i + 1, reason)),
                        steps_completed: i,
                        steps_total: suite.setup.len(),
                    });
                    return result;
                }
            }
        }

        for test in &suite.tests {
            let test_result = match AssertUnwindSafe(self.run_test(test)).catch_unwind().await {
                Ok(test_result) => test_result,
                Err(_) => TestResult {
                    name: test.name.clone(),
                    passed: false,
                    duration_ms: 0.0,
                    error: Some("test aborted by a panic".to_string()),
                    steps_completed: 0,
                    steps_total: test.steps.len(),
                },
            };
            report(&test_result);
            result.results.push(test_result);
        }

        if !suite.teardown.is_empty() {
            self.log("Running teardown...");
            for (i, step) in suite.teardown.iter().enumerate() {
                let resp = match AssertUnwindSafe(self.execute_step(step)).catch_unwind().await {
                    Ok(resp) => resp,
                    Err(_) => {
                        tracing::warn!("Teardown step {} ({}) panicked", i + 1, step.command);
                        continue;
                    }
                };
                if !resp.success {
                    tracing::warn!(
                        "Teardown step {} ({}) failed: {}",
                        i + 1,
                        step.command,
                        resp.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }

        result
    }

    /// Load a suite document and run it
    pub async fn run_file(&self, path: &Path) -> Result<TestSuiteResult> {
        let suite = TestSuite::load(path)?;
        Ok(self.run_suite(&suite).await)
    }
}

/// Names of the tests in a suite document
pub fn list_tests(path: &Path) -> Result<Vec<String>> {
    let suite = TestSuite::load(path)?;
    Ok(suite.test_names().into_iter().map(str::to_string).collect())
}

/// Print the pass/fail summary for a suite run
pub fn print_summary(result: &TestSuiteResult) {
    println!("\n{}", "=".repeat(60));
    let line = format!("Results: {}/{} passed", result.passed(), result.total());
    if result.success() {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.red().bold());
    }
    println!("{}", "=".repeat(60));
}

fn report(result: &TestResult) {
    let status = if result.passed {
        "✓ PASS".green().bold()
    } else {
        "✗ FAIL".red().bold()
    };
    println!("  {} {} ({:.1}ms)", status, result.name, result.duration_ms);
    if let Some(error) = &result.error {
        println!("       {} {}", "Error:".red(), error);
    }
}

fn assertion_payload(data: &Map<String, Value>) -> &Map<String, Value> {
    if data.contains_key("passed") {
        return data;
    }
    match data.get("result") {
        Some(Value::Object(nested)) => {
            tracing::debug!("Assertion response uses the nested 'result' shape");
            nested
        }
        _ => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::protocol::Params;
    use crate::common::Error;
    use crate::testing::DocumentFormat;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a script; succeeds with empty data once the script runs out
    struct ScriptedSink {
        replies: Mutex<VecDeque<Response>>,
        calls: Mutex<Vec<(String, Params)>>,
    }

    impl ScriptedSink {
        fn new(replies: Vec<Response>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn commands(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }
    }

    /// Succeeds for everything except one command, which panics
    struct PanickingSink {
        panics_on: &'static str,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandSink for PanickingSink {
        async fn command(&self, name: &str, _params: Params) -> Response {
            self.calls.lock().unwrap().push(name.to_string());
            if name == self.panics_on {
                panic!("sink failure on {name}");
            }
            ok(json!({}))
        }
    }

    #[async_trait]
    impl CommandSink for ScriptedSink {
        async fn command(&self, name: &str, params: Params) -> Response {
            self.calls.lock().unwrap().push((name.to_string(), params));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ok(json!({})))
        }
    }

    fn ok(data: Value) -> Response {
        Response::from_raw(&json!({ "success": true, "result": data }))
    }

    fn failed(message: &str) -> Response {
        Response::from_raw(&json!({
            "success": false,
            "error": { "code": "ELEMENT_NOT_FOUND", "message": message }
        }))
    }

    fn steps(commands: &[&str]) -> Vec<TestStep> {
        commands
            .iter()
            .map(|c| TestStep::new(c, Params::new()))
            .collect()
    }

    fn test_case(name: &str, commands: &[&str]) -> TestCase {
        TestCase {
            name: name.to_string(),
            steps: steps(commands),
            assertions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_run_test_stops_at_first_failing_step() {
        let sink = ScriptedSink::new(vec![
            ok(json!({ "clicked": true })),
            ok(json!({ "clicked": true })),
            failed("no widget"),
            ok(json!({ "clicked": true })),
        ]);
        let executor = TestExecutor::new(&sink, false);

        let result = executor
            .run_test(&test_case("t", &["click", "click", "click", "click"]))
            .await;
        assert!(!result.passed);
        assert_eq!(result.steps_completed, 2);
        assert_eq!(result.steps_total, 4);
        assert_eq!(result.error.as_deref(), Some("Step 3 failed: no widget"));
        assert_eq!(sink.commands().len(), 3);
    }

    #[tokio::test]
    async fn test_validation_failure_fails_step() {
        let sink = ScriptedSink::new(vec![ok(json!({ "exists": false }))]);
        let executor = TestExecutor::new(&sink, false);
        let mut test = test_case("t", &["exists"]);
        test.steps[0].params.insert("target".into(), json!("@name:gone"));

        let result = executor.run_test(&test).await;
        assert_eq!(
            result.error.as_deref(),
            Some("Step 1 failed: exists returned false for target @name:gone")
        );
        assert_eq!(result.steps_completed, 0);
    }

    #[tokio::test]
    async fn test_assertions_run_after_steps() {
        let sink = ScriptedSink::new(vec![
            ok(json!({ "typed": true })),
            ok(json!({ "passed": true, "actual": "abc" })),
            ok(json!({ "passed": false, "actual": 1 })),
            ok(json!({ "passed": true })),
        ]);
        let executor = TestExecutor::new(&sink, false);
        let mut test = test_case("t", &["type"]);
        for (property, value) in [("text", json!("abc")), ("count", json!(2)), ("x", json!(0))] {
            test.assertions.push(Assertion {
                target: "#field".to_string(),
                property: property.to_string(),
                operator: "==".to_string(),
                value,
            });
        }

        let result = executor.run_test(&test).await;
        assert_eq!(result.steps_completed, 1);
        assert_eq!(
            result.error.as_deref(),
            Some("Assertion failed: Expected count == 2, got 1")
        );
        assert_eq!(sink.commands(), ["type", "assert", "assert"]);
    }

    #[tokio::test]
    async fn test_assertion_accepts_nested_result_shape() {
        let sink = ScriptedSink::new(vec![
            ok(json!({ "result": { "passed": true } })),
            ok(json!({ "result": { "passed": false, "actual": "Cancel" } })),
        ]);
        let executor = TestExecutor::new(&sink, false);
        let assertion = Assertion {
            target: "#btn".to_string(),
            property: "text".to_string(),
            operator: "==".to_string(),
            value: json!("OK"),
        };

        assert!(executor.check_assertion(&assertion).await.is_ok());
        assert_eq!(
            executor.check_assertion(&assertion).await.unwrap_err(),
            "Expected text == OK, got Cancel"
        );
    }

    #[tokio::test]
    async fn test_assertion_transport_error_is_verbatim() {
        let sink = ScriptedSink::new(vec![Response::from_error(&Error::NotConnected)]);
        let executor = TestExecutor::new(&sink, false);
        let assertion = Assertion {
            target: "#btn".to_string(),
            property: "text".to_string(),
            operator: "==".to_string(),
            value: json!("OK"),
        };
        assert_eq!(
            executor.check_assertion(&assertion).await.unwrap_err(),
            Error::NotConnected.to_string()
        );
    }

    #[tokio::test]
    async fn test_setup_failure_aborts_suite() {
        let sink = ScriptedSink::new(vec![ok(json!({})), failed("setup broke")]);
        let executor = TestExecutor::new(&sink, false);
        let suite = TestSuite {
            name: "s".to_string(),
            setup: steps(&["focus", "click", "focus"]),
            teardown: steps(&["click"]),
            tests: vec![test_case("never", &["click"])],
        };

        let result = executor.run_suite(&suite).await;
        assert_eq!(result.total(), 1);
        let setup = &result.results[0];
        assert_eq!(setup.name, SETUP_RESULT_NAME);
        assert!(!setup.passed);
        assert_eq!(setup.steps_completed, 1);
        assert_eq!(setup.steps_total, 3);
        assert!(setup.error.as_deref().unwrap().contains("step 2"));
        assert_eq!(sink.commands(), ["focus", "click"]);
    }

    #[tokio::test]
    async fn test_suite_continues_after_failed_test_and_runs_teardown() {
        let sink = ScriptedSink::new(vec![
            failed("first test broke"),
            ok(json!({ "clicked": true })),
            failed("teardown broke"),
        ]);
        let executor = TestExecutor::new(&sink, false);
        let suite = TestSuite {
            name: "s".to_string(),
            setup: Vec::new(),
            teardown: steps(&["close", "focus"]),
            tests: vec![test_case("a", &["click"]), test_case("b", &["click"])],
        };

        let result = executor.run_suite(&suite).await;
        assert_eq!(result.total(), 2);
        assert_eq!(result.passed(), 1);
        assert_eq!(result.failed(), 1);
        assert!(!result.success());
        assert_eq!(sink.commands(), ["click", "click", "close", "focus"]);
    }

    #[tokio::test]
    async fn test_delay_between_steps() {
        let sink = ScriptedSink::new(Vec::new());
        let executor = TestExecutor::new(&sink, false);
        let mut test = test_case("t", &["click", "click"]);
        test.steps[0].delay_ms = Some(30);

        let result = executor.run_test(&test).await;
        assert!(result.passed);
        assert!(result.duration_ms >= 30.0);
    }

    #[tokio::test]
    async fn test_run_file_and_list_tests() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"name: File suite\ntests:\n  - name: one\n    steps:\n      - command: focus\n  - name: two\n",
        )
        .unwrap();

        assert_eq!(list_tests(file.path()).unwrap(), ["one", "two"]);

        let sink = ScriptedSink::new(Vec::new());
        let result = TestExecutor::new(&sink, false)
            .run_file(file.path())
            .await
            .unwrap();
        assert_eq!(result.name, "File suite");
        assert_eq!(result.passed(), 2);
    }

    #[tokio::test]
    async fn test_panicking_teardown_keeps_results() {
        let sink = PanickingSink {
            panics_on: "close",
            calls: Mutex::new(Vec::new()),
        };
        let executor = TestExecutor::new(&sink, false);
        let suite = TestSuite {
            name: "s".to_string(),
            setup: Vec::new(),
            teardown: steps(&["close", "focus"]),
            tests: vec![test_case("a", &["click"])],
        };

        let result = executor.run_suite(&suite).await;
        assert_eq!(result.total(), 1);
        assert!(result.success());
        assert_eq!(*sink.calls.lock().unwrap(), ["click", "close", "focus"]);
    }

    #[tokio::test]
    async fn test_panicking_setup_is_recorded() {
        let sink = PanickingSink {
            panics_on: "focus",
            calls: Mutex::new(Vec::new()),
        };
        let executor = TestExecutor::new(&sink, false);
        let suite = TestSuite {
            name: "s".to_string(),
            setup: steps(&["click", "focus"]),
            teardown: Vec::new(),
            tests: vec![test_case("never", &["click"])],
        };

        let result = executor.run_suite(&suite).await;
        assert_eq!(result.total(), 1);
        let setup = &result.results[0];
        assert_eq!(setup.name, SETUP_RESULT_NAME);
        assert_eq!(setup.steps_completed, 1);
        assert_eq!(
            setup.error.as_deref(),
            Some("Setup step 2 failed: step aborted by a panic")
        );
        assert_eq!(*sink.calls.lock().unwrap(), ["click", "focus"]);
    }

    #[tokio::test]
    async fn test_malformed_count_min_fails_only_its_test() {
        let suite = TestSuite::parse(
            r##"{
                "tests": [
                    { "name": "first", "steps": [ { "command": "find" } ] },
                    { "name": "bad", "steps": [ { "command": "find", "expect": { "count_min": "two" } } ] },
                    { "name": "last", "steps": [ { "command": "find", "expect": { "count_min": 1 } } ] }
                ]
            }"##,
            DocumentFormat::Json,
        )
        .unwrap();
        let sink = ScriptedSink::new(vec![
            ok(json!({ "count": 0 })),
            ok(json!({ "count": 4 })),
            ok(json!({ "count": 2 })),
        ]);

        let result = TestExecutor::new(&sink, false).run_suite(&suite).await;
        assert_eq!(result.total(), 3);
        assert_eq!(result.passed(), 2);
        assert_eq!(
            result.results[1].error.as_deref(),
            Some("Step 1 failed: expect.count_min must be an integer, got \"two\"")
        );
    }
}
