//! Declarative test runner
//!
//! Reads JSON or YAML suite documents and executes them through the
//! command façade, validating responses against structured data.

mod config;
mod expect;
mod runner;

pub use config::*;
pub use expect::{check_expectation, check_step_result, Check};
pub use runner::{list_tests, print_summary, TestExecutor, TestResult, TestSuiteResult, SETUP_RESULT_NAME};
