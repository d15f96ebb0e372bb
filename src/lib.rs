//! Widgeteer client - remote control and test harness for GUI applications
//!
//! This library talks to an application's Widgeteer automation server over
//! WebSocket and runs declarative test suites against it.

pub mod cli;
pub mod client;
pub mod commands;
pub mod common;
pub mod testing;

// Re-export commonly used types for tests
pub use client::{BlockingClient, CommandRequest, Response, WidgeteerClient};
pub use common::{Error, Result};
