//! Widgeteer protocol client
//!
//! [`WidgeteerClient`] is the async entry point; [`BlockingClient`] wraps it
//! for synchronous callers.

pub mod blocking;
#[allow(clippy::module_inception)]
pub mod client;
pub mod connection;
pub mod events;
pub mod options;
pub mod pending;
pub mod protocol;
pub mod response;
pub mod selector;

pub use blocking::BlockingClient;
pub use client::{CommandList, CommandRequest, CommandSink, WidgeteerClient};
pub use events::EventHandler;
pub use options::*;
pub use protocol::Params;
pub use response::{Event, Response};
pub use selector::normalize;
