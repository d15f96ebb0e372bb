//! Async command façade over a Widgeteer connection
//!
//! Every operation returns a [`Response`]. Transport failures (not
//! connected, timeout, lost socket) are folded into a failed response with
//! an `error_code`, so callers handle one shape. Use
//! [`Response::raise_for_error`] to turn failures into `Err`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::common::config::{Config, ServerConfig};
use crate::common::Result;

use super::connection::Connection;
use super::events::EventHandler;
use super::options::{
    ClickOptions, DragOptions, FindOptions, KeyOptions, Point, ScreenshotOptions, ScrollOptions,
    TreeOptions, TypeOptions, WaitOptions,
};
use super::protocol::{Message, MessageKind, Params, TransactionStep, BUILTIN_COMMANDS};
use super::response::Response;
use super::selector::normalize_params;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// A fully specified command
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub params: Params,
    pub options: Option<Params>,
    /// Caller-chosen request id; generated when `None`
    pub id: Option<String>,
    /// Overrides the client's command timeout
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    pub fn new(command: &str, params: Params) -> Self {
        Self {
            command: command.to_string(),
            params,
            options: None,
            id: None,
            timeout: None,
        }
    }

    pub fn with_options(mut self, options: Params) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_message(self) -> Message {
        Message::command(&self.command, normalize_params(&self.params))
            .with_options(self.options)
            .with_id(self.id)
    }
}

/// Built-in and server-registered command names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    pub builtin: Vec<String>,
    pub custom: Vec<String>,
}

/// Anything that can execute a named command
///
/// The test executor only depends on this, so it can run against a live
/// client or a scripted stand-in.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn command(&self, name: &str, params: Params) -> Response;

    /// Server-side property assertion
    async fn assert_property(
        &self,
        target: &str,
        property: &str,
        operator: &str,
        value: Value,
    ) -> Response {
        self.command(
            "assert",
            params(json!({
                "target": target,
                "property": property,
                "operator": operator,
                "value": value,
            })),
        )
        .await
    }
}

/// Async client for a Widgeteer server
#[derive(Debug)]
pub struct WidgeteerClient {
    connection: Connection,
    command_timeout: Duration,
    transaction_timeout: Duration,
}

impl WidgeteerClient {
    /// Client for a server; nothing is opened until [`connect`](Self::connect)
    pub fn new(server: &ServerConfig) -> Self {
        Self::with_url(server.url())
    }

    /// Client for an explicit `ws://` URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            connection: Connection::new(url),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }

    /// Client using both the server and timeout sections of a config
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.server)
            .with_timeouts(config.timeouts.command(), config.timeouts.transaction())
    }

    pub fn with_timeouts(mut self, command: Duration, transaction: Duration) -> Self {
        self.command_timeout = command;
        self.transaction_timeout = transaction;
        self
    }

    pub fn url(&self) -> &str {
        self.connection.url()
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn transaction_timeout(&self) -> Duration {
        self.transaction_timeout
    }

    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Execute a single command with the default timeout
    pub async fn command(&self, name: &str, params: Params) -> Response {
        self.send(CommandRequest::new(name, params)).await
    }

    /// Execute a fully specified command
    ///
    /// Selector-bearing params are normalized before sending.
    pub async fn send(&self, request: CommandRequest) -> Response {
        let timeout = request.timeout.unwrap_or(self.command_timeout);
        self.request(request.into_message(), timeout).await
    }

    async fn request(&self, message: Message, timeout: Duration) -> Response {
        match self.connection.send_and_wait(message, timeout).await {
            Ok(raw) => Response::from_raw(&raw),
            Err(e) => {
                tracing::debug!("Request failed: {}", e);
                Response::from_error(&e)
            }
        }
    }

    // ========== Batch & Transaction ==========

    /// Send several commands at once and collect their responses in order
    pub async fn batch(&self, commands: Vec<CommandRequest>) -> Vec<Response> {
        let timeout = commands
            .iter()
            .filter_map(|c| c.timeout)
            .max()
            .unwrap_or(self.command_timeout);
        let count = commands.len();
        let messages: Vec<Message> = commands.into_iter().map(CommandRequest::into_message).collect();

        match self.connection.send_batch(messages, timeout).await {
            Ok(results) => results
                .into_iter()
                .map(|result| match result {
                    Ok(raw) => Response::from_raw(&raw),
                    Err(e) => Response::from_error(&e),
                })
                .collect(),
            Err(e) => {
                tracing::debug!("Batch failed: {}", e);
                vec![Response::from_error(&e); count]
            }
        }
    }

    /// Shorthand for [`batch`](Self::batch) over `(name, params)` pairs
    pub async fn batch_commands(&self, commands: &[(&str, Params)]) -> Vec<Response> {
        let requests = commands
            .iter()
            .map(|(name, params)| CommandRequest::new(name, params.clone()))
            .collect();
        self.batch(requests).await
    }

    /// Run steps atomically on the server with the default transaction timeout
    pub async fn transaction(
        &self,
        steps: Vec<CommandRequest>,
        rollback_on_failure: bool,
    ) -> Response {
        self.transaction_with_timeout(steps, rollback_on_failure, self.transaction_timeout)
            .await
    }

    /// Run steps atomically on the server
    ///
    /// Steps without an id are numbered `step-0`, `step-1`, ...
    pub async fn transaction_with_timeout(
        &self,
        steps: Vec<CommandRequest>,
        rollback_on_failure: bool,
        timeout: Duration,
    ) -> Response {
        let steps_sent = steps.len();
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| TransactionStep {
                id: step.id.unwrap_or_else(|| format!("step-{i}")),
                command: step.command,
                params: normalize_params(&step.params),
            })
            .collect();

        let message = Message::new(MessageKind::Transaction {
            rollback_on_failure,
            steps,
        });
        match self.connection.send_and_wait(message, timeout).await {
            Ok(raw) => Response::from_transaction(&raw, steps_sent),
            Err(e) => Response::from_error(&e),
        }
    }

    // ========== Events & Recording ==========

    /// Register a handler and ask the server to push this event type
    pub async fn subscribe(&self, event_type: &str, handler: EventHandler) -> Response {
        self.connection.events().add(event_type, handler);
        let message = Message::new(MessageKind::Subscribe {
            event_type: event_type.to_string(),
        });
        self.request(message, self.command_timeout).await
    }

    /// Drop handlers for one event type (or all) and tell the server
    pub async fn unsubscribe(&self, event_type: Option<&str>) -> Response {
        self.connection.events().remove(event_type);
        let message = Message::new(MessageKind::Unsubscribe {
            event_type: event_type.map(str::to_string),
        });
        self.request(message, self.command_timeout).await
    }

    pub async fn start_recording(&self) -> Response {
        self.request(Message::new(MessageKind::RecordStart), self.command_timeout)
            .await
    }

    /// Stop recording; the recorded actions are in the response data
    pub async fn stop_recording(&self) -> Response {
        self.request(Message::new(MessageKind::RecordStop), self.command_timeout)
            .await
    }

    // ========== Introspection ==========

    /// Widget tree; unset options are left to the server
    pub async fn tree(&self, options: &TreeOptions) -> Response {
        let mut p = Params::new();
        if let Some(root) = &options.root {
            p.insert("root".into(), json!(root));
        }
        if let Some(depth) = options.depth {
            p.insert("depth".into(), json!(depth));
        }
        if options.include_invisible {
            p.insert("include_invisible".into(), json!(true));
        }
        self.command("get_tree", p).await
    }

    pub async fn find(&self, query: &str, options: &FindOptions) -> Response {
        self.command(
            "find",
            params(json!({
                "query": query,
                "max_results": options.max_results,
                "visible_only": options.visible_only,
            })),
        )
        .await
    }

    pub async fn describe(&self, target: &str) -> Response {
        self.command("describe", target_params(target)).await
    }

    pub async fn get_property(&self, target: &str, property: &str) -> Response {
        self.command(
            "get_property",
            params(json!({ "target": target, "property": property })),
        )
        .await
    }

    pub async fn list_properties(&self, target: &str) -> Response {
        self.command("list_properties", target_params(target)).await
    }

    pub async fn get_actions(&self, target: &str) -> Response {
        self.command("get_actions", target_params(target)).await
    }

    // ========== Actions ==========

    pub async fn click(&self, target: &str, options: &ClickOptions) -> Response {
        let mut p = target_params(target);
        p.insert("button".into(), json!(options.button.as_str()));
        insert_pos(&mut p, "pos", options.pos);
        let mut request = CommandRequest::new("click", p);
        if options.track_changes {
            request = request.with_options(params(json!({ "track_changes": true })));
        }
        self.send(request).await
    }

    pub async fn double_click(&self, target: &str, pos: Option<Point>) -> Response {
        let mut p = target_params(target);
        insert_pos(&mut p, "pos", pos);
        self.command("double_click", p).await
    }

    pub async fn right_click(&self, target: &str, pos: Option<Point>) -> Response {
        let mut p = target_params(target);
        insert_pos(&mut p, "pos", pos);
        self.command("right_click", p).await
    }

    /// Enter text into an input widget
    pub async fn input_text(&self, target: &str, text: &str, options: &TypeOptions) -> Response {
        self.command(
            "type",
            params(json!({
                "target": target,
                "text": text,
                "clear_first": options.clear_first,
            })),
        )
        .await
    }

    /// Alias for [`input_text`](Self::input_text)
    pub async fn type_text(&self, target: &str, text: &str, options: &TypeOptions) -> Response {
        self.input_text(target, text, options).await
    }

    pub async fn key(&self, target: &str, key: &str, options: &KeyOptions) -> Response {
        let mut p = params(json!({ "target": target, "key": key }));
        if !options.modifiers.is_empty() {
            p.insert("modifiers".into(), json!(options.modifiers));
        }
        self.command("key", p).await
    }

    /// Press a sequence such as `Ctrl+Shift+S`
    pub async fn key_sequence(&self, target: &str, sequence: &str) -> Response {
        self.command(
            "key_sequence",
            params(json!({ "target": target, "sequence": sequence })),
        )
        .await
    }

    pub async fn drag(&self, from: &str, to: &str, options: &DragOptions) -> Response {
        let mut p = params(json!({ "from": from, "to": to }));
        insert_pos(&mut p, "from_pos", options.from_pos);
        insert_pos(&mut p, "to_pos", options.to_pos);
        self.command("drag", p).await
    }

    pub async fn scroll(&self, target: &str, options: &ScrollOptions) -> Response {
        self.command(
            "scroll",
            params(json!({
                "target": target,
                "delta_x": options.delta_x,
                "delta_y": options.delta_y,
            })),
        )
        .await
    }

    pub async fn hover(&self, target: &str, pos: Option<Point>) -> Response {
        let mut p = target_params(target);
        insert_pos(&mut p, "pos", pos);
        self.command("hover", p).await
    }

    pub async fn focus(&self, target: &str) -> Response {
        self.command("focus", target_params(target)).await
    }

    // ========== State ==========

    pub async fn set_property(&self, target: &str, property: &str, value: Value) -> Response {
        self.command(
            "set_property",
            params(json!({ "target": target, "property": property, "value": value })),
        )
        .await
    }

    /// Widget-aware value setter (line edits, spin boxes, combo boxes, ...)
    pub async fn set_value(&self, target: &str, value: Value) -> Response {
        self.command("set_value", params(json!({ "target": target, "value": value })))
            .await
    }

    /// Invoke a slot on a widget
    pub async fn invoke(&self, target: &str, method: &str) -> Response {
        self.command("invoke", params(json!({ "target": target, "method": method })))
            .await
    }

    // ========== Verification ==========

    /// Capture a screenshot; unset options are left to the server
    pub async fn screenshot(&self, options: &ScreenshotOptions) -> Response {
        let mut p = Params::new();
        if let Some(target) = &options.target {
            p.insert("target".into(), json!(target));
        }
        if let Some(format) = &options.format {
            p.insert("format".into(), json!(format));
        }
        self.command("screenshot", p).await
    }

    pub async fn exists(&self, target: &str) -> Response {
        self.command("exists", target_params(target)).await
    }

    pub async fn is_visible(&self, target: &str) -> Response {
        self.command("is_visible", target_params(target)).await
    }

    // ========== Synchronization ==========

    pub async fn wait(&self, target: &str, options: &WaitOptions) -> Response {
        self.command(
            "wait",
            params(json!({
                "target": target,
                "condition": options.condition,
                "timeout_ms": options.timeout_ms,
            })),
        )
        .await
    }

    /// Wait until the application's event queue drains
    pub async fn wait_idle(&self, timeout_ms: u64) -> Response {
        self.command("wait_idle", params(json!({ "timeout_ms": timeout_ms })))
            .await
    }

    pub async fn wait_signal(&self, target: &str, signal: &str, timeout_ms: u64) -> Response {
        self.command(
            "wait_signal",
            params(json!({ "target": target, "signal": signal, "timeout_ms": timeout_ms })),
        )
        .await
    }

    /// Server-side delay
    pub async fn sleep(&self, ms: u64) -> Response {
        self.command("sleep", params(json!({ "ms": ms }))).await
    }

    // ========== Extensibility ==========

    /// Call an invokable method on a registered service object
    pub async fn call_service(&self, service: &str, method: &str, args: Option<Vec<Value>>) -> Response {
        let mut p = params(json!({ "object": service, "method": method }));
        if let Some(args) = args {
            p.insert("args".into(), Value::Array(args));
        }
        self.command("call", p).await
    }

    /// Registered service objects and their methods
    pub async fn list_services(&self) -> Response {
        self.command("list_objects", Params::new()).await
    }

    pub async fn list_custom_commands(&self) -> Response {
        self.command("list_custom_commands", Params::new()).await
    }

    /// Built-in vocabulary plus whatever custom commands the server reports
    ///
    /// A failed custom-command query yields an empty custom list.
    pub async fn list_commands(&self) -> CommandList {
        let custom = self.list_custom_commands().await;
        let custom = if custom.success {
            custom
                .data
                .get("commands")
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        CommandList {
            builtin: BUILTIN_COMMANDS.iter().map(|c| c.to_string()).collect(),
            custom,
        }
    }

    /// Ask the application to exit
    pub async fn quit(&self) -> Response {
        self.command("quit", Params::new()).await
    }
}

#[async_trait]
impl CommandSink for WidgeteerClient {
    async fn command(&self, name: &str, params: Params) -> Response {
        WidgeteerClient::command(self, name, params).await
    }
}

/// Turn a `json!({...})` literal into params
pub(crate) fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

fn target_params(target: &str) -> Params {
    params(json!({ "target": target }))
}

fn insert_pos(p: &mut Params, key: &str, pos: Option<Point>) {
    if let Some(pos) = pos {
        p.insert(key.to_string(), json!({ "x": pos.x, "y": pos.y }));
    }
}
