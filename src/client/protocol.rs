//! Widgeteer wire protocol
//!
//! Every frame is a JSON object carried in a WebSocket text message.
//!
//! ```text
//! -> {"type":"command","id":"..","command":"click","params":{..},"options":{..}}
//! <- {"type":"response","id":"..","success":true,"result":{..},"duration_ms":3}
//! <- {"type":"response","id":"..","success":false,"error":{"code":"..","message":".."}}
//! <- {"type":"event","event_type":"..","data":{..}}
//! -> {"type":"subscribe"|"unsubscribe","id":"..","event_type":".."}
//! -> {"id":"..","transaction":true,"rollback_on_failure":true,"steps":[..]}
//! ```

use serde_json::{json, Map, Value};

use crate::common::{Error, Result};

use super::response::Event;

/// Command parameters (and options) are plain JSON objects
pub type Params = Map<String, Value>;

/// Error codes reported by the server in `error.code`
pub mod error_code {
    pub const ELEMENT_NOT_FOUND: &str = "ELEMENT_NOT_FOUND";
    pub const ELEMENT_NOT_VISIBLE: &str = "ELEMENT_NOT_VISIBLE";
    pub const ELEMENT_NOT_ENABLED: &str = "ELEMENT_NOT_ENABLED";
    pub const PROPERTY_NOT_FOUND: &str = "PROPERTY_NOT_FOUND";
    pub const PROPERTY_READ_ONLY: &str = "PROPERTY_READ_ONLY";
    pub const INVALID_SELECTOR: &str = "INVALID_SELECTOR";
    pub const INVALID_COMMAND: &str = "INVALID_COMMAND";
    pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const INVOCATION_FAILED: &str = "INVOCATION_FAILED";
    pub const SCREENSHOT_FAILED: &str = "SCREENSHOT_FAILED";
    pub const TRANSACTION_FAILED: &str = "TRANSACTION_FAILED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Built-in command vocabulary understood by every Widgeteer server
pub const BUILTIN_COMMANDS: &[&str] = &[
    // Introspection
    "get_tree",
    "find",
    "describe",
    "get_property",
    "list_properties",
    "get_actions",
    // Actions
    "click",
    "double_click",
    "right_click",
    "type",
    "key",
    "key_sequence",
    "drag",
    "scroll",
    "hover",
    "focus",
    // State
    "set_property",
    "set_value",
    "invoke",
    // Verification
    "screenshot",
    "assert",
    "exists",
    "is_visible",
    // Synchronization
    "wait",
    "wait_idle",
    "wait_signal",
    "sleep",
    // Extensibility
    "call",
    "list_objects",
    "list_custom_commands",
];

/// An outbound protocol message
///
/// The id is optional until the message is handed to the correlator, which
/// assigns a fresh one when the caller did not supply it.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Option<String>,
    pub kind: MessageKind,
}

/// What an outbound message asks the server to do
#[derive(Debug, Clone)]
pub enum MessageKind {
    Command {
        command: String,
        params: Params,
        options: Option<Params>,
    },
    Subscribe {
        event_type: String,
    },
    Unsubscribe {
        event_type: Option<String>,
    },
    RecordStart,
    RecordStop,
    Transaction {
        rollback_on_failure: bool,
        steps: Vec<TransactionStep>,
    },
}

/// One step of a server-side transaction
#[derive(Debug, Clone)]
pub struct TransactionStep {
    pub id: String,
    pub command: String,
    pub params: Params,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self { id: None, kind }
    }

    /// Build a command message
    pub fn command(command: &str, params: Params) -> Self {
        Self::new(MessageKind::Command {
            command: command.to_string(),
            params,
            options: None,
        })
    }

    /// Use a caller-chosen id instead of a generated one
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    /// Attach command options; empty options are dropped
    pub fn with_options(mut self, options: Option<Params>) -> Self {
        if let MessageKind::Command { options: slot, .. } = &mut self.kind {
            *slot = options.filter(|o| !o.is_empty());
        }
        self
    }

    /// Return the message id, generating and storing one if absent
    pub fn ensure_id(&mut self) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let id = new_request_id();
                self.id = Some(id.clone());
                id
            }
        }
    }

    /// Encode the message as its JSON wire form
    pub fn to_wire(&self) -> Value {
        let id = self.id.clone().unwrap_or_default();
        match &self.kind {
            MessageKind::Command {
                command,
                params,
                options,
            } => {
                let mut message = json!({
                    "type": "command",
                    "id": id,
                    "command": command,
                    "params": params,
                });
                if let Some(options) = options {
                    message["options"] = Value::Object(options.clone());
                }
                message
            }
            MessageKind::Subscribe { event_type } => json!({
                "type": "subscribe",
                "id": id,
                "event_type": event_type,
            }),
            MessageKind::Unsubscribe { event_type } => {
                let mut message = json!({
                    "type": "unsubscribe",
                    "id": id,
                });
                if let Some(event_type) = event_type {
                    message["event_type"] = Value::String(event_type.clone());
                }
                message
            }
            MessageKind::RecordStart => json!({ "type": "record_start", "id": id }),
            MessageKind::RecordStop => json!({ "type": "record_stop", "id": id }),
            MessageKind::Transaction {
                rollback_on_failure,
                steps,
            } => {
                let steps: Vec<Value> = steps
                    .iter()
                    .map(|step| {
                        json!({
                            "id": step.id,
                            "command": step.command,
                            "params": step.params,
                        })
                    })
                    .collect();
                json!({
                    "id": id,
                    "transaction": true,
                    "rollback_on_failure": rollback_on_failure,
                    "steps": steps,
                })
            }
        }
    }
}

/// Generate a fresh request id
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A decoded inbound frame
#[derive(Debug)]
pub enum Inbound {
    /// Reply to the request with this id; `body` is the whole frame
    Response { id: String, body: Value },
    /// Server-pushed event
    Event(Event),
    /// Anything else, kept for logging
    Unknown(String),
}

/// Decode and classify one inbound text frame
///
/// Frames without a `type` but with an `id` are treated as responses:
/// transaction replies are sent in that shape.
pub fn decode_inbound(frame: &str) -> Result<Inbound> {
    let msg: Value = serde_json::from_str(frame)?;
    let obj = msg
        .as_object()
        .ok_or_else(|| Error::Internal(format!("Expected a JSON object frame, got: {}", msg)))?;

    let msg_type = obj.get("type").and_then(|v| v.as_str());
    let id = obj.get("id").and_then(|v| v.as_str()).map(str::to_string);

    match (msg_type, id) {
        (Some("response"), Some(id)) | (None, Some(id)) => Ok(Inbound::Response { id, body: msg }),
        (Some("event"), _) => {
            let event_type = obj
                .get("event_type")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let data = match obj.get("data") {
                Some(Value::Object(data)) => data.clone(),
                _ => Map::new(),
            };
            Ok(Inbound::Event(Event { event_type, data }))
        }
        (Some(other), _) => Ok(Inbound::Unknown(other.to_string())),
        (None, None) => Ok(Inbound::Unknown("<untyped>".to_string())),
    }
}
