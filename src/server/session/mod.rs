//! WebSocket session lifecycle and per-connection state. Socket transport
//! uses `actix-ws`.

pub mod auth;
pub mod dispatch;
pub mod manager;

pub use manager::{Session, SessionManager};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed inbound WebSocket frame: `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// An outbound WebSocket frame, serialized the same shape as `ClientFrame`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame<'a> {
    #[serde(rename = "type")]
    pub event_type: &'a str,
    pub payload: Value,
}

impl<'a> ServerFrame<'a> {
    pub fn new(event_type: &'a str, payload: Value) -> Self {
        Self { event_type, payload }
    }
}

/// Closed allow-list of inbound client event types. Unknown types are
/// rejected before ever reaching a handler.
const EXACT_ALLOWED_TYPES: &[&str] = &[
    "chat:send",
    "chat:stop",
    "chat:retry",
    "channel:connect",
    "channel:disconnect",
    "channel:subscribe",
    "channel:unsubscribe",
    "channel:send",
    "channel:list",
    "agent:configure",
    "agent:stop",
    "tool:cancel",
    "session:ping",
    "session:pong",
    "coding-agent:input",
    "coding-agent:resize",
    "coding-agent:subscribe",
    "event:subscribe",
    "event:unsubscribe",
    "event:publish",
];

/// Prefix-wildcard entries from the allow-list (`workspace:*`).
const PREFIX_ALLOWED_TYPES: &[&str] = &["workspace:"];

pub fn is_allowed_event_type(event_type: &str) -> bool {
    EXACT_ALLOWED_TYPES.contains(&event_type)
        || PREFIX_ALLOWED_TYPES.iter().any(|prefix| event_type.starts_with(prefix))
}
