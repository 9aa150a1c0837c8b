use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{
    ACTION_EVENT, ACTION_RECEIVER, ACTION_REQUEST, ACTION_RESPONDER, ACTION_SUBSCRIPTION_START,
    ACTION_SUBSCRIPTION_STOP, CODE_BAD_REQUEST, CODE_INTERNAL_ERROR, CODE_INTERNAL_SERVER_ERROR,
    CODE_NOT_FOUND, CODE_PARSE_ERROR, CODE_TIMEOUT, UTRPC,
};

/// Structured wire error carried on an envelope's `error` field.
///
/// An envelope with `error` set is never treated as success, regardless of
/// whatever `data` may also be present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocketError {
    pub code: String,
    pub message: String,
}

impl SocketError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// A correlated operation exceeded its configured timeout.
    pub fn timeout(duration: Duration) -> Self {
        Self::new(CODE_TIMEOUT, format!("exceeded {}ms", duration.as_millis()))
    }

    pub fn not_found(method: &str) -> Self {
        Self::new(CODE_NOT_FOUND, format!("method not found: \"{method}\""))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(CODE_BAD_REQUEST, message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(CODE_PARSE_ERROR, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CODE_INTERNAL_ERROR, message)
    }

    pub fn internal_server(message: impl Into<String>) -> Self {
        Self::new(CODE_INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for SocketError {}

/// The protocol's single message unit: routing plus payload or error.
///
/// Immutable value object. An empty `id` means no correlated reply is
/// expected. `msg_type` is the protocol discriminator (serialized as
/// `type`) — envelopes that do not carry [`UTRPC`] are foreign traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SocketError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "type", default)]
    pub msg_type: String,
}

impl Envelope {
    /// Generate a fresh correlation id.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    fn base(id: String, method: &str, action: Option<&str>) -> Self {
        Self {
            id,
            method: method.to_string(),
            action: action.map(str::to_string),
            error: None,
            data: None,
            msg_type: UTRPC.to_string(),
        }
    }

    /// Client-initiated request expecting a correlated reply.
    pub fn request(method: &str, data: Value) -> Self {
        let mut e = Self::base(Self::new_id(), method, Some(ACTION_REQUEST));
        e.data = Some(data);
        e
    }

    /// One-way event. The server never replies.
    pub fn event(method: &str, data: Value) -> Self {
        let mut e = Self::base(Self::new_id(), method, Some(ACTION_EVENT));
        e.data = Some(data);
        e
    }

    /// Server-initiated pull addressed to one connected client.
    pub fn receiver(method: &str, data: Value) -> Self {
        let mut e = Self::base(Self::new_id(), method, Some(ACTION_RECEIVER));
        e.data = Some(data);
        e
    }

    /// Client reply to a server-initiated pull, correlated by the pull's id.
    pub fn responder(id: &str, method: &str, data: Value) -> Self {
        let mut e = Self::base(id.to_string(), method, Some(ACTION_RESPONDER));
        e.data = Some(data);
        e
    }

    /// Client reply to a server-initiated pull whose handler failed.
    pub fn responder_error(id: &str, method: &str, error: SocketError) -> Self {
        let mut e = Self::base(id.to_string(), method, Some(ACTION_RESPONDER));
        e.error = Some(error);
        e
    }

    /// Subscription start for `(method, topic)`. The topic travels as data.
    pub fn sub_start(method: &str, topic: &str) -> Self {
        let mut e = Self::base(Self::new_id(), method, Some(ACTION_SUBSCRIPTION_START));
        e.data = Some(Value::String(topic.to_string()));
        e
    }

    /// Subscription stop for `(method, topic)`. Fire-and-forget.
    pub fn sub_stop(method: &str, topic: &str) -> Self {
        let mut e = Self::base(Self::new_id(), method, Some(ACTION_SUBSCRIPTION_STOP));
        e.data = Some(Value::String(topic.to_string()));
        e
    }

    /// Success reply to a correlated request.
    pub fn reply(id: &str, data: Value) -> Self {
        let mut e = Self::base(id.to_string(), "", None);
        e.data = Some(data);
        e
    }

    /// Error reply to a correlated request, delivered under the original id.
    pub fn reply_error(id: &str, error: SocketError) -> Self {
        let mut e = Self::base(id.to_string(), "", None);
        e.error = Some(error);
        e
    }

    /// Broadcast payload on a method's default topic.
    pub fn publish(method: &str, data: Value) -> Self {
        let mut e = Self::base(Self::new_id(), method, None);
        e.data = Some(data);
        e
    }

    /// Broadcast payload on a specific topic within a method's namespace.
    /// The topic rides in `action` so subscribers can address it.
    pub fn publish_to(method: &str, topic: &str, data: Value) -> Self {
        let mut e = Self::base(Self::new_id(), method, Some(topic));
        e.data = Some(data);
        e
    }

    /// Whether the envelope carries the utrpc protocol discriminator.
    pub fn is_protocol(&self) -> bool {
        self.msg_type == UTRPC
    }

    /// Payload, or `Value::Null` when absent.
    pub fn take_data(self) -> Value {
        self.data.unwrap_or(Value::Null)
    }
}
