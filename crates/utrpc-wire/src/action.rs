//! Protocol discriminator, action tokens, and error codes.
//!
//! These values are wire-visible and must match byte-for-byte across
//! implementations.

/// Protocol discriminator carried in every envelope's `type` field.
/// Rejects foreign traffic sharing the socket.
pub const UTRPC: &str = "UTRPC";

/// One-way event fired by a client. No reply is ever sent.
pub const ACTION_EVENT: &str = "_UTRPC_E";
/// Client-initiated request expecting a correlated reply.
pub const ACTION_REQUEST: &str = "_UTRPC_REQ";
/// Server-initiated pull directed at one specific client.
pub const ACTION_RECEIVER: &str = "_UTRPC_REC";
/// Client reply to a server-initiated pull.
pub const ACTION_RESPONDER: &str = "_UTRPC_RES";
/// Subscription start for a `(method, topic)` pair.
pub const ACTION_SUBSCRIPTION_START: &str = "_UTRPC_SUB_START";
/// Subscription stop for a `(method, topic)` pair. Fire-and-forget.
pub const ACTION_SUBSCRIPTION_STOP: &str = "_UTRPC_SUB_STOP";

/// A correlated operation outlived its configured timeout.
pub const CODE_TIMEOUT: &str = "TIMEOUT";
/// A handler raised while producing a result.
pub const CODE_INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// The named method is not registered on the server.
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";
/// The envelope is structurally unusable (missing id).
pub const CODE_BAD_REQUEST: &str = "BAD_REQUEST";
/// A payload failed input or output validation.
pub const CODE_PARSE_ERROR: &str = "PARSE_ERROR";
/// The dispatcher could not route the envelope to any action.
pub const CODE_INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";

/// Returns a human-readable name for an action token.
pub fn action_name(action: &str) -> &'static str {
    match action {
        ACTION_EVENT => "EVENT",
        ACTION_REQUEST => "REQUEST",
        ACTION_RECEIVER => "RECEIVER",
        ACTION_RESPONDER => "RESPONDER",
        ACTION_SUBSCRIPTION_START => "SUB_START",
        ACTION_SUBSCRIPTION_STOP => "SUB_STOP",
        _ => "UNKNOWN",
    }
}
