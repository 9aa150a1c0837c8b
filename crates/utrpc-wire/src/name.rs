//! Composed event-name scheme.
//!
//! `method` alone addresses a method's default channel. `method:part`
//! addresses a specific subscription topic or an action-qualified channel.
//! These names are internal dispatch keys on the client and publish topics
//! on the server — they never appear inside an envelope.

/// Separator between a method name and its qualifying part.
pub const SEPARATOR: &str = ":";

/// Compose the event name for `(method, part)`.
///
/// An empty `part` yields the method's default channel name.
pub fn event_name(method: &str, part: &str) -> String {
    if part.is_empty() {
        method.to_string()
    } else {
        format!("{method}{SEPARATOR}{part}")
    }
}
