use serde_json::Value;
use utrpc_wire::{event_name, Envelope, ListenerId, SocketError};

use crate::connection::{ConnectionManager, Lifecycle, LIFECYCLE_OPEN};

/// One live subscription to a `(method, topic)` pair.
///
/// Created by [`Client::subscribe`](crate::Client::subscribe). The start
/// envelope is sent immediately and again on every transition to open, so
/// the subscription survives reconnects — the server keeps no memory of a
/// dropped connection's subscriptions. Each call yields an independent
/// handle; duplicate subscriptions to the same pair must each be
/// unsubscribed separately.
pub struct Subscription {
    conn: ConnectionManager,
    method: String,
    topic: String,
    event: String,
    open_listener: ListenerId,
    message_listener: ListenerId,
}

impl Subscription {
    pub(crate) fn start(
        conn: &ConnectionManager,
        method: &str,
        topic: &str,
        on_data: impl Fn(Value) + Send + Sync + 'static,
        on_error: impl Fn(SocketError) + Send + Sync + 'static,
    ) -> Self {
        let event = event_name(method, topic);

        let open_listener = {
            let resend = conn.clone();
            let method = method.to_string();
            let topic = topic.to_string();
            conn.lifecycle().on(LIFECYCLE_OPEN, move |_: &Lifecycle| {
                resend.send(Envelope::sub_start(&method, &topic));
            })
        };

        let message_listener = conn.messages().on(&event, move |envelope: &Envelope| {
            match &envelope.error {
                Some(error) => on_error(error.clone()),
                None => on_data(envelope.data.clone().unwrap_or(Value::Null)),
            }
        });

        conn.send(Envelope::sub_start(method, topic));

        Self {
            conn: conn.clone(),
            method: method.to_string(),
            topic: topic.to_string(),
            event,
            open_listener,
            message_listener,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove both listeners and send the stop envelope (fire-and-forget,
    /// unacknowledged).
    pub fn unsubscribe(self) {
        self.conn
            .lifecycle()
            .off(LIFECYCLE_OPEN, self.open_listener);
        self.conn.messages().off(&self.event, self.message_listener);
        self.conn
            .send(Envelope::sub_stop(&self.method, &self.topic));
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("method", &self.method)
            .field("topic", &self.topic)
            .finish()
    }
}
