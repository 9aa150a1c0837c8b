use serde_json::Value;
use utrpc_wire::{event_name, Envelope, ListenerId, SocketError, ACTION_RECEIVER};

use crate::connection::ConnectionManager;

/// Handler registration for server-initiated pulls on one method.
///
/// Created by [`Client::on_request`](crate::Client::on_request). The
/// handler's result travels back as a responder envelope under the pull's
/// id; a handler error becomes a structured `INTERNAL_ERROR` reply.
pub struct RequestListener {
    conn: ConnectionManager,
    event: String,
    listener: ListenerId,
}

impl RequestListener {
    pub(crate) fn start(
        conn: &ConnectionManager,
        method: &str,
        handler: impl Fn(Value) -> Result<Value, SocketError> + Send + Sync + 'static,
    ) -> Self {
        let event = event_name(method, ACTION_RECEIVER);

        let listener = {
            let respond = conn.clone();
            let method = method.to_string();
            conn.messages().on(&event, move |envelope: &Envelope| {
                let input = envelope.data.clone().unwrap_or(Value::Null);
                let reply = match handler(input) {
                    Ok(data) => Envelope::responder(&envelope.id, &method, data),
                    Err(err) => Envelope::responder_error(
                        &envelope.id,
                        &method,
                        SocketError::internal(err.message),
                    ),
                };
                respond.send(reply);
            })
        };

        Self {
            conn: conn.clone(),
            event,
            listener,
        }
    }

    /// Stop answering pulls for this method.
    pub fn unsubscribe(self) {
        self.conn.messages().off(&self.event, self.listener);
    }
}

impl std::fmt::Debug for RequestListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestListener")
            .field("event", &self.event)
            .finish()
    }
}
