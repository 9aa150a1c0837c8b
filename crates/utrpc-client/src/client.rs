use std::time::Duration;

use serde_json::Value;
use utrpc_wire::{Envelope, SocketError, CODE_TIMEOUT};

use crate::connection::{ClientOptions, ConnectionManager, ConnectionState};
use crate::error::{ClientError, Result};
use crate::receiver::RequestListener;
use crate::subscription::Subscription;

/// Explicit client interface over the transfer/receiver/subscribe/event
/// primitives: one concrete call per shape, delegating to the connection
/// manager underneath.
#[derive(Clone)]
pub struct Client {
    conn: ConnectionManager,
    request_timeout: Duration,
}

impl Client {
    /// Start connecting with the given options. Calls issued before the
    /// connection opens are queued.
    pub fn connect(options: ClientOptions) -> Self {
        let request_timeout = options.request_timeout;
        Self {
            conn: ConnectionManager::connect(options),
            request_timeout,
        }
    }

    /// Transfer call: send a correlated request and await its result.
    pub fn request(&self, method: &str, data: Value) -> Result<Value> {
        self.request_with_timeout(method, data, self.request_timeout)
    }

    /// Transfer call with an explicit timeout.
    pub fn request_with_timeout(
        &self,
        method: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let envelope = Envelope::request(method, data);
        let pending = self.conn.registry().register(&envelope.id, timeout);
        self.conn.send(envelope);

        match pending.wait() {
            Ok(value) => Ok(value),
            Err(SocketError { code, .. }) if code == CODE_TIMEOUT => {
                Err(ClientError::Timeout(timeout))
            }
            Err(error) => Err(ClientError::Call(error)),
        }
    }

    /// Fire a one-way event. The server never replies.
    pub fn send(&self, method: &str, data: Value) {
        self.conn.send(Envelope::event(method, data));
    }

    /// Answer server-initiated pulls for `method`.
    pub fn on_request(
        &self,
        method: &str,
        handler: impl Fn(Value) -> std::result::Result<Value, SocketError> + Send + Sync + 'static,
    ) -> RequestListener {
        RequestListener::start(&self.conn, method, handler)
    }

    /// Subscribe to `(method, topic)`. An empty topic addresses the
    /// method's default channel.
    pub fn subscribe(
        &self,
        method: &str,
        topic: &str,
        on_data: impl Fn(Value) + Send + Sync + 'static,
        on_error: impl Fn(SocketError) + Send + Sync + 'static,
    ) -> Subscription {
        Subscription::start(&self.conn, method, topic, on_data, on_error)
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Close permanently.
    pub fn close(&self) {
        self.conn.close();
    }

    /// The underlying connection, for lifecycle observation.
    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
