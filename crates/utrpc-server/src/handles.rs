use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use utrpc_wire::Envelope;

use crate::dispatcher::{lock, DispatcherInner};
use crate::error::{Result, ServerError};

/// Server-initiated pull handle for one receiver method.
///
/// Obtained from [`ServerDispatcher::receiver`](crate::ServerDispatcher::receiver).
pub struct Receiver {
    inner: Arc<DispatcherInner>,
    method: String,
}

impl Receiver {
    pub(crate) fn new(inner: Arc<DispatcherInner>, method: &str) -> Self {
        Self {
            inner,
            method: method.to_string(),
        }
    }

    /// Call the connected client addressed by `connection_id` and await its
    /// answer. An unknown id resolves to `Ok(None)` immediately — the peer
    /// is simply offline, which is not an error under at-most-once
    /// delivery.
    pub fn pull(&self, connection_id: &str, data: Value) -> Result<Option<Value>> {
        self.pull_with_timeout(connection_id, data, self.inner.config.pull_timeout)
    }

    /// Pull with an explicit timeout.
    pub fn pull_with_timeout(
        &self,
        connection_id: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        let session = lock(&self.inner.sessions).get(connection_id).cloned();
        let Some(session) = session else {
            return Ok(None);
        };

        let envelope = Envelope::receiver(&self.method, data);
        let pending = self.inner.pulls.register(&envelope.id, timeout);

        let raw = self
            .inner
            .config
            .transformer
            .serialize(std::slice::from_ref(&envelope))?;
        if let Err(err) = session.send(raw) {
            // At-most-once: the pull is left to settle by timeout.
            tracing::warn!(connection_id, %err, "pull send failed");
        }

        match pending.wait() {
            Ok(value) => Ok(Some(value)),
            Err(error) => Err(ServerError::Call(error)),
        }
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver").field("method", &self.method).finish()
    }
}

/// Broadcast handle for a subscription method.
///
/// Obtained from [`ServerDispatcher::subscriber`](crate::ServerDispatcher::subscriber).
/// Delivery is best-effort with no confirmation.
pub struct Subscriber {
    inner: Arc<DispatcherInner>,
    method: String,
}

impl Subscriber {
    pub(crate) fn new(inner: Arc<DispatcherInner>, method: &str) -> Self {
        Self {
            inner,
            method: method.to_string(),
        }
    }

    /// Publish to every connection subscribed to the method's default topic.
    pub fn send(&self, data: Value) {
        self.inner.publish(&self.method, "", data);
    }

    /// Publish to the composed `(method, topic)` address only.
    pub fn send_to(&self, topic: &str, data: Value) {
        self.inner.publish(&self.method, topic, data);
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("method", &self.method).finish()
    }
}

/// Push channel for a transfer method's default topic.
///
/// Obtained from [`ServerDispatcher::sender`](crate::ServerDispatcher::sender).
/// Transfer methods answer requests, but the server may also push
/// unsolicited updates on their name.
pub struct Sender {
    inner: Arc<DispatcherInner>,
    method: String,
}

impl Sender {
    pub(crate) fn new(inner: Arc<DispatcherInner>, method: &str) -> Self {
        Self {
            inner,
            method: method.to_string(),
        }
    }

    /// Publish to every connection subscribed to the method's default topic.
    pub fn send(&self, data: Value) {
        self.inner.publish(&self.method, "", data);
    }

    /// Publish to the composed `(method, topic)` address only.
    pub fn send_to(&self, topic: &str, data: Value) {
        self.inner.publish(&self.method, topic, data);
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender").field("method", &self.method).finish()
    }
}
