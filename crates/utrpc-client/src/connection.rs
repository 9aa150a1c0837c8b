use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use utrpc_socket::{ClientSocket, Connector};
use utrpc_wire::{event_name, Envelope, EventBus, JsonTransformer, RequestRegistry, SocketError, Transformer};

use crate::backoff::{default_backoff, Backoff};

/// Lifecycle event names on the connection's lifecycle bus.
pub const LIFECYCLE_OPEN: &str = "open";
pub const LIFECYCLE_CLOSE: &str = "close";
pub const LIFECYCLE_ERROR: &str = "error";
pub const LIFECYCLE_MESSAGE: &str = "message";

/// Connection state machine. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Connection-level notification published on the lifecycle bus.
#[derive(Debug, Clone)]
pub enum Lifecycle {
    Open,
    Close,
    /// Best-effort observational error: a connection-level error envelope,
    /// or `None` for transport failures with no wire payload.
    Error(Option<SocketError>),
    /// Every valid inbound envelope, before routing.
    Message(Envelope),
}

/// Configuration for one logical client connection.
#[derive(Clone)]
pub struct ClientOptions {
    /// Host socket implementation used to dial (and re-dial) the server.
    pub connector: Arc<dyn Connector>,
    /// Wire codec. Defaults to plain-text JSON.
    pub transformer: Arc<dyn Transformer>,
    /// Reconnect delay schedule.
    pub backoff: Backoff,
    /// Default timeout for correlated requests.
    pub request_timeout: Duration,
}

impl ClientOptions {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            transformer: Arc::new(JsonTransformer),
            backoff: default_backoff(),
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

struct Shutdown {
    closed: Mutex<bool>,
    cv: Condvar,
}

struct ConnInner {
    connector: Arc<dyn Connector>,
    transformer: Arc<dyn Transformer>,
    backoff: Backoff,
    state: Mutex<ConnectionState>,
    shutdown: Shutdown,
    socket: Mutex<Option<Arc<dyn ClientSocket>>>,
    outgoing: Mutex<Vec<Envelope>>,
    dispatching: AtomicBool,
    attempts: AtomicU32,
    registry: RequestRegistry,
    messages: EventBus<Envelope>,
    lifecycle: EventBus<Lifecycle>,
}

/// Owns one logical connection: state machine, outgoing batching, reconnect
/// with backoff, and inbound dispatch.
///
/// A single manager thread drives connect → read-loop → backoff-sleep
/// cycles, so at most one reconnect is ever pending. [`close`] is terminal:
/// it wakes any backoff sleep and suppresses all future reconnection.
///
/// [`close`]: ConnectionManager::close
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnInner>,
}

impl ConnectionManager {
    /// Start connecting. Returns immediately; sends issued before the
    /// connection opens are queued and flushed on open.
    pub fn connect(options: ClientOptions) -> Self {
        let inner = Arc::new(ConnInner {
            connector: options.connector,
            transformer: options.transformer,
            backoff: options.backoff,
            state: Mutex::new(ConnectionState::Connecting),
            shutdown: Shutdown {
                closed: Mutex::new(false),
                cv: Condvar::new(),
            },
            socket: Mutex::new(None),
            outgoing: Mutex::new(Vec::new()),
            dispatching: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            registry: RequestRegistry::new(),
            messages: EventBus::new(),
            lifecycle: EventBus::new(),
        });

        let runner = Arc::clone(&inner);
        thread::Builder::new()
            .name("utrpc-conn".to_string())
            .spawn(move || run(runner))
            .ok();

        Self { inner }
    }

    /// Enqueue an envelope and request a flush.
    pub fn send(&self, envelope: Envelope) {
        lock(&self.inner.outgoing).push(envelope);
        self.inner.dispatch();
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    /// Close permanently. Overrides any pending reconnect.
    pub fn close(&self) {
        {
            let mut closed = lock(&self.inner.shutdown.closed);
            if *closed {
                return;
            }
            *closed = true;
        }
        self.inner.shutdown.cv.notify_all();
        self.inner.set_state(ConnectionState::Closed);
        if let Some(socket) = lock(&self.inner.socket).take() {
            socket.close();
        }
        self.inner.lifecycle.emit(LIFECYCLE_CLOSE, &Lifecycle::Close);
        tracing::debug!("connection closed");
    }

    /// Registry correlating this connection's outbound requests.
    pub fn registry(&self) -> &RequestRegistry {
        &self.inner.registry
    }

    /// Inbound envelopes keyed by composed `(method, action/topic)` name.
    pub fn messages(&self) -> &EventBus<Envelope> {
        &self.inner.messages
    }

    /// Connection-level open/close/error/message notifications.
    pub fn lifecycle(&self) -> &EventBus<Lifecycle> {
        &self.inner.lifecycle
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        lock(&self.inner.outgoing).len()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnInner {
    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn is_closed(&self) -> bool {
        *lock(&self.shutdown.closed)
    }

    /// Sleep for `delay`, returning early (true) if the connection closes.
    fn wait_closed(&self, delay: Duration) -> bool {
        let mut closed = lock(&self.shutdown.closed);
        let deadline = std::time::Instant::now() + delay;
        while !*closed {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _timeout) = self
                .shutdown
                .cv
                .wait_timeout(closed, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            closed = guard;
        }
        true
    }

    /// Flush the outgoing queue as one wire write.
    ///
    /// Runs only when open and no flush is in flight. The drained batch is
    /// never re-queued, whatever the write outcome — at-most-once.
    fn dispatch(&self) {
        loop {
            if lock(&self.outgoing).is_empty() {
                return;
            }
            if self.state() != ConnectionState::Open {
                return;
            }
            if self.dispatching.swap(true, Ordering::SeqCst) {
                return;
            }

            let batch: Vec<Envelope> = lock(&self.outgoing).drain(..).collect();
            if !batch.is_empty() {
                self.write_batch(&batch);
            }
            self.dispatching.store(false, Ordering::SeqCst);
            // another send may have enqueued while the flush was in flight
        }
    }

    fn write_batch(&self, batch: &[Envelope]) {
        let raw = match self.transformer.serialize(batch) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(count = batch.len(), %err, "dropping unserializable batch");
                return;
            }
        };

        let socket = lock(&self.socket).clone();
        match socket {
            Some(socket) => {
                if let Err(err) = socket.send(raw) {
                    tracing::warn!(count = batch.len(), %err, "flush failed, batch dropped");
                }
            }
            None => {
                tracing::warn!(count = batch.len(), "no active socket, batch dropped");
            }
        }
    }

    /// Route one raw inbound frame.
    fn handle_inbound(&self, raw: &[u8]) {
        let envelopes = match self.transformer.deserialize(raw) {
            Ok(envelopes) => envelopes,
            Err(err) => {
                // The socket may carry foreign traffic.
                tracing::trace!(%err, "discarding undecodable frame");
                return;
            }
        };

        for envelope in envelopes {
            if !envelope.is_protocol() {
                continue;
            }

            if envelope.id.is_empty() {
                self.lifecycle
                    .emit(LIFECYCLE_ERROR, &Lifecycle::Error(envelope.error));
                continue;
            }

            if let Some(error) = envelope.error.clone() {
                // Correlated error: reject the matching pending request.
                // Without a match, fall back to the observational channels.
                if self.registry.reject(&envelope.id, error.clone()) {
                    continue;
                }
                self.lifecycle
                    .emit(LIFECYCLE_ERROR, &Lifecycle::Error(Some(error)));
                if !envelope.method.is_empty() {
                    let event = event_name(&envelope.method, envelope.action.as_deref().unwrap_or(""));
                    self.messages.emit(&event, &envelope);
                }
                continue;
            }

            self.lifecycle
                .emit(LIFECYCLE_MESSAGE, &Lifecycle::Message(envelope.clone()));

            self.registry
                .resolve(&envelope.id, envelope.data.clone().unwrap_or(Value::Null));

            let event = event_name(&envelope.method, envelope.action.as_deref().unwrap_or(""));
            self.messages.emit(&event, &envelope);
        }
    }
}

/// Manager thread: connect, read until loss, back off, repeat.
fn run(inner: Arc<ConnInner>) {
    loop {
        if inner.is_closed() {
            break;
        }

        match inner.connector.connect() {
            Ok(socket) => {
                if inner.is_closed() {
                    socket.close();
                    break;
                }

                inner.attempts.store(0, Ordering::SeqCst);
                *lock(&inner.socket) = Some(Arc::clone(&socket));
                inner.set_state(ConnectionState::Open);
                tracing::debug!("connection open");
                inner.lifecycle.emit(LIFECYCLE_OPEN, &Lifecycle::Open);
                inner.dispatch();

                loop {
                    match socket.recv() {
                        Ok(raw) => inner.handle_inbound(&raw),
                        Err(err) => {
                            tracing::debug!(%err, "connection lost");
                            break;
                        }
                    }
                }

                lock(&inner.socket).take();
                if inner.is_closed() {
                    break;
                }
                inner.set_state(ConnectionState::Connecting);
                inner.lifecycle.emit(LIFECYCLE_CLOSE, &Lifecycle::Close);
            }
            Err(err) => {
                tracing::debug!(%err, "connect attempt failed");
                inner.lifecycle.emit(LIFECYCLE_ERROR, &Lifecycle::Error(None));
            }
        }

        let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst);
        if inner.wait_closed((inner.backoff)(attempt)) {
            break;
        }
    }

    inner.set_state(ConnectionState::Closed);
}
