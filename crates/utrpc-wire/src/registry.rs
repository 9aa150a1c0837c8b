use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::envelope::SocketError;

/// Outcome of a correlated operation: payload on success, structured wire
/// error (including timeout) on failure.
pub type Settlement = std::result::Result<Value, SocketError>;

type EntryMap = Arc<Mutex<HashMap<String, Sender<Settlement>>>>;

/// Correlates an envelope id to a pending operation.
///
/// Each direction of each peer owns its own registry: the client holds one
/// for its outbound requests, the server dispatcher holds one for its
/// outbound pulls. Settlement is exactly-once — the entry is removed under
/// the map lock before the waiter is notified, so a duplicate or late reply
/// for the same id is a silent no-op.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    entries: EntryMap,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending operation under `id`.
    ///
    /// The returned handle is the only way to observe settlement. The
    /// timeout arms immediately; if it elapses before a matching resolve or
    /// reject, the entry is removed and the waiter gets a `TIMEOUT` error
    /// carrying the configured duration. Dropping the handle unregisters
    /// the entry.
    pub fn register(&self, id: &str, timeout: Duration) -> PendingRequest {
        let (tx, rx) = mpsc::channel();
        self.lock().insert(id.to_string(), tx);
        PendingRequest {
            id: id.to_string(),
            timeout,
            deadline: Instant::now() + timeout,
            rx,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Settle `id` with a payload. Returns false when no entry matches.
    pub fn resolve(&self, id: &str, data: Value) -> bool {
        self.settle(id, Ok(data))
    }

    /// Settle `id` with an error. Returns false when no entry matches.
    pub fn reject(&self, id: &str, error: SocketError) -> bool {
        self.settle(id, Err(error))
    }

    fn settle(&self, id: &str, settlement: Settlement) -> bool {
        let entry = self.lock().remove(id);
        match entry {
            Some(tx) => {
                // The waiter may have timed out between removal and send.
                let _ = tx.send(settlement);
                true
            }
            None => {
                tracing::trace!(id, "settle for unknown id ignored");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Sender<Settlement>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

/// Awaitable handle for one registered operation.
pub struct PendingRequest {
    id: String,
    timeout: Duration,
    deadline: Instant,
    rx: Receiver<Settlement>,
    entries: EntryMap,
}

impl PendingRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Block until the operation settles or the timeout elapses.
    ///
    /// The clock started at registration, not here.
    pub fn wait(self) -> Settlement {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(remaining) {
            Ok(settlement) => settlement,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.remove_entry();
                // A settlement may have landed between the timeout firing and
                // the entry removal; it wins.
                match self.rx.try_recv() {
                    Ok(settlement) => settlement,
                    Err(_) => Err(SocketError::timeout(self.timeout)),
                }
            }
        }
    }

    fn remove_entry(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.remove_entry();
    }
}
