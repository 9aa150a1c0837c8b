//! In-process loopback implementation of both socket contracts.
//!
//! One [`MemoryHub`] stands in for the host socket server: clients dial it
//! through a [`MemoryConnector`], the server host accepts [`MemorySession`]s
//! and drives a dispatcher with them, and the hub itself performs topic
//! fan-out. Connections are pairs of mpsc channels; dropping either half
//! surfaces [`TransportError::Closed`] to the other.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::traits::{ClientSocket, Connector, Publisher, SessionSocket};

struct HubInner {
    next_conn: AtomicU64,
    // connection id -> channel toward that connection's client half
    conns: Mutex<HashMap<String, Sender<Bytes>>>,
    // topic -> subscribed connection ids
    topics: Mutex<HashMap<String, HashSet<String>>>,
    accept_tx: Mutex<Sender<Arc<MemorySession>>>,
    accept_rx: Mutex<Receiver<Arc<MemorySession>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory socket server with topic fan-out.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        let (accept_tx, accept_rx) = mpsc::channel();
        Self {
            inner: Arc::new(HubInner {
                next_conn: AtomicU64::new(1),
                conns: Mutex::new(HashMap::new()),
                topics: Mutex::new(HashMap::new()),
                accept_tx: Mutex::new(accept_tx),
                accept_rx: Mutex::new(accept_rx),
            }),
        }
    }

    /// Connector handle for clients dialing this hub.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Block until the next client connects.
    pub fn accept(&self) -> Result<Arc<MemorySession>> {
        lock(&self.inner.accept_rx)
            .recv()
            .map_err(|_| TransportError::Closed)
    }

    /// Block until the next client connects, or time out.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Arc<MemorySession>> {
        lock(&self.inner.accept_rx)
            .recv_timeout(timeout)
            .map_err(|_| TransportError::Closed)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        lock(&self.inner.conns).len()
    }
}

impl Publisher for MemoryHub {
    fn publish(&self, topic: &str, raw: Bytes) {
        let subscribers: Vec<String> = match lock(&self.inner.topics).get(topic) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return,
        };

        let conns = lock(&self.inner.conns);
        for id in subscribers {
            if let Some(tx) = conns.get(&id) {
                let _ = tx.send(raw.clone());
            }
        }
    }
}

/// Dials fresh connections against a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryConnector {
    inner: Arc<HubInner>,
}

impl Connector for MemoryConnector {
    fn connect(&self) -> Result<Arc<dyn ClientSocket>> {
        let id = format!(
            "conn-{}",
            self.inner.next_conn.fetch_add(1, Ordering::Relaxed)
        );

        let (to_client_tx, to_client_rx) = mpsc::channel();
        let (to_server_tx, to_server_rx) = mpsc::channel();

        lock(&self.inner.conns).insert(id.clone(), to_client_tx.clone());

        let session = Arc::new(MemorySession {
            id: id.clone(),
            hub: Arc::clone(&self.inner),
            tx: Mutex::new(Some(to_client_tx)),
            rx: Mutex::new(to_server_rx),
        });

        let client = Arc::new(MemoryClientSocket {
            conn_id: id,
            hub: Arc::clone(&self.inner),
            tx: Mutex::new(Some(to_server_tx)),
            rx: Mutex::new(to_client_rx),
        });

        lock(&self.inner.accept_tx)
            .send(session)
            .map_err(|_| TransportError::Connect("hub is gone".to_string()))?;

        Ok(client)
    }
}

/// Client half of a loopback connection.
pub struct MemoryClientSocket {
    conn_id: String,
    hub: Arc<HubInner>,
    tx: Mutex<Option<Sender<Bytes>>>,
    rx: Mutex<Receiver<Bytes>>,
}

impl ClientSocket for MemoryClientSocket {
    fn send(&self, raw: Bytes) -> Result<()> {
        match lock(&self.tx).as_ref() {
            Some(tx) => tx.send(raw).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn recv(&self) -> Result<Bytes> {
        lock(&self.rx).recv().map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        lock(&self.tx).take();
        remove_connection(&self.hub, &self.conn_id);
    }
}

/// Server half of a loopback connection.
pub struct MemorySession {
    id: String,
    hub: Arc<HubInner>,
    tx: Mutex<Option<Sender<Bytes>>>,
    rx: Mutex<Receiver<Bytes>>,
}

impl MemorySession {
    /// Block until the client's next message, so a host loop can feed a
    /// dispatcher.
    pub fn recv(&self) -> Result<Bytes> {
        lock(&self.rx).recv().map_err(|_| TransportError::Closed)
    }

    /// Force-disconnect from the server side.
    pub fn close(&self) {
        lock(&self.tx).take();
        remove_connection(&self.hub, &self.id);
    }
}

impl SessionSocket for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, raw: Bytes) -> Result<()> {
        match lock(&self.tx).as_ref() {
            Some(tx) => tx.send(raw).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn subscribe(&self, topic: &str) {
        lock(&self.hub.topics)
            .entry(topic.to_string())
            .or_default()
            .insert(self.id.clone());
    }

    fn unsubscribe(&self, topic: &str) {
        let mut topics = lock(&self.hub.topics);
        if let Some(ids) = topics.get_mut(topic) {
            ids.remove(&self.id);
            if ids.is_empty() {
                topics.remove(topic);
            }
        }
    }

    fn is_subscribed(&self, topic: &str) -> bool {
        lock(&self.hub.topics)
            .get(topic)
            .is_some_and(|ids| ids.contains(&self.id))
    }
}

fn remove_connection(hub: &HubInner, conn_id: &str) {
    lock(&hub.conns).remove(conn_id);
    let mut topics = lock(&hub.topics);
    topics.retain(|_, ids| {
        ids.remove(conn_id);
        !ids.is_empty()
    });
    tracing::debug!(conn_id, "loopback connection removed");
}
