use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Identity of one registered listener. Two registrations of equivalent
/// closures get distinct ids and are removed independently.
pub type ListenerId = u64;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct BusInner<T> {
    next_id: ListenerId,
    events: HashMap<String, Vec<(ListenerId, Listener<T>)>>,
}

/// In-process multi-listener dispatch keyed by string event name.
///
/// Listeners run on the emitting thread. The listener list is snapshotted
/// before invocation, so a listener may register or remove listeners (on
/// any event) without deadlocking.
pub struct EventBus<T> {
    inner: Arc<Mutex<BusInner<T>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 1,
                events: HashMap::new(),
            })),
        }
    }

    /// Register a listener. Returns its identity for later removal.
    pub fn on(&self, event: &str, listener: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .events
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove one listener by identity. Unknown ids are a no-op.
    pub fn off(&self, event: &str, id: ListenerId) {
        let mut inner = self.lock();
        if let Some(listeners) = inner.events.get_mut(event) {
            listeners.retain(|(listener_id, _)| *listener_id != id);
            if listeners.is_empty() {
                inner.events.remove(event);
            }
        }
    }

    /// Invoke every listener registered for `event`, in registration order.
    pub fn emit(&self, event: &str, payload: &T) {
        let snapshot: Vec<Listener<T>> = {
            let inner = self.lock();
            match inner.events.get(event) {
                Some(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };

        for listener in snapshot {
            listener(payload);
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().events.get(event).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.lock().events.len())
            .finish()
    }
}
