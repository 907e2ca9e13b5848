//! Event sources that streams can listen to.

use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;

use portable_atomic_util::Arc;
use spin::Mutex;

/// Callback registered on an [`EventTarget`].
pub type Listener<E> = Box<dyn Fn(E) + Send + Sync + 'static>;

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Anything that can register and remove event listeners.
///
/// Implement this for your own event sources to feed them into
/// [`Observable::from_event`](crate::Observable::from_event).
pub trait EventTarget<E>: Send + Sync + 'static {
    /// Register `listener`; it is called for every event until removed.
    fn add_listener(&self, listener: Listener<E>) -> ListenerId;

    /// Remove a previously registered listener.
    fn remove_listener(&self, id: ListenerId);
}

/// Event emitter that dispatches to its listeners in registration order.
///
/// Clone this handle to emit from several places; clones share the same
/// listener set.
///
/// # Example
///
/// ```rust
/// use oxide_rx::{EventEmitter, Observable, TestObserver};
///
/// let clicks = EventEmitter::new();
/// let observer = TestObserver::new();
/// let subscription = Observable::from_event(clicks.clone()).subscribe(observer.clone());
///
/// clicks.emit("click");
/// subscription.unsubscribe();
/// clicks.emit("ignored");
///
/// assert_eq!(observer.values(), vec!["click"]);
/// assert_eq!(clicks.listener_count(), 0);
/// ```
pub struct EventEmitter<E> {
    listeners: Arc<Mutex<BTreeMap<u64, Arc<Listener<E>>>>>,
    next_id: Arc<AtomicU64>,
}

impl<E> Clone for EventEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event.
    ///
    /// Listeners are invoked outside the internal lock, so a listener may
    /// add or remove listeners while handling the event.
    pub fn emit(&self, event: E) {
        let listeners: Vec<Arc<Listener<E>>> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(event.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<E: Clone + Send + 'static> EventTarget<E> for EventEmitter<E> {
    fn add_listener(&self, listener: Listener<E>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, Arc::new(listener));
        ListenerId(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id.0);
    }
}
