//! Cancellation handles and the teardown actions they release.

use portable_atomic_util::Arc;
use spin::Mutex;

/// Resource-release action attached to a [`Subscription`].
///
/// A producer returns one of these from its subscribe function. It covers
/// the three shapes a producer may hand back: nothing, a closure to run, or
/// another subscription to cancel.
///
/// # Example
///
/// ```rust
/// use oxide_rx::{Subscription, Teardown};
///
/// // Nothing to release
/// let teardown = Teardown::none();
///
/// // Run a closure
/// let teardown = Teardown::from_fn(|| println!("released"));
///
/// // Cancel a nested subscription
/// let teardown: Teardown = Subscription::new().into();
/// ```
pub struct Teardown(TeardownKind);

enum TeardownKind {
    None,
    Fn(Box<dyn FnOnce() + Send + 'static>),
    Subscription(Subscription),
}

impl Teardown {
    /// A teardown with nothing to release.
    pub fn none() -> Self {
        Self(TeardownKind::None)
    }

    /// A teardown that runs `f` once.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(TeardownKind::Fn(Box::new(f)))
    }

    /// Combine several teardowns; they run in the given order.
    pub fn batch(teardowns: Vec<Teardown>) -> Self {
        Self::from_fn(move || {
            for teardown in teardowns {
                teardown.run();
            }
        })
    }

    pub(crate) fn run(self) {
        match self.0 {
            TeardownKind::None => {}
            TeardownKind::Fn(f) => f(),
            TeardownKind::Subscription(subscription) => subscription.unsubscribe(),
        }
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Subscription> for Teardown {
    fn from(subscription: Subscription) -> Self {
        Self(TeardownKind::Subscription(subscription))
    }
}

impl From<()> for Teardown {
    fn from(_: ()) -> Self {
        Self::none()
    }
}

struct SubscriptionState {
    closed: bool,
    teardowns: Vec<Teardown>,
}

/// Handle to an active execution, returned by `subscribe`.
///
/// Clones share the same underlying state. [`unsubscribe`](Self::unsubscribe)
/// is idempotent: the first call runs every attached teardown exactly once,
/// later calls do nothing.
#[derive(Clone)]
pub struct Subscription {
    state: Arc<Mutex<SubscriptionState>>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Subscription")
            .field("closed", &state.closed)
            .field("teardowns", &state.teardowns.len())
            .finish()
    }
}

impl Subscription {
    /// Create an open subscription with no teardowns.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubscriptionState {
                closed: false,
                teardowns: Vec::new(),
            })),
        }
    }

    /// Create a subscription that is already closed.
    pub fn closed() -> Self {
        let subscription = Self::new();
        subscription.state.lock().closed = true;
        subscription
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Attach a teardown.
    ///
    /// If this subscription is already closed the teardown runs immediately.
    pub fn add(&self, teardown: impl Into<Teardown>) {
        let teardown = teardown.into();
        {
            let mut state = self.state.lock();
            if !state.closed {
                state.teardowns.push(teardown);
                return;
            }
        }
        teardown.run();
    }

    /// Create an open subscription cancelled together with this one.
    pub(crate) fn child(&self) -> Subscription {
        let child = Subscription::new();
        self.add(child.clone());
        child
    }

    /// Detach a child subscription without running it.
    ///
    /// Used when a nested execution finishes on its own so the parent does
    /// not keep it alive.
    pub fn remove(&self, child: &Subscription) {
        let mut state = self.state.lock();
        state.teardowns.retain(|teardown| match &teardown.0 {
            TeardownKind::Subscription(s) => !s.same_as(child),
            _ => true,
        });
    }

    /// Cancel the execution and release every attached resource.
    pub fn unsubscribe(&self) {
        let teardowns = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            core::mem::take(&mut state.teardowns)
        };
        for teardown in teardowns {
            teardown.run();
        }
    }

    /// Whether both handles refer to the same subscription.
    pub fn same_as(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}
