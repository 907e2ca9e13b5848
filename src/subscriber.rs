//! Terminal-state guard placed between a producer and its consumer.

use core::sync::atomic::{AtomicBool, Ordering};

use portable_atomic_util::Arc;

use crate::{Observer, RxError, Subscription, Teardown};

struct SubscriberInner<T> {
    destination: Box<dyn Observer<T>>,
    guarded: bool,
    stopped: AtomicBool,
    subscription: Subscription,
}

/// Guarded observer handed to a producer.
///
/// Every raw observer is wrapped in a `Subscriber` before a producer sees
/// it. Once `error` or `complete` has been delivered, further notifications
/// are dropped, and the subscriber's [`Subscription`] is released so any
/// timers or nested subscriptions the producer attached are torn down.
///
/// Producers should check [`is_closed`](Self::is_closed) in loops so that an
/// unsubscribe issued during synchronous delivery stops emission.
pub struct Subscriber<T> {
    inner: Arc<SubscriberInner<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Subscriber<T> {
    /// Wrap `observer` with a fresh subscription.
    pub fn new<O: Observer<T>>(observer: O) -> Self {
        Self::with_subscription(observer, Subscription::new())
    }

    /// Wrap `observer`, releasing `subscription` on termination.
    pub fn with_subscription<O: Observer<T>>(observer: O, subscription: Subscription) -> Self {
        let guarded = !observer.manages_terminal_state();
        Self {
            inner: Arc::new(SubscriberInner {
                destination: Box::new(observer),
                guarded,
                stopped: AtomicBool::new(false),
                subscription,
            }),
        }
    }

    /// Whether notifications will still reach the destination.
    pub fn is_closed(&self) -> bool {
        (self.inner.guarded && self.inner.stopped.load(Ordering::Acquire))
            || self.inner.subscription.is_closed()
    }

    pub fn next(&self, value: T) {
        if self.is_closed() {
            return;
        }
        self.inner.destination.next(value);
    }

    pub fn error(&self, err: RxError) {
        if !self.stop() {
            return;
        }
        self.inner.destination.error(err);
        self.inner.subscription.unsubscribe();
    }

    pub fn complete(&self) {
        if !self.stop() {
            return;
        }
        self.inner.destination.complete();
        self.inner.subscription.unsubscribe();
    }

    /// Attach a teardown to this subscriber's subscription.
    pub fn add(&self, teardown: impl Into<Teardown>) {
        self.inner.subscription.add(teardown);
    }

    /// The subscription released when this subscriber terminates.
    pub fn subscription(&self) -> Subscription {
        self.inner.subscription.clone()
    }

    /// Stop the subscriber without notifying the destination.
    pub fn unsubscribe(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.subscription.unsubscribe();
    }

    fn stop(&self) -> bool {
        if self.inner.subscription.is_closed() {
            return false;
        }
        if self.inner.guarded {
            !self.inner.stopped.swap(true, Ordering::AcqRel)
        } else {
            true
        }
    }
}

impl<T: 'static> Observer<T> for Subscriber<T> {
    fn next(&self, value: T) {
        Subscriber::next(self, value);
    }

    fn error(&self, err: RxError) {
        Subscriber::error(self, err);
    }

    fn complete(&self) {
        Subscriber::complete(self);
    }
}
