//! Lazy, cold stream descriptions and the subscribe protocol.

use portable_atomic_util::Arc;

use crate::{CallbackObserver, Observer, RxError, Subscriber, Subscription, Teardown};

/// Bound shared by every value that flows through a stream.
///
/// Values are cloned at multicast points (subjects, replay buffers, shared
/// pipelines) and moved everywhere else.
pub trait Item: Clone + Send + Sync + 'static {}

impl<T> Item for T where T: Clone + Send + Sync + 'static {}

type Producer<T> = Box<dyn Fn(Subscriber<T>) -> Teardown + Send + Sync + 'static>;

/// An inert, reusable description of a producer of values over time.
///
/// Creating an `Observable` performs no work. Each call to
/// [`subscribe`](Self::subscribe) runs the producer again with its own state,
/// so two subscribers never share an execution unless they are explicitly
/// connected through a [`Subject`](crate::Subject).
///
/// Cloning is cheap and only copies the description.
///
/// # Example
///
/// ```rust
/// use oxide_rx::{Observable, Teardown, TestObserver};
///
/// let numbers = Observable::create(|subscriber| {
///     subscriber.next(1);
///     subscriber.next(2);
///     subscriber.complete();
///     Teardown::none()
/// });
///
/// let observer = TestObserver::new();
/// numbers.map(|n| n * 10).subscribe(observer.clone());
///
/// assert_eq!(observer.values(), vec![10, 20]);
/// ```
pub struct Observable<T> {
    producer: Arc<Producer<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T: Item> Observable<T> {
    /// Create an observable from a producer function.
    ///
    /// The producer receives a guarded [`Subscriber`] and returns whatever
    /// must be released on unsubscribe: `()`, a [`Teardown`], or a
    /// [`Subscription`].
    pub fn create<F, R>(producer: F) -> Self
    where
        F: Fn(Subscriber<T>) -> R + Send + Sync + 'static,
        R: Into<Teardown>,
    {
        Self {
            producer: Arc::new(Box::new(move |subscriber| producer(subscriber).into())),
        }
    }

    /// Start a new execution delivering to `observer`.
    pub fn subscribe<O: Observer<T>>(&self, observer: O) -> Subscription {
        self.subscribe_with(Subscriber::new(observer))
    }

    /// Start a new execution delivering to an existing subscriber.
    pub fn subscribe_with(&self, subscriber: Subscriber<T>) -> Subscription {
        if subscriber.is_closed() {
            return subscriber.subscription();
        }
        let teardown = (self.producer)(subscriber.clone());
        subscriber.add(teardown);
        subscriber.subscription()
    }

    /// Subscribe with only a value callback.
    pub fn subscribe_next<N>(&self, next: N) -> Subscription
    where
        N: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe(CallbackObserver::new().on_next(next))
    }

    /// Subscribe with positional callbacks.
    pub fn subscribe_fns<N, E, C>(&self, next: N, error: E, complete: C) -> Subscription
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(RxError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.subscribe(CallbackObserver::from_fns(next, error, complete))
    }

    /// Subscribe `observer` as a child of `parent`.
    ///
    /// The child subscription is attached to `parent` before the producer
    /// runs, so a synchronous producer already sees the child closed if the
    /// parent is torn down mid-delivery.
    pub(crate) fn subscribe_child<O: Observer<T>>(
        &self,
        parent: &Subscription,
        observer: O,
    ) -> Subscription {
        let child = Subscription::new();
        parent.add(child.clone());
        self.subscribe_with(Subscriber::with_subscription(observer, child.clone()));
        child
    }

    /// Build an operator.
    ///
    /// `build` runs once per subscription and receives the downstream
    /// subscriber plus the subscription that owns the upstream execution.
    /// It returns the observer attached to the source.
    pub(crate) fn lift<U, B>(&self, build: B) -> Observable<U>
    where
        U: Item,
        B: Fn(Subscriber<U>, Subscription) -> CallbackObserver<T> + Send + Sync + 'static,
    {
        let source = self.clone();
        Observable::create(move |downstream: Subscriber<U>| {
            let upstream = Subscription::new();
            downstream.add(upstream.clone());
            let observer = build(downstream, upstream.clone());
            source.subscribe_with(Subscriber::with_subscription(observer, upstream));
        })
    }
}

/// Observer that forwards `error` and `complete` to `downstream`.
///
/// Operators override the callbacks they care about.
pub(crate) fn forwarding<T, U>(downstream: &Subscriber<U>) -> CallbackObserver<T>
where
    T: 'static,
    U: Item,
{
    let on_error = downstream.clone();
    let on_complete = downstream.clone();
    CallbackObserver::new()
        .on_error(move |err| on_error.error(err))
        .on_complete(move || on_complete.complete())
}
