//! Sharing one execution of a cold source between many consumers.

use core::marker::PhantomData;

use portable_atomic_util::Arc;
use spin::Mutex;

use crate::{
    BehaviorSubject, Item, Observable, Observer, ReplaySubject, Subject, SubjectLike, Subscriber,
    Subscription, Teardown,
};

type SubjectFactory<S> = Box<dyn Fn() -> S + Send + Sync + 'static>;

struct ConnectState<S> {
    subject: Option<S>,
    connection: Option<Subscription>,
    ref_count: usize,
}

struct Connectable<T, S> {
    source: Observable<T>,
    factory: SubjectFactory<S>,
    state: Mutex<ConnectState<S>>,
    _items: PhantomData<fn() -> T>,
}

/// A source whose single execution is broadcast through a subject.
///
/// Subscribing only attaches to the subject. The source itself runs once
/// [`connect`](Self::connect) is called, and every attached observer sees
/// the same values. [`ref_count`](Self::ref_count) automates connecting on
/// the first subscriber and disconnecting after the last.
///
/// Once a connection ends and the subject has stopped, the next connection
/// runs through a fresh subject from the factory.
///
/// # Example
///
/// ```rust
/// use oxide_rx::{Observable, TestObserver};
///
/// let published = Observable::of(vec![1, 2]).publish();
/// let first = TestObserver::new();
/// let second = TestObserver::new();
/// published.subscribe(first.clone());
/// published.subscribe(second.clone());
///
/// assert!(first.values().is_empty());
/// published.connect();
///
/// assert_eq!(first.values(), vec![1, 2]);
/// assert_eq!(second.values(), vec![1, 2]);
/// ```
pub struct ConnectableObservable<T, S> {
    inner: Arc<Connectable<T, S>>,
}

impl<T, S> Clone for ConnectableObservable<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Item, S: SubjectLike<T>> ConnectableObservable<T, S> {
    pub(crate) fn with_factory<F>(source: Observable<T>, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Connectable {
                source,
                factory: Box::new(factory),
                state: Mutex::new(ConnectState {
                    subject: None,
                    connection: None,
                    ref_count: 0,
                }),
                _items: PhantomData,
            }),
        }
    }

    /// Attach `observer` to the shared subject.
    pub fn subscribe<O: Observer<T>>(&self, observer: O) -> Subscription {
        self.subject(false).as_observable().subscribe(observer)
    }

    /// Run the source into the subject.
    ///
    /// Returns the live connection if one already exists. Unsubscribing the
    /// returned handle stops the shared execution.
    pub fn connect(&self) -> Subscription {
        let connection = {
            let mut state = self.inner.state.lock();
            if let Some(connection) = state.connection.as_ref().filter(|c| !c.is_closed()) {
                return connection.clone();
            }
            let connection = Subscription::new();
            state.connection = Some(connection.clone());
            connection
        };
        let subject = self.subject(true);
        tracing::debug!("connectable source connected");

        let inner = self.inner.clone();
        let own = connection.clone();
        connection.add(Teardown::from_fn(move || {
            let mut state = inner.state.lock();
            if state.connection.as_ref().is_some_and(|c| c.same_as(&own)) {
                state.connection = None;
            }
            tracing::debug!("connectable source disconnected");
        }));

        self.inner
            .source
            .subscribe_with(Subscriber::with_subscription(subject, connection.clone()));
        connection
    }

    /// Whether a connection is currently running.
    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .connection
            .as_ref()
            .is_some_and(|c| !c.is_closed())
    }

    /// An observable that connects on its first subscriber and disconnects
    /// when its last subscriber leaves.
    ///
    /// A later subscriber reconnects, starting a new execution of the
    /// source.
    pub fn ref_count(&self) -> Observable<T> {
        let connectable = self.clone();
        Observable::create(move |downstream: Subscriber<T>| {
            let first = {
                let mut state = connectable.inner.state.lock();
                state.ref_count += 1;
                state.ref_count == 1
            };
            connectable
                .subject(first)
                .as_observable()
                .subscribe_child(&downstream.subscription(), downstream.clone());
            if first {
                connectable.connect();
            }

            let releasing = connectable.clone();
            Teardown::from_fn(move || releasing.release())
        })
    }

    fn release(&self) {
        let connection = {
            let mut state = self.inner.state.lock();
            state.ref_count = state.ref_count.saturating_sub(1);
            if state.ref_count == 0 {
                state.connection.take()
            } else {
                None
            }
        };
        if let Some(connection) = connection {
            tracing::debug!("last shared subscriber left");
            connection.unsubscribe();
        }
    }

    /// The current subject, created from the factory on first use.
    ///
    /// With `renew_stopped`, a subject that has already stopped is replaced
    /// so a new execution gets a fresh one.
    fn subject(&self, renew_stopped: bool) -> S {
        let usable = |subject: &&S| !(renew_stopped && subject.is_stopped());
        {
            let state = self.inner.state.lock();
            if let Some(subject) = state.subject.as_ref().filter(usable) {
                return subject.clone();
            }
        }
        let fresh = (self.inner.factory)();
        let mut state = self.inner.state.lock();
        match state.subject.as_ref().filter(usable) {
            Some(subject) => subject.clone(),
            None => {
                state.subject = Some(fresh.clone());
                fresh
            }
        }
    }
}

impl<T: Item> Observable<T> {
    /// Broadcast one execution of this source through `subject`.
    pub fn multicast<S: SubjectLike<T>>(&self, subject: S) -> ConnectableObservable<T, S> {
        ConnectableObservable::with_factory(self.clone(), move || subject.clone())
    }

    /// Broadcast through a plain [`Subject`].
    pub fn publish(&self) -> ConnectableObservable<T, Subject<T>> {
        ConnectableObservable::with_factory(self.clone(), Subject::new)
    }

    /// Broadcast through a [`BehaviorSubject`] seeded with `initial`.
    pub fn publish_behavior(&self, initial: T) -> ConnectableObservable<T, BehaviorSubject<T>> {
        ConnectableObservable::with_factory(self.clone(), move || BehaviorSubject::new(initial.clone()))
    }

    /// Broadcast through a [`ReplaySubject`] keeping the last `buffer_size`
    /// values.
    pub fn publish_replay(&self, buffer_size: usize) -> ConnectableObservable<T, ReplaySubject<T>> {
        ConnectableObservable::with_factory(self.clone(), move || ReplaySubject::new(buffer_size))
    }

    /// Share one execution among all concurrent subscribers.
    ///
    /// Equivalent to `publish().ref_count()`.
    pub fn share(&self) -> Observable<T> {
        self.publish().ref_count()
    }
}
