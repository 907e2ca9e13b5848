//! The consumer side of a stream.

#[cfg(any(test, feature = "testing"))]
use portable_atomic_util::Arc;
#[cfg(any(test, feature = "testing"))]
use spin::Mutex;

use crate::RxError;

/// Consumer of a stream: the three-callback `next` / `error` / `complete`
/// contract.
///
/// Methods take `&self` so one observer can be shared by clones of a
/// subscriber and re-entered from its own callbacks. Implementations that
/// need mutable state keep it behind a lock.
pub trait Observer<T>: Send + Sync + 'static {
    /// Receive the next value.
    fn next(&self, value: T);

    /// Receive the terminal error.
    fn error(&self, err: RxError);

    /// Receive the terminal completion.
    fn complete(&self);

    /// Whether this observer enforces its own terminal state.
    ///
    /// Observers that return `true` (the subject family) are attached to a
    /// producer without an extra terminal guard, so the stopped flag that
    /// matters is their own.
    fn manages_terminal_state(&self) -> bool {
        false
    }
}

/// A single stream event, reified as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<T> {
    Next(T),
    Error(RxError),
    Complete,
}

impl<T> Notification<T> {
    /// Deliver this notification to `observer`.
    pub fn deliver<O: Observer<T> + ?Sized>(self, observer: &O) {
        match self {
            Notification::Next(value) => observer.next(value),
            Notification::Error(err) => observer.error(err),
            Notification::Complete => observer.complete(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Notification::Next(_))
    }
}

type NextFn<T> = Box<dyn Fn(T) + Send + Sync + 'static>;
type ErrorFn = Box<dyn Fn(RxError) + Send + Sync + 'static>;
type CompleteFn = Box<dyn Fn() + Send + Sync + 'static>;

/// Observer assembled from zero or more callbacks.
///
/// # Example
///
/// ```rust
/// use oxide_rx::{CallbackObserver, Observable};
///
/// let observer = CallbackObserver::new()
///     .on_next(|value: i32| println!("value {value}"))
///     .on_complete(|| println!("done"));
///
/// Observable::of(vec![1, 2, 3]).subscribe(observer);
/// ```
pub struct CallbackObserver<T> {
    next: Option<NextFn<T>>,
    error: Option<ErrorFn>,
    complete: Option<CompleteFn>,
}

impl<T> Default for CallbackObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CallbackObserver<T> {
    /// An observer that ignores values and completion.
    pub fn new() -> Self {
        Self {
            next: None,
            error: None,
            complete: None,
        }
    }

    /// Build an observer from positional callbacks.
    pub fn from_fns<N, E, C>(next: N, error: E, complete: C) -> Self
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(RxError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        Self::new().on_next(next).on_error(error).on_complete(complete)
    }

    pub fn on_next<N>(mut self, next: N) -> Self
    where
        N: Fn(T) + Send + Sync + 'static,
    {
        self.next = Some(Box::new(next));
        self
    }

    pub fn on_error<E>(mut self, error: E) -> Self
    where
        E: Fn(RxError) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(error));
        self
    }

    pub fn on_complete<C>(mut self, complete: C) -> Self
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.complete = Some(Box::new(complete));
        self
    }
}

impl<T: 'static> Observer<T> for CallbackObserver<T> {
    fn next(&self, value: T) {
        if let Some(next) = &self.next {
            next(value);
        }
    }

    fn error(&self, err: RxError) {
        match &self.error {
            Some(error) => error(err),
            None => tracing::warn!(error = %err, "unhandled error reached an observer without an error callback"),
        }
    }

    fn complete(&self) {
        if let Some(complete) = &self.complete {
            complete();
        }
    }
}

#[cfg(any(test, feature = "testing"))]
/// Observer that records every notification for assertions.
///
/// Only available with the `testing` feature.
///
/// Clones share the same recording, so keep one clone for assertions and
/// hand the other to `subscribe`.
///
/// # Example
///
/// ```rust
/// use oxide_rx::{Observable, TestObserver};
///
/// let observer = TestObserver::new();
/// Observable::of(vec![1, 2]).subscribe(observer.clone());
///
/// assert_eq!(observer.values(), vec![1, 2]);
/// assert!(observer.is_completed());
/// ```
pub struct TestObserver<T> {
    notifications: Arc<Mutex<Vec<Notification<T>>>>,
}

#[cfg(any(test, feature = "testing"))]
impl<T> Clone for TestObserver<T> {
    fn clone(&self) -> Self {
        Self {
            notifications: self.notifications.clone(),
        }
    }
}

#[cfg(any(test, feature = "testing"))]
impl<T: Clone + Send + 'static> Default for TestObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "testing"))]
impl<T: Clone + Send + 'static> TestObserver<T> {
    pub fn new() -> Self {
        Self {
            notifications: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of notifications received, terminal ones included.
    pub fn count(&self) -> usize {
        self.notifications.lock().len()
    }

    /// Every value received through `next` before the first terminal, in
    /// order.
    pub fn values(&self) -> Vec<T> {
        self.notifications
            .lock()
            .iter()
            .take_while(|n| !n.is_terminal())
            .filter_map(|n| match n {
                Notification::Next(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        self.notifications
            .lock()
            .iter()
            .any(|n| matches!(n, Notification::Complete))
    }

    /// The first error received, if any.
    pub fn error(&self) -> Option<RxError> {
        self.notifications.lock().iter().find_map(|n| match n {
            Notification::Error(err) => Some(err.clone()),
            _ => None,
        })
    }

    /// Access the recorded notifications with a closure.
    pub fn with_notifications<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Vec<Notification<T>>) -> R,
    {
        let notifications = self.notifications.lock();
        f(&notifications)
    }
}

#[cfg(any(test, feature = "testing"))]
impl<T: Send + 'static> Observer<T> for TestObserver<T> {
    fn next(&self, value: T) {
        self.notifications.lock().push(Notification::Next(value));
    }

    fn error(&self, err: RxError) {
        self.notifications.lock().push(Notification::Error(err));
    }

    fn complete(&self) {
        self.notifications.lock().push(Notification::Complete);
    }
}
