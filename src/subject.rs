//! Multicast sources that are both observable and observer.

use std::collections::{BTreeMap, VecDeque};

use portable_atomic_util::Arc;
use spin::Mutex;

use crate::{Item, Observable, Observer, RxError, Subscriber, Teardown};

/// Capability shared by every member of the subject family.
///
/// Used by [`ConnectableObservable`](crate::ConnectableObservable) to stay
/// generic over which subject it broadcasts through.
pub trait SubjectLike<T: Item>: Observer<T> + Clone {
    /// The subscribe side of this subject.
    fn as_observable(&self) -> Observable<T>;

    /// Whether `error` or `complete` has been delivered.
    fn is_stopped(&self) -> bool;
}

#[derive(Clone)]
enum Terminal {
    Error(RxError),
    Complete,
}

impl Terminal {
    fn deliver<T: 'static>(&self, subscriber: &Subscriber<T>) {
        match self {
            Terminal::Error(err) => subscriber.error(err.clone()),
            Terminal::Complete => subscriber.complete(),
        }
    }
}

struct Observers<T> {
    attached: BTreeMap<u64, Subscriber<T>>,
    next_id: u64,
    terminal: Option<Terminal>,
}

/// Attachment-ordered observer set shared by all subject kinds.
///
/// Keyed by attachment id, so detaching does not disturb iteration order.
struct Broadcast<T> {
    observers: Arc<Mutex<Observers<T>>>,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            observers: self.observers.clone(),
        }
    }
}

impl<T: Item> Broadcast<T> {
    fn new() -> Self {
        Self {
            observers: Arc::new(Mutex::new(Observers {
                attached: BTreeMap::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }

    /// Snapshot of attached observers, or `None` once stopped.
    fn live(&self) -> Option<Vec<Subscriber<T>>> {
        let observers = self.observers.lock();
        if observers.terminal.is_some() {
            return None;
        }
        Some(observers.attached.values().cloned().collect())
    }

    fn next(&self, value: T) {
        if let Some(observers) = self.live() {
            for observer in observers {
                observer.next(value.clone());
            }
        }
    }

    fn stop(&self, terminal: Terminal) {
        let observers = {
            let mut observers = self.observers.lock();
            if observers.terminal.is_some() {
                return;
            }
            observers.terminal = Some(terminal.clone());
            core::mem::take(&mut observers.attached)
        };
        for observer in observers.values() {
            terminal.deliver(observer);
        }
    }

    fn terminal(&self) -> Option<Terminal> {
        self.observers.lock().terminal.clone()
    }

    fn is_stopped(&self) -> bool {
        self.observers.lock().terminal.is_some()
    }

    fn len(&self) -> usize {
        self.observers.lock().attached.len()
    }

    /// Attach `subscriber`, or replay the terminal notification if stopped.
    fn attach(&self, subscriber: Subscriber<T>) -> Teardown {
        let terminal = {
            let mut observers = self.observers.lock();
            match observers.terminal.clone() {
                Some(terminal) => terminal,
                None => {
                    let id = observers.next_id;
                    observers.next_id += 1;
                    observers.attached.insert(id, subscriber);
                    tracing::trace!(id, "observer attached to subject");
                    let registry = self.observers.clone();
                    return Teardown::from_fn(move || {
                        registry.lock().attached.remove(&id);
                        tracing::trace!(id, "observer detached from subject");
                    });
                }
            }
        };
        terminal.deliver(&subscriber);
        Teardown::none()
    }
}

/// A hot multicast source.
///
/// `next`, `error` and `complete` fan out synchronously to every attached
/// observer in attachment order. Once stopped, values are ignored and late
/// subscribers receive the terminal notification immediately.
///
/// # Example
///
/// ```rust
/// use oxide_rx::{Subject, TestObserver};
///
/// let subject = Subject::new();
/// let early = TestObserver::new();
/// subject.subscribe(early.clone());
///
/// subject.next(1);
/// let late = TestObserver::new();
/// subject.subscribe(late.clone());
/// subject.next(2);
///
/// assert_eq!(early.values(), vec![1, 2]);
/// assert_eq!(late.values(), vec![2]);
/// ```
pub struct Subject<T> {
    broadcast: Broadcast<T>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            broadcast: self.broadcast.clone(),
        }
    }
}

impl<T: Item> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Subject<T> {
    pub fn new() -> Self {
        Self {
            broadcast: Broadcast::new(),
        }
    }

    pub fn next(&self, value: T) {
        self.broadcast.next(value);
    }

    pub fn error(&self, err: RxError) {
        self.broadcast.stop(Terminal::Error(err));
    }

    pub fn complete(&self) {
        self.broadcast.stop(Terminal::Complete);
    }

    pub fn subscribe<O: Observer<T>>(&self, observer: O) -> crate::Subscription {
        self.as_observable().subscribe(observer)
    }

    /// Number of currently attached observers.
    pub fn observer_count(&self) -> usize {
        self.broadcast.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.broadcast.is_stopped()
    }

    pub fn as_observable(&self) -> Observable<T> {
        let broadcast = self.broadcast.clone();
        Observable::create(move |subscriber| broadcast.attach(subscriber))
    }
}

impl<T: Item> Observer<T> for Subject<T> {
    fn next(&self, value: T) {
        Subject::next(self, value);
    }

    fn error(&self, err: RxError) {
        Subject::error(self, err);
    }

    fn complete(&self) {
        Subject::complete(self);
    }

    fn manages_terminal_state(&self) -> bool {
        true
    }
}

impl<T: Item> SubjectLike<T> for Subject<T> {
    fn as_observable(&self) -> Observable<T> {
        Subject::as_observable(self)
    }

    fn is_stopped(&self) -> bool {
        Subject::is_stopped(self)
    }
}

impl<T: Item> From<Subject<T>> for Observable<T> {
    fn from(subject: Subject<T>) -> Self {
        subject.as_observable()
    }
}

/// A subject that always holds a current value.
///
/// New subscribers receive the latest value synchronously before any value
/// pushed afterwards. They see only the latest value, never the history.
pub struct BehaviorSubject<T> {
    broadcast: Broadcast<T>,
    value: Arc<Mutex<T>>,
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            broadcast: self.broadcast.clone(),
            value: self.value.clone(),
        }
    }
}

impl<T: Item> BehaviorSubject<T> {
    pub fn new(initial: T) -> Self {
        Self {
            broadcast: Broadcast::new(),
            value: Arc::new(Mutex::new(initial)),
        }
    }

    /// The latest value.
    pub fn value(&self) -> T {
        self.value.lock().clone()
    }

    /// Fan `value` out, then make it the latest value.
    pub fn next(&self, value: T) {
        if self.broadcast.is_stopped() {
            return;
        }
        self.broadcast.next(value.clone());
        *self.value.lock() = value;
    }

    pub fn error(&self, err: RxError) {
        self.broadcast.stop(Terminal::Error(err));
    }

    pub fn complete(&self) {
        self.broadcast.stop(Terminal::Complete);
    }

    pub fn subscribe<O: Observer<T>>(&self, observer: O) -> crate::Subscription {
        self.as_observable().subscribe(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.broadcast.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.broadcast.is_stopped()
    }

    pub fn as_observable(&self) -> Observable<T> {
        let broadcast = self.broadcast.clone();
        let value = self.value.clone();
        Observable::create(move |subscriber: Subscriber<T>| {
            if !broadcast.is_stopped() {
                let latest = value.lock().clone();
                subscriber.next(latest);
            }
            broadcast.attach(subscriber)
        })
    }
}

impl<T: Item> Observer<T> for BehaviorSubject<T> {
    fn next(&self, value: T) {
        BehaviorSubject::next(self, value);
    }

    fn error(&self, err: RxError) {
        BehaviorSubject::error(self, err);
    }

    fn complete(&self) {
        BehaviorSubject::complete(self);
    }

    fn manages_terminal_state(&self) -> bool {
        true
    }
}

impl<T: Item> SubjectLike<T> for BehaviorSubject<T> {
    fn as_observable(&self) -> Observable<T> {
        BehaviorSubject::as_observable(self)
    }

    fn is_stopped(&self) -> bool {
        BehaviorSubject::is_stopped(self)
    }
}

/// A subject that replays the last `buffer_size` values to new subscribers.
///
/// Replayed values arrive in insertion order before live ones. A stopped
/// replay subject still replays its buffer, followed by the terminal
/// notification.
pub struct ReplaySubject<T> {
    broadcast: Broadcast<T>,
    buffer: Arc<Mutex<VecDeque<T>>>,
    buffer_size: usize,
}

impl<T> Clone for ReplaySubject<T> {
    fn clone(&self) -> Self {
        Self {
            broadcast: self.broadcast.clone(),
            buffer: self.buffer.clone(),
            buffer_size: self.buffer_size,
        }
    }
}

impl<T: Item> ReplaySubject<T> {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            broadcast: Broadcast::new(),
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(buffer_size))),
            buffer_size,
        }
    }

    pub fn next(&self, value: T) {
        if self.broadcast.is_stopped() {
            return;
        }
        {
            let mut buffer = self.buffer.lock();
            buffer.push_back(value.clone());
            while buffer.len() > self.buffer_size {
                buffer.pop_front();
            }
        }
        self.broadcast.next(value);
    }

    pub fn error(&self, err: RxError) {
        self.broadcast.stop(Terminal::Error(err));
    }

    pub fn complete(&self) {
        self.broadcast.stop(Terminal::Complete);
    }

    pub fn subscribe<O: Observer<T>>(&self, observer: O) -> crate::Subscription {
        self.as_observable().subscribe(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.broadcast.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.broadcast.is_stopped()
    }

    pub fn as_observable(&self) -> Observable<T> {
        let broadcast = self.broadcast.clone();
        let buffer = self.buffer.clone();
        Observable::create(move |subscriber: Subscriber<T>| {
            let replay: Vec<T> = buffer.lock().iter().cloned().collect();
            for value in replay {
                if subscriber.is_closed() {
                    break;
                }
                subscriber.next(value);
            }
            broadcast.attach(subscriber)
        })
    }
}

impl<T: Item> Observer<T> for ReplaySubject<T> {
    fn next(&self, value: T) {
        ReplaySubject::next(self, value);
    }

    fn error(&self, err: RxError) {
        ReplaySubject::error(self, err);
    }

    fn complete(&self) {
        ReplaySubject::complete(self);
    }

    fn manages_terminal_state(&self) -> bool {
        true
    }
}

impl<T: Item> SubjectLike<T> for ReplaySubject<T> {
    fn as_observable(&self) -> Observable<T> {
        ReplaySubject::as_observable(self)
    }

    fn is_stopped(&self) -> bool {
        ReplaySubject::is_stopped(self)
    }
}

/// A subject that emits only its last value, and only on completion.
///
/// Subscribers arriving after completion receive that last value followed
/// by `complete`. Errors are forwarded without a value.
pub struct AsyncSubject<T> {
    broadcast: Broadcast<T>,
    last: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for AsyncSubject<T> {
    fn clone(&self) -> Self {
        Self {
            broadcast: self.broadcast.clone(),
            last: self.last.clone(),
        }
    }
}

impl<T: Item> Default for AsyncSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> AsyncSubject<T> {
    pub fn new() -> Self {
        Self {
            broadcast: Broadcast::new(),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn next(&self, value: T) {
        if self.broadcast.is_stopped() {
            return;
        }
        *self.last.lock() = Some(value);
    }

    pub fn error(&self, err: RxError) {
        self.broadcast.stop(Terminal::Error(err));
    }

    pub fn complete(&self) {
        if self.broadcast.is_stopped() {
            return;
        }
        let last = self.last.lock().clone();
        if let Some(value) = last {
            self.broadcast.next(value);
        }
        self.broadcast.stop(Terminal::Complete);
    }

    pub fn subscribe<O: Observer<T>>(&self, observer: O) -> crate::Subscription {
        self.as_observable().subscribe(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.broadcast.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.broadcast.is_stopped()
    }

    pub fn as_observable(&self) -> Observable<T> {
        let broadcast = self.broadcast.clone();
        let last = self.last.clone();
        Observable::create(move |subscriber: Subscriber<T>| {
            if let Some(Terminal::Complete) = broadcast.terminal() {
                let value = last.lock().clone();
                if let Some(value) = value {
                    subscriber.next(value);
                }
            }
            broadcast.attach(subscriber)
        })
    }
}

impl<T: Item> Observer<T> for AsyncSubject<T> {
    fn next(&self, value: T) {
        AsyncSubject::next(self, value);
    }

    fn error(&self, err: RxError) {
        AsyncSubject::error(self, err);
    }

    fn complete(&self) {
        AsyncSubject::complete(self);
    }

    fn manages_terminal_state(&self) -> bool {
        true
    }
}

impl<T: Item> SubjectLike<T> for AsyncSubject<T> {
    fn as_observable(&self) -> Observable<T> {
        AsyncSubject::as_observable(self)
    }

    fn is_stopped(&self) -> bool {
        AsyncSubject::is_stopped(self)
    }
}
