//! Operators that decide which values pass.

use core::hash::Hash;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::collections::{HashSet, VecDeque};

use portable_atomic_util::Arc;
use spin::Mutex;

use crate::observable::forwarding;
use crate::{CallbackObserver, Item, Observable, RxError, Subscriber};

impl<T: Item> Observable<T> {
    /// Pass only values matching `predicate`.
    pub fn filter<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.lift(move |downstream, _upstream| {
            let predicate = predicate.clone();
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value: T| {
                if predicate(&value) {
                    next.next(value);
                }
            })
        })
    }

    /// Pass each distinct value once.
    pub fn distinct(&self) -> Observable<T>
    where
        T: Eq + Hash,
    {
        self.lift(move |downstream, _upstream| {
            let seen: Arc<Mutex<HashSet<T>>> = Arc::new(Mutex::new(HashSet::new()));
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value: T| {
                let fresh = seen.lock().insert(value.clone());
                if fresh {
                    next.next(value);
                }
            })
        })
    }

    /// Drop values equal to the one emitted just before.
    pub fn distinct_until_changed(&self) -> Observable<T>
    where
        T: PartialEq,
    {
        self.lift(move |downstream, _upstream| {
            let last: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value: T| {
                let changed = {
                    let mut last = last.lock();
                    let changed = last.as_ref() != Some(&value);
                    if changed {
                        *last = Some(value.clone());
                    }
                    changed
                };
                if changed {
                    next.next(value);
                }
            })
        })
    }

    /// Drop the first `count` values.
    pub fn skip(&self, count: usize) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let seen = AtomicUsize::new(0);
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value| {
                if seen.fetch_add(1, Ordering::Relaxed) >= count {
                    next.next(value);
                }
            })
        })
    }

    /// Drop values while `predicate` holds, then pass everything.
    pub fn skip_while<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.lift(move |downstream, _upstream| {
            let predicate = predicate.clone();
            let skipping = AtomicBool::new(true);
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value: T| {
                if skipping.load(Ordering::Acquire) {
                    if predicate(&value) {
                        return;
                    }
                    skipping.store(false, Ordering::Release);
                }
                next.next(value);
            })
        })
    }

    /// Drop values until `notifier` emits its first value.
    pub fn skip_until<U: Item>(&self, notifier: &Observable<U>) -> Observable<T> {
        let notifier = notifier.clone();
        self.lift(move |downstream, _upstream| {
            let open = Arc::new(AtomicBool::new(false));
            let gate = downstream.subscription().child();
            let opener = open.clone();
            let signal = gate.clone();
            let fail = downstream.clone();
            notifier.subscribe_with(Subscriber::with_subscription(
                CallbackObserver::new()
                    .on_next(move |_: U| {
                        opener.store(true, Ordering::Release);
                        signal.unsubscribe();
                    })
                    .on_error(move |err| fail.error(err)),
                gate,
            ));

            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value| {
                if open.load(Ordering::Acquire) {
                    next.next(value);
                }
            })
        })
    }

    /// Pass the first `count` values, then complete.
    ///
    /// `take(0)` completes immediately without subscribing to the source.
    /// Otherwise the source is unsubscribed as soon as the last value is
    /// delivered, before completion is forwarded.
    pub fn take(&self, count: usize) -> Observable<T> {
        if count == 0 {
            return Observable::empty();
        }
        self.lift(move |downstream, upstream| {
            let seen = AtomicUsize::new(0);
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value| {
                let position = seen.fetch_add(1, Ordering::AcqRel) + 1;
                if position > count {
                    return;
                }
                next.next(value);
                if position == count {
                    upstream.unsubscribe();
                    next.complete();
                }
            })
        })
    }

    /// Pass values while `predicate` holds; complete on the first miss.
    pub fn take_while<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.lift(move |downstream, upstream| {
            let predicate = predicate.clone();
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value: T| {
                if predicate(&value) {
                    next.next(value);
                } else {
                    upstream.unsubscribe();
                    next.complete();
                }
            })
        })
    }

    /// Pass values until `notifier` emits, then complete.
    pub fn take_until<U: Item>(&self, notifier: &Observable<U>) -> Observable<T> {
        let notifier = notifier.clone();
        self.lift(move |downstream, _upstream| {
            let stop = downstream.clone();
            let fail = downstream.clone();
            notifier.subscribe_child(
                &downstream.subscription(),
                CallbackObserver::new()
                    .on_next(move |_: U| stop.complete())
                    .on_error(move |err| fail.error(err)),
            );

            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value| next.next(value))
        })
    }

    /// Emit the last `count` values when the source completes.
    pub fn take_last(&self, count: usize) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let window: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(VecDeque::new()));
            let tail = window.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value| {
                    if count == 0 {
                        return;
                    }
                    let mut window = window.lock();
                    window.push_back(value);
                    if window.len() > count {
                        window.pop_front();
                    }
                })
                .on_complete(move || {
                    let values = core::mem::take(&mut *tail.lock());
                    for value in values {
                        on_complete.next(value);
                    }
                    on_complete.complete();
                })
        })
    }

    /// Emit the first value and complete.
    ///
    /// Errors with [`RxError::EmptySequence`] if the source completes first.
    pub fn first(&self) -> Observable<T> {
        self.first_where(|_| true)
    }

    /// Emit the first value matching `predicate` and complete.
    ///
    /// Errors with [`RxError::EmptySequence`] if none matches.
    pub fn first_where<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.lift(move |downstream, upstream| {
            let predicate = predicate.clone();
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| {
                    if predicate(&value) {
                        upstream.unsubscribe();
                        next.next(value);
                        next.complete();
                    }
                })
                .on_complete(move || on_complete.error(RxError::EmptySequence))
        })
    }

    /// Emit the last value when the source completes.
    ///
    /// Errors with [`RxError::EmptySequence`] if there was none.
    pub fn last(&self) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let last: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
            let latest = last.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value| *latest.lock() = Some(value))
                .on_complete(move || {
                    let value = last.lock().take();
                    match value {
                        Some(value) => {
                            on_complete.next(value);
                            on_complete.complete();
                        }
                        None => on_complete.error(RxError::EmptySequence),
                    }
                })
        })
    }

    /// Emit `Some` first match and complete, or `None` if the source
    /// completes without one.
    pub fn find<P>(&self, predicate: P) -> Observable<Option<T>>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.lift(move |downstream, upstream| {
            let predicate = predicate.clone();
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| {
                    if predicate(&value) {
                        upstream.unsubscribe();
                        next.next(Some(value));
                        next.complete();
                    }
                })
                .on_complete(move || {
                    on_complete.next(None);
                    on_complete.complete();
                })
        })
    }

    /// Like [`find`](Self::find), emitting the position of the match.
    pub fn find_index<P>(&self, predicate: P) -> Observable<Option<usize>>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.lift(move |downstream, upstream| {
            let predicate = predicate.clone();
            let position = AtomicUsize::new(0);
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| {
                    let index = position.fetch_add(1, Ordering::Relaxed);
                    if predicate(&value) {
                        upstream.unsubscribe();
                        next.next(Some(index));
                        next.complete();
                    }
                })
                .on_complete(move || {
                    on_complete.next(None);
                    on_complete.complete();
                })
        })
    }

    /// Emit the value at `index` and complete.
    ///
    /// Errors with [`RxError::ArgumentOutOfRange`] if the source completes
    /// before reaching it.
    pub fn element_at(&self, index: usize) -> Observable<T> {
        self.lift(move |downstream, upstream| {
            let position = AtomicUsize::new(0);
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value| {
                    if position.fetch_add(1, Ordering::Relaxed) == index {
                        upstream.unsubscribe();
                        next.next(value);
                        next.complete();
                    }
                })
                .on_complete(move || on_complete.error(RxError::ArgumentOutOfRange { index }))
        })
    }

    /// Drop every value, keeping only the terminal notification.
    pub fn ignore_elements(&self) -> Observable<T> {
        self.lift(move |downstream, _upstream| forwarding(&downstream))
    }

    /// Emit `value` if the source completes without emitting.
    pub fn default_if_empty(&self, value: T) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let empty = Arc::new(AtomicBool::new(true));
            let seen = empty.clone();
            let fallback = value.clone();
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value| {
                    seen.store(false, Ordering::Release);
                    next.next(value);
                })
                .on_complete(move || {
                    if empty.load(Ordering::Acquire) {
                        on_complete.next(fallback.clone());
                    }
                    on_complete.complete();
                })
        })
    }
}
