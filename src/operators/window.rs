//! Grouping values into buffers and windows.
//!
//! Buffers are emitted as vectors once closed. Windows are emitted as
//! streams when they open and receive values live, so a consumer must
//! subscribe to each window as it arrives.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use portable_atomic_util::Arc;
use spin::Mutex;

use crate::observable::forwarding;
use crate::operators::timing::release_child;
use crate::{CallbackObserver, Item, Observable, RxError, Subject, Subscriber, Subscription};

fn clamp_size(size: usize, operator: &str) -> usize {
    if size == 0 {
        tracing::warn!(operator, "zero size clamped to 1");
        1
    } else {
        size
    }
}

impl<T: Item> Observable<T> {
    /// Collect values, emitting the collection whenever `notifier` emits.
    ///
    /// Values collected when the source completes are emitted if there are
    /// any. Completion of `notifier` is ignored.
    pub fn buffer<U: Item>(&self, notifier: &Observable<U>) -> Observable<Vec<T>> {
        let notifier = notifier.clone();
        self.lift(move |downstream, _upstream| {
            let buffer: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
            let flushed = buffer.clone();
            let (emit, fail) = (downstream.clone(), downstream.clone());
            notifier.subscribe_child(
                &downstream.subscription(),
                CallbackObserver::new()
                    .on_next(move |_: U| {
                        let values = core::mem::take(&mut *flushed.lock());
                        emit.next(values);
                    })
                    .on_error(move |err| fail.error(err)),
            );

            let collected = buffer.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| collected.lock().push(value))
                .on_complete(move || {
                    flush_remainder(&buffer, &on_complete);
                    on_complete.complete();
                })
        })
    }

    /// Emit consecutive, non-overlapping buffers of `size` values.
    ///
    /// A zero `size` is clamped to one.
    pub fn buffer_count(&self, size: usize) -> Observable<Vec<T>> {
        let size = clamp_size(size, "buffer_count");
        self.buffer_count_every(size, size)
    }

    /// Emit buffers of `size` values, starting a new buffer every `every`
    /// values. Buffers overlap when `every < size` and skip values when
    /// `every > size`.
    pub fn buffer_count_every(&self, size: usize, every: usize) -> Observable<Vec<T>> {
        let size = clamp_size(size, "buffer_count_every");
        let every = clamp_size(every, "buffer_count_every");
        self.lift(move |downstream, _upstream| {
            let buffers: Arc<Mutex<Vec<Vec<T>>>> = Arc::new(Mutex::new(Vec::new()));
            let seen = AtomicUsize::new(0);
            let open = buffers.clone();
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| {
                    let full = {
                        let mut buffers = open.lock();
                        if seen.fetch_add(1, Ordering::Relaxed) % every == 0 {
                            buffers.push(Vec::with_capacity(size));
                        }
                        for buffer in buffers.iter_mut() {
                            buffer.push(value.clone());
                        }
                        let (full, open): (Vec<Vec<T>>, Vec<Vec<T>>) =
                            buffers.drain(..).partition(|buffer| buffer.len() >= size);
                        *buffers = open;
                        full
                    };
                    for buffer in full {
                        next.next(buffer);
                    }
                })
                .on_complete(move || {
                    let remaining = core::mem::take(&mut *buffers.lock());
                    for buffer in remaining.into_iter().filter(|buffer| !buffer.is_empty()) {
                        on_complete.next(buffer);
                    }
                    on_complete.complete();
                })
        })
    }

    /// Collect values until the stream made by `closing` emits, then emit
    /// the buffer and start over with a fresh closing stream.
    ///
    /// A closing stream that completes without emitting leaves the current
    /// buffer open until the source completes.
    pub fn buffer_when<U, F>(&self, closing: F) -> Observable<Vec<T>>
    where
        U: Item,
        F: Fn() -> Observable<U> + Send + Sync + 'static,
    {
        let closing = Arc::new(closing);
        self.lift(move |downstream, _upstream| {
            let buffer: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
            let flushed = buffer.clone();
            let emit = downstream.clone();
            let fail = downstream.clone();
            let closing = closing.clone();
            let closings = Arc::new(Closings::new(
                downstream.subscription(),
                move || closing(),
                move || {
                    let values = core::mem::take(&mut *flushed.lock());
                    emit.next(values);
                },
                move |err| fail.error(err),
            ));
            Closings::arm(&closings);

            let collected = buffer.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| collected.lock().push(value))
                .on_complete(move || {
                    flush_remainder(&buffer, &on_complete);
                    on_complete.complete();
                })
        })
    }

    /// Split the source into consecutive windows of `size` values.
    ///
    /// The first window opens on subscribe. A zero `size` is clamped to one.
    pub fn window_count(&self, size: usize) -> Observable<Observable<T>> {
        let size = clamp_size(size, "window_count");
        self.lift(move |downstream, _upstream| {
            let window = Arc::new(Mutex::new(open_window(&downstream)));
            let seen = AtomicUsize::new(0);
            let current = window.clone();
            let next = downstream.clone();
            let (on_error, on_complete) = (window.clone(), window);
            let (error, done) = (downstream.clone(), downstream.clone());
            CallbackObserver::new()
                .on_next(move |value: T| {
                    let target = current.lock().clone();
                    target.next(value);
                    if (seen.fetch_add(1, Ordering::Relaxed) + 1) % size == 0 {
                        let replacement = open_window(&next);
                        let finished = core::mem::replace(&mut *current.lock(), replacement);
                        finished.complete();
                    }
                })
                .on_error(move |err: RxError| {
                    let target = on_error.lock().clone();
                    target.error(err.clone());
                    error.error(err);
                })
                .on_complete(move || {
                    let target = on_complete.lock().clone();
                    target.complete();
                    done.complete();
                })
        })
    }

    /// Split the source into windows closed whenever the stream made by
    /// `closing` emits.
    pub fn window_when<U, F>(&self, closing: F) -> Observable<Observable<T>>
    where
        U: Item,
        F: Fn() -> Observable<U> + Send + Sync + 'static,
    {
        let closing = Arc::new(closing);
        self.lift(move |downstream, _upstream| {
            let window = Arc::new(Mutex::new(open_window(&downstream)));
            let rotated = window.clone();
            let next = downstream.clone();
            let fail = downstream.clone();
            let closing = closing.clone();
            let closings = Arc::new(Closings::new(
                downstream.subscription(),
                move || closing(),
                move || {
                    let replacement = open_window(&next);
                    let finished = core::mem::replace(&mut *rotated.lock(), replacement);
                    finished.complete();
                },
                move |err| fail.error(err),
            ));
            Closings::arm(&closings);

            let current = window.clone();
            let (on_error, on_complete) = (window.clone(), window);
            let (error, done) = (downstream.clone(), downstream.clone());
            CallbackObserver::new()
                .on_next(move |value: T| {
                    let target = current.lock().clone();
                    target.next(value);
                })
                .on_error(move |err: RxError| {
                    let target = on_error.lock().clone();
                    target.error(err.clone());
                    error.error(err);
                })
                .on_complete(move || {
                    let target = on_complete.lock().clone();
                    target.complete();
                    done.complete();
                })
        })
    }
}

fn flush_remainder<T: Item>(buffer: &Arc<Mutex<Vec<T>>>, downstream: &Subscriber<Vec<T>>) {
    let remainder = core::mem::take(&mut *buffer.lock());
    if !remainder.is_empty() {
        downstream.next(remainder);
    }
}

/// Create a window and announce it downstream.
fn open_window<T: Item>(downstream: &Subscriber<Observable<T>>) -> Subject<T> {
    let window = Subject::new();
    downstream.next(window.as_observable());
    window
}

type Selector<U> = Box<dyn Fn() -> Observable<U> + Send + Sync + 'static>;
type Action = Box<dyn Fn() + Send + Sync + 'static>;
type ErrorAction = Box<dyn Fn(RxError) + Send + Sync + 'static>;

struct ClosingSlot {
    current: Option<Subscription>,
    arming: bool,
    rearm: bool,
}

/// The closing-notifier loop behind `buffer_when` and `window_when`.
///
/// Exactly one closing stream is subscribed at a time. Its first value runs
/// `on_close` and re-arms with a fresh stream. Re-arming from inside a
/// closing stream that emits during subscribe is picked up by the running
/// loop instead of recursing.
struct Closings<U> {
    parent: Subscription,
    selector: Selector<U>,
    on_close: Action,
    on_error: ErrorAction,
    slot: Mutex<ClosingSlot>,
}

impl<U: Item> Closings<U> {
    fn new<S, C, E>(parent: Subscription, selector: S, on_close: C, on_error: E) -> Self
    where
        S: Fn() -> Observable<U> + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
        E: Fn(RxError) + Send + Sync + 'static,
    {
        Self {
            parent,
            selector: Box::new(selector),
            on_close: Box::new(on_close),
            on_error: Box::new(on_error),
            slot: Mutex::new(ClosingSlot {
                current: None,
                arming: false,
                rearm: false,
            }),
        }
    }

    fn arm(closings: &Arc<Self>) {
        {
            let mut slot = closings.slot.lock();
            if slot.arming {
                slot.rearm = true;
                return;
            }
            slot.arming = true;
        }
        loop {
            let previous = closings.slot.lock().current.take();
            if let Some(previous) = previous {
                release_child(&closings.parent, &previous);
            }
            if closings.parent.is_closed() {
                closings.slot.lock().arming = false;
                return;
            }

            let child = closings.parent.child();
            closings.slot.lock().current = Some(child.clone());
            let notifier = (closings.selector)();
            let triggered = AtomicBool::new(false);
            let (fired, failed) = (closings.clone(), closings.clone());
            notifier.subscribe_with(Subscriber::with_subscription(
                CallbackObserver::new()
                    .on_next(move |_: U| {
                        if triggered.swap(true, Ordering::AcqRel) {
                            return;
                        }
                        (fired.on_close)();
                        Closings::arm(&fired);
                    })
                    .on_error(move |err| (failed.on_error)(err)),
                child,
            ));

            let again = {
                let mut slot = closings.slot.lock();
                if slot.rearm {
                    slot.rearm = false;
                    true
                } else {
                    slot.arming = false;
                    false
                }
            };
            if !again {
                return;
            }
        }
    }
}
