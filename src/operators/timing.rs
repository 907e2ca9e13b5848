//! Rate shaping and delays.
//!
//! Every operator here takes the [`Scheduler`] its timers run on. Each one
//! tracks upstream completion separately from its own open window (a pending
//! timer, a held value, an undelivered delay) and forwards `complete` only
//! once the source has completed *and* nothing is left in flight.

use core::time::Duration;

use portable_atomic_util::Arc;
use spin::Mutex;

use crate::observable::forwarding;
use crate::{CallbackObserver, Item, Observable, RxError, Scheduler, Subscriber, Subscription, Teardown};

/// Run `f` after `delay` under a child of `parent`.
///
/// The child detaches itself from `parent` when it fires. Unsubscribing
/// `parent` or the returned child cancels the timer.
fn schedule_child<S, F>(scheduler: &S, parent: &Subscription, delay: Duration, f: F) -> Subscription
where
    S: Scheduler,
    F: FnOnce() + Send + 'static,
{
    let timer = parent.child();
    let own = timer.clone();
    let owner = parent.clone();
    let id = scheduler.schedule(
        delay,
        Box::new(move || {
            if own.is_closed() {
                return;
            }
            owner.remove(&own);
            own.unsubscribe();
            f();
        }),
    );
    let canceller = scheduler.clone();
    timer.add(Teardown::from_fn(move || canceller.cancel(id)));
    timer
}

/// Cancel `child` and drop it from `parent`.
pub(crate) fn release_child(parent: &Subscription, child: &Subscription) {
    parent.remove(child);
    child.unsubscribe();
}

struct Debounce<T> {
    latest: Option<T>,
    timer: Option<Subscription>,
    input_completed: bool,
}

struct Gate {
    window_open: bool,
    input_completed: bool,
}

impl Gate {
    fn new() -> Self {
        Self {
            window_open: false,
            input_completed: false,
        }
    }
}

struct Held<T> {
    latest: Option<T>,
    window_open: bool,
    input_completed: bool,
}

struct InFlight {
    pending: usize,
    input_completed: bool,
}

impl<T: Item> Observable<T> {
    /// Emit a value only after `due` has passed without another one.
    ///
    /// Each value restarts the timer. If the source completes while a value
    /// is held, completion follows that value once its timer fires.
    pub fn debounce_time<S: Scheduler>(&self, due: Duration, scheduler: S) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let state = Arc::new(Mutex::new(Debounce {
                latest: None,
                timer: None,
                input_completed: false,
            }));
            let scheduler = scheduler.clone();
            let on_next = state.clone();
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| {
                    let parent = next.subscription();
                    let previous = {
                        let mut state = on_next.lock();
                        state.latest = Some(value);
                        state.timer.take()
                    };
                    if let Some(previous) = previous {
                        release_child(&parent, &previous);
                    }

                    let fired = on_next.clone();
                    let emit = next.clone();
                    let timer = schedule_child(&scheduler, &parent, due, move || {
                        let (value, complete) = {
                            let mut state = fired.lock();
                            state.timer = None;
                            (state.latest.take(), state.input_completed)
                        };
                        if let Some(value) = value {
                            emit.next(value);
                        }
                        if complete {
                            emit.complete();
                        }
                    });
                    let mut state = on_next.lock();
                    if state.latest.is_some() {
                        state.timer = Some(timer);
                    }
                })
                .on_complete(move || {
                    let complete = {
                        let mut state = state.lock();
                        state.input_completed = true;
                        state.latest.is_none()
                    };
                    if complete {
                        on_complete.complete();
                    }
                })
        })
    }

    /// Emit a value, then ignore the source for `duration`.
    pub fn throttle_time<S: Scheduler>(&self, duration: Duration, scheduler: S) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let gate = Arc::new(Mutex::new(Gate::new()));
            let scheduler = scheduler.clone();
            let on_next = gate.clone();
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| {
                    {
                        let mut gate = on_next.lock();
                        if gate.window_open {
                            return;
                        }
                        gate.window_open = true;
                    }
                    let closing = on_next.clone();
                    let done = next.clone();
                    schedule_child(&scheduler, &next.subscription(), duration, move || {
                        let complete = {
                            let mut gate = closing.lock();
                            gate.window_open = false;
                            gate.input_completed
                        };
                        if complete {
                            done.complete();
                        }
                    });
                    next.next(value);
                })
                .on_complete(move || {
                    let complete = {
                        let mut gate = gate.lock();
                        gate.input_completed = true;
                        !gate.window_open
                    };
                    if complete {
                        on_complete.complete();
                    }
                })
        })
    }

    /// On a value, wait `duration` and then emit the most recent value.
    pub fn audit_time<S: Scheduler>(&self, duration: Duration, scheduler: S) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let state = Arc::new(Mutex::new(Held {
                latest: None,
                window_open: false,
                input_completed: false,
            }));
            let scheduler = scheduler.clone();
            let on_next = state.clone();
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| {
                    {
                        let mut state = on_next.lock();
                        state.latest = Some(value);
                        if state.window_open {
                            return;
                        }
                        state.window_open = true;
                    }
                    let fired = on_next.clone();
                    let emit = next.clone();
                    schedule_child(&scheduler, &next.subscription(), duration, move || {
                        let (value, complete) = {
                            let mut state = fired.lock();
                            state.window_open = false;
                            (state.latest.take(), state.input_completed)
                        };
                        if let Some(value) = value {
                            emit.next(value);
                        }
                        if complete {
                            emit.complete();
                        }
                    });
                })
                .on_complete(move || {
                    let complete = {
                        let mut state = state.lock();
                        state.input_completed = true;
                        !state.window_open
                    };
                    if complete {
                        on_complete.complete();
                    }
                })
        })
    }

    /// Every `period`, emit the most recent value if a new one arrived.
    ///
    /// A value still unsampled when the source completes is emitted on the
    /// next tick, followed by completion.
    pub fn sample_time<S: Scheduler>(&self, period: Duration, scheduler: S) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let state = Arc::new(Mutex::new(Held {
                latest: None,
                window_open: false,
                input_completed: false,
            }));
            let sampled = state.clone();
            let emit = downstream.clone();
            let ticks = scheduler.schedule_periodic(period, move || {
                let (value, complete) = {
                    let mut state = sampled.lock();
                    (state.latest.take(), state.input_completed)
                };
                if let Some(value) = value {
                    emit.next(value);
                }
                if complete {
                    emit.complete();
                }
            });
            downstream.add(ticks);

            let on_next = state.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| on_next.lock().latest = Some(value))
                .on_complete(move || {
                    let complete = {
                        let mut state = state.lock();
                        state.input_completed = true;
                        state.latest.is_none()
                    };
                    if complete {
                        on_complete.complete();
                    }
                })
        })
    }

    /// Collect values into a vector emitted every `span`.
    ///
    /// A vector is emitted on every tick, empty or not. On completion the
    /// values collected since the last tick are emitted if there are any.
    pub fn buffer_time<S: Scheduler>(&self, span: Duration, scheduler: S) -> Observable<Vec<T>> {
        self.lift(move |downstream, _upstream| {
            let buffer: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
            let flushed = buffer.clone();
            let emit = downstream.clone();
            let ticks = scheduler.schedule_periodic(span, move || {
                let values = core::mem::take(&mut *flushed.lock());
                emit.next(values);
            });
            downstream.add(ticks);

            let collected = buffer.clone();
            let on_error = downstream.clone();
            let on_complete = downstream.clone();
            CallbackObserver::new()
                .on_next(move |value: T| collected.lock().push(value))
                .on_error(move |err| on_error.error(err))
                .on_complete(move || {
                    let remainder = core::mem::take(&mut *buffer.lock());
                    if !remainder.is_empty() {
                        on_complete.next(remainder);
                    }
                    on_complete.complete();
                })
        })
    }

    /// Shift every value later by `delay`. Errors are not delayed.
    pub fn delay<S: Scheduler>(&self, delay: Duration, scheduler: S) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let state = Arc::new(Mutex::new(InFlight {
                pending: 0,
                input_completed: false,
            }));
            let scheduler = scheduler.clone();
            let on_next = state.clone();
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| {
                    on_next.lock().pending += 1;
                    let delivered = on_next.clone();
                    let emit = next.clone();
                    schedule_child(&scheduler, &next.subscription(), delay, move || {
                        emit.next(value);
                        settle(&delivered, &emit);
                    });
                })
                .on_complete(move || {
                    let complete = {
                        let mut state = state.lock();
                        state.input_completed = true;
                        state.pending == 0
                    };
                    if complete {
                        on_complete.complete();
                    }
                })
        })
    }

    /// Hold each value until the stream `selector` returns for it emits.
    ///
    /// Only the notifier's first value releases the held value. A notifier
    /// that completes without emitting drops it.
    pub fn delay_when<U, F>(&self, selector: F) -> Observable<T>
    where
        U: Item,
        F: Fn(&T) -> Observable<U> + Send + Sync + 'static,
    {
        let selector = Arc::new(selector);
        self.lift(move |downstream, _upstream| {
            let selector = selector.clone();
            let state = Arc::new(Mutex::new(InFlight {
                pending: 0,
                input_completed: false,
            }));
            let on_next = state.clone();
            let next = downstream.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value: T| {
                    let notifier = selector(&value);
                    on_next.lock().pending += 1;

                    let parent = next.subscription();
                    let child = parent.child();
                    let held = Arc::new(Mutex::new(Some(value)));
                    let released = held.clone();
                    let (own, owner) = (child.clone(), parent.clone());
                    let (fired, emit) = (on_next.clone(), next.clone());
                    let (dropped, skip) = (on_next.clone(), next.clone());
                    let (own_done, owner_done) = (child.clone(), parent);
                    let fail = next.clone();
                    notifier.subscribe_with(Subscriber::with_subscription(
                        CallbackObserver::new()
                            .on_next(move |_: U| {
                                let value = released.lock().take();
                                if let Some(value) = value {
                                    release_child(&owner, &own);
                                    emit.next(value);
                                    settle(&fired, &emit);
                                }
                            })
                            .on_error(move |err| fail.error(err))
                            .on_complete(move || {
                                let value = held.lock().take();
                                owner_done.remove(&own_done);
                                if value.is_some() {
                                    settle(&dropped, &skip);
                                }
                            }),
                        child,
                    ));
                })
                .on_complete(move || {
                    let complete = {
                        let mut state = state.lock();
                        state.input_completed = true;
                        state.pending == 0
                    };
                    if complete {
                        on_complete.complete();
                    }
                })
        })
    }

    /// Error with [`RxError::Timeout`] if `due` passes without a value.
    ///
    /// The timer starts on subscribe and restarts after every value.
    pub fn timeout<S: Scheduler>(&self, due: Duration, scheduler: S) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let timer: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
            arm_timeout(&timer, &downstream, &scheduler, due);

            let scheduler = scheduler.clone();
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value: T| {
                arm_timeout(&timer, &next, &scheduler, due);
                next.next(value);
            })
        })
    }
}

/// Mark one in-flight value delivered and complete if it was the last one
/// after the source completed.
fn settle<T: Item>(state: &Arc<Mutex<InFlight>>, downstream: &Subscriber<T>) {
    let complete = {
        let mut state = state.lock();
        state.pending -= 1;
        state.input_completed && state.pending == 0
    };
    if complete {
        downstream.complete();
    }
}

fn arm_timeout<T: Item, S: Scheduler>(
    slot: &Arc<Mutex<Option<Subscription>>>,
    downstream: &Subscriber<T>,
    scheduler: &S,
    due: Duration,
) {
    let parent = downstream.subscription();
    if let Some(previous) = slot.lock().take() {
        release_child(&parent, &previous);
    }
    let expired = downstream.clone();
    let timer = schedule_child(scheduler, &parent, due, move || {
        tracing::debug!(?due, "stream timed out");
        expired.error(RxError::Timeout(due));
    });
    *slot.lock() = Some(timer);
}
