//! Flattening of higher-order streams.
//!
//! Each strategy subscribes to the outer stream and decides what to do with
//! every inner stream it emits:
//!
//! | strategy  | on a new inner stream                          |
//! |-----------|------------------------------------------------|
//! | merge     | subscribe immediately, run all concurrently    |
//! | concat    | queue it, subscribe when the current one ends  |
//! | switch    | cancel the current one, subscribe the new one  |
//! | exhaust   | drop it while the current one is still running |
//!
//! The result completes once the outer stream and every inner stream it
//! kept have completed. An error from any of them is forwarded immediately.

use std::collections::VecDeque;

use portable_atomic_util::Arc;
use spin::Mutex;

use crate::{CallbackObserver, Item, Observable, Subscriber, Subscription};

impl<T: Item> Observable<Observable<T>> {
    /// Subscribe to every inner stream as it arrives.
    pub fn merge_all(&self) -> Observable<T> {
        flatten_limited(self, usize::MAX)
    }

    /// Subscribe to inner streams one at a time, in arrival order.
    ///
    /// Inner streams emitted while another is running are buffered.
    pub fn concat_all(&self) -> Observable<T> {
        flatten_limited(self, 1)
    }

    /// Follow only the most recent inner stream.
    pub fn switch_all(&self) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let switch = Arc::new(Switch {
                downstream: downstream.clone(),
                state: Mutex::new(SwitchState {
                    generation: 0,
                    current: None,
                    outer_done: false,
                }),
            });
            let on_next = switch.clone();
            let on_error = downstream.clone();
            CallbackObserver::new()
                .on_next(move |inner| Switch::follow(&on_next, inner))
                .on_error(move |err| on_error.error(err))
                .on_complete(move || Switch::outer_complete(&switch))
        })
    }

    /// Ignore inner streams that arrive while one is still running.
    pub fn exhaust_all(&self) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let state = Arc::new(Mutex::new(ExhaustState {
                busy: false,
                outer_done: false,
            }));
            let on_next = state.clone();
            let next_downstream = downstream.clone();
            let on_error = downstream.clone();
            let on_complete = downstream.clone();
            CallbackObserver::new()
                .on_next(move |inner: Observable<T>| {
                    {
                        let mut state = on_next.lock();
                        if state.busy {
                            return;
                        }
                        state.busy = true;
                    }
                    let finished = on_next.clone();
                    let done = next_downstream.clone();
                    subscribe_inner(&next_downstream, &inner, move || {
                        let complete = {
                            let mut state = finished.lock();
                            state.busy = false;
                            state.outer_done
                        };
                        if complete {
                            done.complete();
                        }
                    });
                })
                .on_error(move |err| on_error.error(err))
                .on_complete(move || {
                    let complete = {
                        let mut state = state.lock();
                        state.outer_done = true;
                        !state.busy
                    };
                    if complete {
                        on_complete.complete();
                    }
                })
        })
    }
}

impl<T: Item> Observable<T> {
    /// Map each value to a stream and merge the results.
    pub fn merge_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Item,
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
    {
        self.map(f).merge_all()
    }

    /// Map each value to a stream and concatenate the results in order.
    pub fn concat_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Item,
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
    {
        self.map(f).concat_all()
    }

    /// Map each value to a stream, following only the latest one.
    pub fn switch_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Item,
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
    {
        self.map(f).switch_all()
    }

    /// Map each value to a stream, ignoring values that arrive while the
    /// previous stream is still running.
    pub fn exhaust_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Item,
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
    {
        self.map(f).exhaust_all()
    }
}

/// Subscribe `inner` as a child of `downstream`, forwarding values and
/// errors. `on_complete` runs after the child is detached from the parent.
fn subscribe_inner<T, C>(downstream: &Subscriber<T>, inner: &Observable<T>, on_complete: C)
where
    T: Item,
    C: Fn() + Send + Sync + 'static,
{
    let parent = downstream.subscription();
    let child = parent.child();
    let own = child.clone();
    let next = downstream.clone();
    let error = downstream.clone();
    inner.subscribe_with(Subscriber::with_subscription(
        CallbackObserver::new()
            .on_next(move |value| next.next(value))
            .on_error(move |err| error.error(err))
            .on_complete(move || {
                parent.remove(&own);
                on_complete();
            }),
        child,
    ));
}

fn flatten_limited<T: Item>(outer: &Observable<Observable<T>>, concurrent: usize) -> Observable<T> {
    let concurrent = concurrent.max(1);
    outer.lift(move |downstream, _upstream| {
        let merger = Arc::new(Merger {
            downstream: downstream.clone(),
            concurrent,
            state: Mutex::new(MergeState {
                active: 0,
                queue: VecDeque::new(),
                outer_done: false,
                draining: false,
            }),
        });
        let on_next = merger.clone();
        let on_error = downstream.clone();
        CallbackObserver::new()
            .on_next(move |inner| {
                on_next.state.lock().queue.push_back(inner);
                Merger::drain(&on_next);
            })
            .on_error(move |err| on_error.error(err))
            .on_complete(move || {
                merger.state.lock().outer_done = true;
                Merger::drain(&merger);
            })
    })
}

struct MergeState<T> {
    active: usize,
    queue: VecDeque<Observable<T>>,
    outer_done: bool,
    draining: bool,
}

struct Merger<T> {
    downstream: Subscriber<T>,
    concurrent: usize,
    state: Mutex<MergeState<T>>,
}

enum Step<T> {
    Subscribe(Observable<T>),
    Complete,
    Idle,
}

impl<T: Item> Merger<T> {
    /// Start queued inner streams while capacity allows, and complete once
    /// nothing is left.
    ///
    /// Only one caller drains at a time. A caller that finds a drain in
    /// progress leaves its state change for the running loop to pick up, so
    /// inner streams that complete synchronously never recurse.
    fn drain(merger: &Arc<Self>) {
        {
            let mut state = merger.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        loop {
            let step = {
                let mut state = merger.state.lock();
                if state.active < merger.concurrent && !state.queue.is_empty() {
                    state.active += 1;
                    match state.queue.pop_front() {
                        Some(inner) => Step::Subscribe(inner),
                        None => Step::Idle,
                    }
                } else {
                    state.draining = false;
                    if state.outer_done && state.active == 0 && state.queue.is_empty() {
                        Step::Complete
                    } else {
                        Step::Idle
                    }
                }
            };
            match step {
                Step::Subscribe(inner) => {
                    let finished = merger.clone();
                    subscribe_inner(&merger.downstream, &inner, move || {
                        finished.state.lock().active -= 1;
                        Merger::drain(&finished);
                    });
                }
                Step::Complete => {
                    merger.downstream.complete();
                    return;
                }
                Step::Idle => return,
            }
        }
    }
}

struct SwitchState {
    generation: u64,
    current: Option<Subscription>,
    outer_done: bool,
}

struct Switch<T> {
    downstream: Subscriber<T>,
    state: Mutex<SwitchState>,
}

impl<T: Item> Switch<T> {
    fn follow(switch: &Arc<Self>, inner: Observable<T>) {
        let (generation, previous) = {
            let mut state = switch.state.lock();
            state.generation += 1;
            (state.generation, state.current.take())
        };
        if let Some(previous) = previous {
            switch.downstream.subscription().remove(&previous);
            previous.unsubscribe();
        }

        let parent = switch.downstream.subscription();
        let child = parent.child();
        {
            let mut state = switch.state.lock();
            if state.generation != generation {
                return;
            }
            state.current = Some(child.clone());
        }

        let next = switch.clone();
        let error = switch.downstream.clone();
        let finished = switch.clone();
        let own = child.clone();
        inner.subscribe_with(Subscriber::with_subscription(
            CallbackObserver::new()
                .on_next(move |value| {
                    if next.state.lock().generation == generation {
                        next.downstream.next(value);
                    }
                })
                .on_error(move |err| error.error(err))
                .on_complete(move || {
                    parent.remove(&own);
                    let complete = {
                        let mut state = finished.state.lock();
                        if state.generation != generation {
                            return;
                        }
                        state.current = None;
                        state.outer_done
                    };
                    if complete {
                        finished.downstream.complete();
                    }
                }),
            child,
        ));
    }

    fn outer_complete(switch: &Arc<Self>) {
        let complete = {
            let mut state = switch.state.lock();
            state.outer_done = true;
            state.current.is_none()
        };
        if complete {
            switch.downstream.complete();
        }
    }
}

struct ExhaustState {
    busy: bool,
    outer_done: bool,
}
