//! Combining several streams into one.

use std::collections::VecDeque;

use portable_atomic_util::Arc;
use spin::Mutex;

use crate::observable::forwarding;
use crate::{CallbackObserver, Item, Observable, Subscriber, Subscription};

/// Interleave values from every source as they arrive.
///
/// Completes once every source has completed.
pub fn merge<T: Item>(sources: Vec<Observable<T>>) -> Observable<T> {
    Observable::of(sources).merge_all()
}

/// Subscribe to each source in turn, moving on when the previous completes.
pub fn concat<T: Item>(sources: Vec<Observable<T>>) -> Observable<T> {
    Observable::of(sources).concat_all()
}

/// Emit one vector per index once every source has produced a value for it.
///
/// Completes as soon as a completed source has no queued values left.
/// With no sources, returns an empty stream.
pub fn zip<T: Item>(sources: Vec<Observable<T>>) -> Observable<Vec<T>> {
    zip_with(sources, |values| values)
}

/// Like [`zip`], passing each group through `project`.
pub fn zip_with<T, U, F>(sources: Vec<Observable<T>>, project: F) -> Observable<U>
where
    T: Item,
    U: Item,
    F: Fn(Vec<T>) -> U + Send + Sync + 'static,
{
    if sources.is_empty() {
        tracing::warn!("zip called without sources; returning an empty stream");
        return Observable::empty();
    }
    let project = Arc::new(project);
    Observable::create(move |downstream: Subscriber<U>| {
        let state = Arc::new(Mutex::new(ZipState {
            queues: sources.iter().map(|_| VecDeque::new()).collect::<Vec<VecDeque<T>>>(),
            completed: vec![false; sources.len()],
        }));
        let parent = downstream.subscription();
        for (index, source) in sources.iter().enumerate() {
            let (on_next, on_complete) = (state.clone(), state.clone());
            let (next, error, done) = (downstream.clone(), downstream.clone(), downstream.clone());
            let project = project.clone();
            source.subscribe_child(
                &parent,
                CallbackObserver::new()
                    .on_next(move |value: T| {
                        let (group, exhausted) = {
                            let mut state = on_next.lock();
                            state.queues[index].push_back(value);
                            match state.take_group() {
                                Some(group) => (Some(group), state.exhausted()),
                                None => (None, false),
                            }
                        };
                        if let Some(group) = group {
                            next.next(project(group));
                        }
                        if exhausted {
                            next.complete();
                        }
                    })
                    .on_error(move |err| error.error(err))
                    .on_complete(move || {
                        let exhausted = {
                            let mut state = on_complete.lock();
                            state.completed[index] = true;
                            state.queues[index].is_empty()
                        };
                        if exhausted {
                            done.complete();
                        }
                    }),
            );
        }
    })
}

struct ZipState<T> {
    queues: Vec<VecDeque<T>>,
    completed: Vec<bool>,
}

impl<T> ZipState<T> {
    /// Pop the front of every queue once all of them hold a value.
    fn take_group(&mut self) -> Option<Vec<T>> {
        if self.queues.iter().any(VecDeque::is_empty) {
            return None;
        }
        self.queues.iter_mut().map(VecDeque::pop_front).collect()
    }

    /// Whether some completed source has nothing left to pair.
    fn exhausted(&self) -> bool {
        self.queues
            .iter()
            .zip(&self.completed)
            .any(|(queue, completed)| *completed && queue.is_empty())
    }
}

/// Pair values from two sources by index.
pub fn zip2<A: Item, B: Item>(a: &Observable<A>, b: &Observable<B>) -> Observable<(A, B)> {
    let (a, b) = (a.clone(), b.clone());
    Observable::create(move |downstream: Subscriber<(A, B)>| {
        let state = Arc::new(Mutex::new(Zip2State {
            left: VecDeque::new(),
            right: VecDeque::new(),
            left_done: false,
            right_done: false,
        }));
        let parent = downstream.subscription();

        let (on_next, on_complete) = (state.clone(), state.clone());
        let (next, error, done) = (downstream.clone(), downstream.clone(), downstream.clone());
        a.subscribe_child(
            &parent,
            CallbackObserver::new()
                .on_next(move |value: A| {
                    let emission = {
                        let mut state = on_next.lock();
                        state.left.push_back(value);
                        state.take_pair()
                    };
                    emit_pair(&next, emission);
                })
                .on_error(move |err| error.error(err))
                .on_complete(move || {
                    let exhausted = {
                        let mut state = on_complete.lock();
                        state.left_done = true;
                        state.left.is_empty()
                    };
                    if exhausted {
                        done.complete();
                    }
                }),
        );

        let (on_next, on_complete) = (state.clone(), state);
        let (next, error, done) = (downstream.clone(), downstream.clone(), downstream);
        b.subscribe_child(
            &parent,
            CallbackObserver::new()
                .on_next(move |value: B| {
                    let emission = {
                        let mut state = on_next.lock();
                        state.right.push_back(value);
                        state.take_pair()
                    };
                    emit_pair(&next, emission);
                })
                .on_error(move |err| error.error(err))
                .on_complete(move || {
                    let exhausted = {
                        let mut state = on_complete.lock();
                        state.right_done = true;
                        state.right.is_empty()
                    };
                    if exhausted {
                        done.complete();
                    }
                }),
        );
    })
}

struct Zip2State<A, B> {
    left: VecDeque<A>,
    right: VecDeque<B>,
    left_done: bool,
    right_done: bool,
}

impl<A, B> Zip2State<A, B> {
    /// The next pair, and whether the zip is exhausted after taking it.
    fn take_pair(&mut self) -> Option<((A, B), bool)> {
        if self.left.is_empty() || self.right.is_empty() {
            return None;
        }
        let pair = (self.left.pop_front()?, self.right.pop_front()?);
        let exhausted = (self.left_done && self.left.is_empty()) || (self.right_done && self.right.is_empty());
        Some((pair, exhausted))
    }
}

fn emit_pair<P: Item>(downstream: &Subscriber<P>, emission: Option<(P, bool)>) {
    if let Some((pair, exhausted)) = emission {
        downstream.next(pair);
        if exhausted {
            downstream.complete();
        }
    }
}

/// Triple values from three sources by index.
pub fn zip3<A: Item, B: Item, C: Item>(
    a: &Observable<A>,
    b: &Observable<B>,
    c: &Observable<C>,
) -> Observable<(A, B, C)> {
    zip2(&zip2(a, b), c).map(|((a, b), c)| (a, b, c))
}

/// Emit the latest value of every source whenever any of them emits, once
/// all of them have emitted at least once.
///
/// Completes when every source has completed, or as soon as one completes
/// without ever emitting. With no sources, returns an empty stream.
pub fn combine_latest<T: Item>(sources: Vec<Observable<T>>) -> Observable<Vec<T>> {
    combine_latest_with(sources, |values| values)
}

/// Like [`combine_latest`], passing each snapshot through `project`.
pub fn combine_latest_with<T, U, F>(sources: Vec<Observable<T>>, project: F) -> Observable<U>
where
    T: Item,
    U: Item,
    F: Fn(Vec<T>) -> U + Send + Sync + 'static,
{
    if sources.is_empty() {
        tracing::warn!("combine_latest called without sources; returning an empty stream");
        return Observable::empty();
    }
    let project = Arc::new(project);
    Observable::create(move |downstream: Subscriber<U>| {
        let state = Arc::new(Mutex::new(LatestState {
            latest: sources.iter().map(|_| None).collect::<Vec<Option<T>>>(),
            seen: 0,
            ready: false,
            completed: 0,
        }));
        let parent = downstream.subscription();
        let total = sources.len();
        for (index, source) in sources.iter().enumerate() {
            let (on_next, on_complete) = (state.clone(), state.clone());
            let (next, error, done) = (downstream.clone(), downstream.clone(), downstream.clone());
            let project = project.clone();
            source.subscribe_child(
                &parent,
                CallbackObserver::new()
                    .on_next(move |value: T| {
                        let snapshot = {
                            let mut state = on_next.lock();
                            if state.latest[index].is_none() {
                                state.seen += 1;
                                state.ready = state.seen == total;
                            }
                            state.latest[index] = Some(value);
                            if state.ready {
                                state.latest.iter().cloned().collect::<Option<Vec<T>>>()
                            } else {
                                None
                            }
                        };
                        if let Some(snapshot) = snapshot {
                            next.next(project(snapshot));
                        }
                    })
                    .on_error(move |err| error.error(err))
                    .on_complete(move || {
                        let finished = {
                            let mut state = on_complete.lock();
                            state.completed += 1;
                            state.completed == total || state.latest[index].is_none()
                        };
                        if finished {
                            done.complete();
                        }
                    }),
            );
        }
    })
}

struct LatestState<T> {
    latest: Vec<Option<T>>,
    seen: usize,
    ready: bool,
    completed: usize,
}

/// Emit the latest pair from two sources whenever either emits, once both
/// have emitted.
pub fn combine_latest2<A: Item, B: Item>(a: &Observable<A>, b: &Observable<B>) -> Observable<(A, B)> {
    let (a, b) = (a.clone(), b.clone());
    Observable::create(move |downstream: Subscriber<(A, B)>| {
        let state: Arc<Mutex<Latest2<A, B>>> = Arc::new(Mutex::new(Latest2 {
            left: None,
            right: None,
            completed: 0,
        }));
        let parent = downstream.subscription();

        let (on_next, on_complete) = (state.clone(), state.clone());
        let (next, error, done) = (downstream.clone(), downstream.clone(), downstream.clone());
        a.subscribe_child(
            &parent,
            CallbackObserver::new()
                .on_next(move |value: A| {
                    let pair = {
                        let mut state = on_next.lock();
                        state.left = Some(value);
                        state.pair()
                    };
                    if let Some(pair) = pair {
                        next.next(pair);
                    }
                })
                .on_error(move |err| error.error(err))
                .on_complete(move || {
                    let finished = {
                        let mut state = on_complete.lock();
                        state.completed += 1;
                        state.completed == 2 || state.left.is_none()
                    };
                    if finished {
                        done.complete();
                    }
                }),
        );

        let (on_next, on_complete) = (state.clone(), state);
        let (next, error, done) = (downstream.clone(), downstream.clone(), downstream);
        b.subscribe_child(
            &parent,
            CallbackObserver::new()
                .on_next(move |value: B| {
                    let pair = {
                        let mut state = on_next.lock();
                        state.right = Some(value);
                        state.pair()
                    };
                    if let Some(pair) = pair {
                        next.next(pair);
                    }
                })
                .on_error(move |err| error.error(err))
                .on_complete(move || {
                    let finished = {
                        let mut state = on_complete.lock();
                        state.completed += 1;
                        state.completed == 2 || state.right.is_none()
                    };
                    if finished {
                        done.complete();
                    }
                }),
        );
    })
}

struct Latest2<A, B> {
    left: Option<A>,
    right: Option<B>,
    completed: usize,
}

impl<A: Clone, B: Clone> Latest2<A, B> {
    fn pair(&self) -> Option<(A, B)> {
        Some((self.left.clone()?, self.right.clone()?))
    }
}

/// Mirror whichever source notifies first and drop the rest.
///
/// A source that emits during its own subscribe wins immediately, and the
/// sources after it are never subscribed. With no sources, returns an empty
/// stream.
pub fn race<T: Item>(sources: Vec<Observable<T>>) -> Observable<T> {
    if sources.is_empty() {
        tracing::warn!("race called without sources; returning an empty stream");
        return Observable::empty();
    }
    Observable::create(move |downstream: Subscriber<T>| {
        let race = Arc::new(Race {
            winner: Mutex::new(None),
            entrants: Mutex::new(Vec::new()),
            parent: downstream.subscription(),
        });
        for (index, source) in sources.iter().enumerate() {
            if race.winner.lock().is_some() {
                break;
            }
            let child = race.parent.child();
            race.entrants.lock().push((index, child.clone()));

            let (on_next, on_error, on_complete) = (race.clone(), race.clone(), race.clone());
            let (next, error, done) = (downstream.clone(), downstream.clone(), downstream.clone());
            source.subscribe_with(Subscriber::with_subscription(
                CallbackObserver::new()
                    .on_next(move |value| {
                        if Race::claim(&on_next, index) {
                            next.next(value);
                        }
                    })
                    .on_error(move |err| {
                        if Race::claim(&on_error, index) {
                            error.error(err);
                        }
                    })
                    .on_complete(move || {
                        if Race::claim(&on_complete, index) {
                            done.complete();
                        }
                    }),
                child,
            ));
        }
    })
}

struct Race {
    winner: Mutex<Option<usize>>,
    entrants: Mutex<Vec<(usize, Subscription)>>,
    parent: Subscription,
}

impl Race {
    /// Whether `index` may deliver. The first caller wins and every other
    /// entrant is unsubscribed.
    fn claim(race: &Arc<Self>, index: usize) -> bool {
        {
            let mut winner = race.winner.lock();
            match *winner {
                Some(current) => return current == index,
                None => *winner = Some(index),
            }
        }
        tracing::trace!(index, "race decided");
        let losers: Vec<Subscription> = race
            .entrants
            .lock()
            .drain(..)
            .filter(|(entrant, _)| *entrant != index)
            .map(|(_, subscription)| subscription)
            .collect();
        for loser in losers {
            race.parent.remove(&loser);
            loser.unsubscribe();
        }
        true
    }
}

impl<T: Item> Observable<T> {
    /// Merge this stream with `other`.
    pub fn merge_with(&self, other: &Observable<T>) -> Observable<T> {
        merge(vec![self.clone(), other.clone()])
    }

    /// Continue with `other` once this stream completes.
    pub fn concat_with(&self, other: &Observable<T>) -> Observable<T> {
        concat(vec![self.clone(), other.clone()])
    }

    /// Race this stream against `other`.
    pub fn race_with(&self, other: &Observable<T>) -> Observable<T> {
        race(vec![self.clone(), other.clone()])
    }

    /// Emit `values` before the values of this stream.
    pub fn start_with(&self, values: Vec<T>) -> Observable<T> {
        concat(vec![Observable::of(values), self.clone()])
    }

    /// Pair each value with the latest value of `other`.
    ///
    /// Only this stream triggers emissions; values arriving before `other`
    /// has emitted are dropped. Completion of `other` is ignored.
    pub fn with_latest_from<U: Item>(&self, other: &Observable<U>) -> Observable<(T, U)> {
        let other = other.clone();
        self.lift(move |downstream, _upstream| {
            let latest: Arc<Mutex<Option<U>>> = Arc::new(Mutex::new(None));
            let slot = latest.clone();
            let error = downstream.clone();
            other.subscribe_child(
                &downstream.subscription(),
                CallbackObserver::new()
                    .on_next(move |value: U| *slot.lock() = Some(value))
                    .on_error(move |err| error.error(err)),
            );

            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value: T| {
                let other = latest.lock().clone();
                if let Some(other) = other {
                    next.next((value, other));
                }
            })
        })
    }

    /// Pair each value with the latest value of every stream in `others`.
    ///
    /// Emits only once all of `others` have emitted.
    pub fn with_latest_from_all<U: Item>(&self, others: Vec<Observable<U>>) -> Observable<(T, Vec<U>)> {
        self.lift(move |downstream, _upstream| {
            let latest: Arc<Mutex<Vec<Option<U>>>> = Arc::new(Mutex::new(others.iter().map(|_| None).collect()));
            let parent = downstream.subscription();
            for (index, other) in others.iter().enumerate() {
                let slot = latest.clone();
                let error = downstream.clone();
                other.subscribe_child(
                    &parent,
                    CallbackObserver::new()
                        .on_next(move |value: U| slot.lock()[index] = Some(value))
                        .on_error(move |err| error.error(err)),
                );
            }

            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value: T| {
                let snapshot = latest.lock().iter().cloned().collect::<Option<Vec<U>>>();
                if let Some(snapshot) = snapshot {
                    next.next((value, snapshot));
                }
            })
        })
    }
}
