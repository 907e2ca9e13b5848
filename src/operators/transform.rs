//! Value-by-value transformations.

use core::ops::Index;
use core::sync::atomic::{AtomicUsize, Ordering};

use portable_atomic_util::Arc;
use spin::Mutex;

use crate::observable::forwarding;
use crate::{CallbackObserver, Item, Notification, Observable, RxError};

impl<T: Item> Observable<T> {
    /// Transform each value with `f`.
    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Item,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream, _upstream| {
            let f = f.clone();
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value| next.next(f(value)))
        })
    }

    /// Transform each value with a fallible `f`.
    ///
    /// The first `Err` is sent downstream as an error and the source is
    /// unsubscribed.
    pub fn try_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Item,
        F: Fn(T) -> Result<U, RxError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream, _upstream| {
            let f = f.clone();
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value| match f(value) {
                Ok(mapped) => next.next(mapped),
                Err(err) => next.error(err),
            })
        })
    }

    /// Replace every value with `value`.
    pub fn map_to<U: Item>(&self, value: U) -> Observable<U> {
        self.map(move |_| value.clone())
    }

    /// Project each value to the element stored under `key`.
    pub fn pluck<K, U>(&self, key: K) -> Observable<U>
    where
        T: Index<K, Output = U>,
        K: Clone + Send + Sync + 'static,
        U: Item,
    {
        self.map(move |value| value[key.clone()].clone())
    }

    /// Run a side effect for each value and pass it through unchanged.
    pub fn tap<F>(&self, f: F) -> Observable<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream, _upstream| {
            let f = f.clone();
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value| {
                f(&value);
                next.next(value);
            })
        })
    }

    /// Emit a running accumulator.
    ///
    /// For each value the accumulator *as it stood before that value* is
    /// emitted, and only then is `f` applied. With seed `0` and addition,
    /// `1, 2, 3` therefore produces `0, 1, 3`.
    pub fn scan<A, F>(&self, seed: A, f: F) -> Observable<A>
    where
        A: Item,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream, _upstream| {
            let f = f.clone();
            let accumulator = Arc::new(Mutex::new(seed.clone()));
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value| {
                let previous = accumulator.lock().clone();
                next.next(previous.clone());
                let updated = f(previous, value);
                *accumulator.lock() = updated;
            })
        })
    }

    /// Fold every value into one, emitted when the source completes.
    pub fn reduce<A, F>(&self, seed: A, f: F) -> Observable<A>
    where
        A: Item,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream, _upstream| {
            let f = f.clone();
            let accumulator = Arc::new(Mutex::new(Some(seed.clone())));
            let folded = accumulator.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |value| {
                    let mut accumulator = accumulator.lock();
                    if let Some(current) = accumulator.take() {
                        *accumulator = Some(f(current, value));
                    }
                })
                .on_complete(move || {
                    let result = folded.lock().take();
                    if let Some(result) = result {
                        on_complete.next(result);
                    }
                    on_complete.complete();
                })
        })
    }

    /// Emit each value paired with the one before it.
    pub fn pairwise(&self) -> Observable<(T, T)> {
        self.lift(move |downstream, _upstream| {
            let previous: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value: T| {
                let before = previous.lock().replace(value.clone());
                if let Some(before) = before {
                    next.next((before, value));
                }
            })
        })
    }

    /// Collect every value, emitted as one vector on completion.
    pub fn to_vec(&self) -> Observable<Vec<T>> {
        self.reduce(Vec::new(), |mut values, value| {
            values.push(value);
            values
        })
    }

    /// Count the values, emitted on completion.
    pub fn count(&self) -> Observable<usize> {
        self.lift(move |downstream, _upstream| {
            let seen = Arc::new(AtomicUsize::new(0));
            let total = seen.clone();
            let on_complete = downstream.clone();
            forwarding(&downstream)
                .on_next(move |_| {
                    seen.fetch_add(1, Ordering::Relaxed);
                })
                .on_complete(move || {
                    on_complete.next(total.load(Ordering::Relaxed));
                    on_complete.complete();
                })
        })
    }

    /// Turn every notification, terminal ones included, into a value.
    pub fn materialize(&self) -> Observable<Notification<T>> {
        self.lift(move |downstream, _upstream| {
            let (next, error, complete) = (downstream.clone(), downstream.clone(), downstream);
            CallbackObserver::new()
                .on_next(move |value| next.next(Notification::Next(value)))
                .on_error(move |err| {
                    error.next(Notification::Error(err));
                    error.complete();
                })
                .on_complete(move || {
                    complete.next(Notification::Complete);
                    complete.complete();
                })
        })
    }
}

impl<T: Item> Observable<Notification<T>> {
    /// Reverse of [`materialize`](Observable::materialize).
    pub fn dematerialize(&self) -> Observable<T> {
        self.lift(move |downstream, _upstream| {
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |notification: Notification<T>| {
                notification.deliver(&next)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestObserver;
    use std::collections::HashMap;

    #[test]
    fn given_map_should_transform_each_value() {
        let observer = TestObserver::new();
        Observable::of(vec![1, 2, 3]).map(|v| v * 2).subscribe(observer.clone());

        assert_eq!(observer.values(), vec![2, 4, 6]);
        assert!(observer.is_completed());
    }

    #[test]
    fn given_a_failing_try_map_should_error_and_stop() {
        let observer = TestObserver::new();
        Observable::of(vec![1, 0, 2])
            .try_map(|v| {
                if v == 0 {
                    Err(RxError::msg("division by zero"))
                } else {
                    Ok(10 / v)
                }
            })
            .subscribe(observer.clone());

        assert_eq!(observer.values(), vec![10]);
        assert_eq!(observer.error(), Some(RxError::msg("division by zero")));
        assert!(!observer.is_completed());
    }

    #[test]
    fn given_scan_should_emit_the_accumulator_before_each_step() {
        let observer = TestObserver::new();
        Observable::of(vec![1, 2, 3])
            .scan(0, |acc, v| acc + v)
            .subscribe(observer.clone());

        assert_eq!(observer.values(), vec![0, 1, 3]);
    }

    #[test]
    fn given_reduce_should_emit_the_final_accumulator() {
        let observer = TestObserver::new();
        Observable::of(vec![1, 2, 3])
            .reduce(0, |acc, v| acc + v)
            .subscribe(observer.clone());

        assert_eq!(observer.values(), vec![6]);
    }

    #[test]
    fn given_pluck_should_index_each_value() {
        let rows = vec![
            HashMap::from([("name", "ada")]),
            HashMap::from([("name", "grace")]),
        ];
        let observer = TestObserver::new();
        Observable::of(rows).pluck("name").subscribe(observer.clone());

        assert_eq!(observer.values(), vec!["ada", "grace"]);
    }

    #[test]
    fn given_pairwise_should_pair_neighbours() {
        let observer = TestObserver::new();
        Observable::of(vec![1, 2, 3]).pairwise().subscribe(observer.clone());

        assert_eq!(observer.values(), vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn given_count_and_to_vec_should_emit_on_completion() {
        let counted = TestObserver::new();
        let collected = TestObserver::new();
        let source = Observable::of(vec!['x', 'y']);
        source.count().subscribe(counted.clone());
        source.to_vec().subscribe(collected.clone());

        assert_eq!(counted.values(), vec![2]);
        assert_eq!(collected.values(), vec![vec!['x', 'y']]);
    }

    #[test]
    fn given_an_error_materialize_should_emit_it_as_a_value() {
        let observer = TestObserver::new();
        Observable::<u8>::throw_error(RxError::msg("e"))
            .materialize()
            .subscribe(observer.clone());

        assert_eq!(observer.values(), vec![Notification::Error(RxError::msg("e"))]);
        assert!(observer.is_completed());
    }

    #[test]
    fn given_materialized_values_dematerialize_should_restore_them() {
        let observer = TestObserver::new();
        Observable::of(vec![4, 5])
            .materialize()
            .dematerialize()
            .subscribe(observer.clone());

        assert_eq!(observer.values(), vec![4, 5]);
        assert!(observer.is_completed());
    }

    #[test]
    fn given_tap_should_observe_without_changing_values() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let observer = TestObserver::new();
        Observable::of(vec![1, 2])
            .tap(move |v| log.lock().push(*v))
            .subscribe(observer.clone());

        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(observer.values(), vec![1, 2]);
    }
}
