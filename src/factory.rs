//! Creation functions.

use core::future::Future;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use futures::FutureExt;
use portable_atomic_util::Arc;

use crate::{
    EventTarget, Item, Observable, RxError, Scheduler, Spawner, Subscriber, Teardown,
};

/// One-shot completion callback handed to a function bound with
/// [`bind_callback`] or [`bind_node_callback`].
pub type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

impl<T: Item> Observable<T> {
    /// Emit each value in order, then complete.
    pub fn of(values: Vec<T>) -> Self {
        let values = Arc::new(values);
        Observable::create(move |subscriber: Subscriber<T>| {
            for value in values.iter() {
                if subscriber.is_closed() {
                    return;
                }
                subscriber.next(value.clone());
            }
            subscriber.complete();
        })
    }

    /// Complete immediately without emitting.
    pub fn empty() -> Self {
        Observable::create(|subscriber: Subscriber<T>| subscriber.complete())
    }

    /// Never emit and never terminate.
    pub fn never() -> Self {
        Observable::create(|_subscriber: Subscriber<T>| ())
    }

    /// Error immediately with `err`.
    pub fn throw_error(err: RxError) -> Self {
        Observable::create(move |subscriber: Subscriber<T>| subscriber.error(err.clone()))
    }

    /// Call `factory` on every subscription and subscribe to what it returns.
    pub fn defer<F>(factory: F) -> Self
    where
        F: Fn() -> Observable<T> + Send + Sync + 'static,
    {
        Observable::create(move |subscriber: Subscriber<T>| {
            factory().subscribe_with(subscriber);
        })
    }

    /// Emit every event dispatched by `target` while subscribed.
    ///
    /// The listener is registered on subscribe and removed on unsubscribe.
    pub fn from_event<Target>(target: Target) -> Self
    where
        Target: EventTarget<T>,
    {
        let target = Arc::new(target);
        Observable::create(move |subscriber: Subscriber<T>| {
            let id = target.add_listener(Box::new(move |event: T| subscriber.next(event)));
            let target = target.clone();
            Teardown::from_fn(move || target.remove_listener(id))
        })
    }

    /// Emit the settled result of `future`.
    ///
    /// The future runs at most once; every subscriber observes the same
    /// settlement. Each subscription spawns a waiter on `spawner`.
    pub fn from_future<F, S>(future: F, spawner: S) -> Self
    where
        F: Future<Output = Result<T, RxError>> + Send + 'static,
        S: Spawner,
    {
        let settled = future.boxed().shared();
        let spawner = Arc::new(spawner);
        Observable::create(move |subscriber: Subscriber<T>| {
            let settled = settled.clone();
            spawner.spawn(Box::pin(async move {
                let result = settled.await;
                if subscriber.is_closed() {
                    return;
                }
                match result {
                    Ok(value) => {
                        subscriber.next(value);
                        subscriber.complete();
                    }
                    Err(err) => subscriber.error(err),
                }
            }));
        })
    }
}

impl Observable<i64> {
    /// Emit `count` consecutive integers starting at `start`.
    pub fn range(start: i64, count: u64) -> Self {
        Observable::create(move |subscriber: Subscriber<i64>| {
            let mut value = start;
            for emitted in 0..count {
                if subscriber.is_closed() {
                    return;
                }
                subscriber.next(value);
                if emitted + 1 < count {
                    value = value.wrapping_add(1);
                }
            }
            subscriber.complete();
        })
    }
}

impl Observable<u64> {
    /// Emit `0, 1, 2, ...` every `period`.
    pub fn interval<S: Scheduler>(period: Duration, scheduler: S) -> Self {
        Observable::create(move |subscriber: Subscriber<u64>| {
            let counter = AtomicU64::new(0);
            scheduler.schedule_periodic(period, move || {
                subscriber.next(counter.fetch_add(1, Ordering::Relaxed));
            })
        })
    }

    /// Emit `0` after `delay`, then complete.
    pub fn timer<S: Scheduler>(delay: Duration, scheduler: S) -> Self {
        Observable::create(move |subscriber: Subscriber<u64>| {
            scheduler.schedule_once(delay, move || {
                subscriber.next(0);
                subscriber.complete();
            })
        })
    }

    /// Emit `0` after `delay`, then `1, 2, ...` every `period`.
    pub fn timer_periodic<S: Scheduler>(delay: Duration, period: Duration, scheduler: S) -> Self {
        Observable::create(move |subscriber: Subscriber<u64>| {
            let ticks = subscriber.clone();
            let periodic = scheduler.clone();
            scheduler.schedule_once(delay, move || {
                ticks.next(0);
                let counter = AtomicU64::new(1);
                let emitter = ticks.clone();
                let subscription = periodic.schedule_periodic(period, move || {
                    emitter.next(counter.fetch_add(1, Ordering::Relaxed));
                });
                ticks.add(subscription);
            })
        })
    }
}

impl<T: Item> FromIterator<T> for Observable<T> {
    /// Collect the iterator and replay it to every subscriber.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Observable::of(iter.into_iter().collect())
    }
}

/// Turn a callback-style function into one returning an observable.
///
/// The wrapped function is invoked on every subscription; the value passed
/// to its callback is emitted and the stream completes.
///
/// # Example
///
/// ```rust
/// use oxide_rx::{bind_callback, Callback, TestObserver};
///
/// let double = bind_callback(|n: i32, done: Callback<i32>| done(n * 2));
///
/// let observer = TestObserver::new();
/// double(21).subscribe(observer.clone());
/// assert_eq!(observer.values(), vec![42]);
/// ```
pub fn bind_callback<A, T, F>(f: F) -> impl Fn(A) -> Observable<T>
where
    A: Item,
    T: Item,
    F: Fn(A, Callback<T>) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    move |args: A| {
        let f = f.clone();
        Observable::create(move |subscriber: Subscriber<T>| {
            f(
                args.clone(),
                Box::new(move |value: T| {
                    subscriber.next(value);
                    subscriber.complete();
                }),
            );
        })
    }
}

/// Like [`bind_callback`], for callbacks that receive a `Result`.
///
/// `Err` is delivered through the error channel.
pub fn bind_node_callback<A, T, F>(f: F) -> impl Fn(A) -> Observable<T>
where
    A: Item,
    T: Item,
    F: Fn(A, Callback<Result<T, RxError>>) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    move |args: A| {
        let f = f.clone();
        Observable::create(move |subscriber: Subscriber<T>| {
            f(
                args.clone(),
                Box::new(move |result: Result<T, RxError>| match result {
                    Ok(value) => {
                        subscriber.next(value);
                        subscriber.complete();
                    }
                    Err(err) => subscriber.error(err),
                }),
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_test_spawner, EventEmitter, Notification, TestObserver, VirtualTimeScheduler};

    #[test]
    fn given_of_should_emit_in_order_then_complete() {
        let observer = TestObserver::new();
        Observable::of(vec![1, 2, 3]).subscribe(observer.clone());

        observer.with_notifications(|n| {
            assert_eq!(
                n,
                &vec![
                    Notification::Next(1),
                    Notification::Next(2),
                    Notification::Next(3),
                    Notification::Complete,
                ]
            );
        });
    }

    #[test]
    fn given_an_iterator_should_build_a_replayable_observable() {
        let observable: Observable<char> = "ab".chars().collect();

        let first = TestObserver::new();
        let second = TestObserver::new();
        observable.subscribe(first.clone());
        observable.subscribe(second.clone());

        assert_eq!(first.values(), vec!['a', 'b']);
        assert_eq!(second.values(), vec!['a', 'b']);
    }

    #[test]
    fn given_range_should_emit_consecutive_integers() {
        let observer = TestObserver::new();
        Observable::range(-1, 3).subscribe(observer.clone());

        assert_eq!(observer.values(), vec![-1, 0, 1]);
        assert!(observer.is_completed());
    }

    #[test]
    fn given_range_ending_at_the_largest_integer_should_emit_it_then_complete() {
        let observer = TestObserver::new();
        Observable::range(i64::MAX - 1, 2).subscribe(observer.clone());
        Observable::range(i64::MAX, 1).subscribe(observer.clone());

        assert_eq!(observer.values(), vec![i64::MAX - 1, i64::MAX]);
        assert!(observer.is_completed());
    }

    #[test]
    fn given_a_timer_beyond_the_representable_clock_should_stay_pending() {
        let scheduler = VirtualTimeScheduler::new();
        scheduler.advance_by(Duration::from_millis(1));
        let observer = TestObserver::new();

        Observable::timer(Duration::MAX, scheduler.clone()).subscribe(observer.clone());
        scheduler.advance_by(Duration::from_secs(3600));

        assert_eq!(observer.count(), 0);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn given_never_should_stay_silent() {
        let observer = TestObserver::<u8>::new();
        Observable::never().subscribe(observer.clone());

        assert_eq!(observer.count(), 0);
    }

    #[test]
    fn given_throw_error_should_only_error() {
        let observer = TestObserver::<u8>::new();
        Observable::throw_error(RxError::msg("nope")).subscribe(observer.clone());

        assert_eq!(observer.error(), Some(RxError::msg("nope")));
        assert!(observer.values().is_empty());
    }

    #[test]
    fn given_defer_should_build_a_fresh_source_per_subscription() {
        let builds = Arc::new(AtomicU64::new(0));
        let counter = builds.clone();
        let deferred = Observable::defer(move || {
            Observable::of(vec![counter.fetch_add(1, Ordering::SeqCst)])
        });

        let observer = TestObserver::new();
        deferred.subscribe(observer.clone());
        deferred.subscribe(observer.clone());

        assert_eq!(observer.values(), vec![0, 1]);
    }

    #[test]
    fn given_a_timer_should_emit_zero_after_the_delay() {
        let scheduler = VirtualTimeScheduler::new();
        let observer = TestObserver::new();
        Observable::timer(Duration::from_millis(30), scheduler.clone()).subscribe(observer.clone());

        scheduler.advance_by(Duration::from_millis(29));
        assert_eq!(observer.count(), 0);
        scheduler.advance_by(Duration::from_millis(1));

        assert_eq!(observer.values(), vec![0]);
        assert!(observer.is_completed());
    }

    #[test]
    fn given_a_periodic_timer_should_emit_after_delay_then_every_period() {
        let scheduler = VirtualTimeScheduler::new();
        let observer = TestObserver::new();
        let subscription = Observable::timer_periodic(
            Duration::from_millis(100),
            Duration::from_millis(10),
            scheduler.clone(),
        )
        .subscribe(observer.clone());

        scheduler.advance_by(Duration::from_millis(125));
        subscription.unsubscribe();
        scheduler.advance_by(Duration::from_millis(100));

        assert_eq!(observer.values(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn given_an_unsubscribed_interval_should_release_its_timer() {
        let scheduler = VirtualTimeScheduler::new();
        let observer = TestObserver::new();
        let subscription =
            Observable::interval(Duration::from_millis(10), scheduler.clone()).subscribe(observer.clone());

        scheduler.advance_by(Duration::from_millis(20));
        subscription.unsubscribe();

        assert_eq!(observer.values(), vec![0, 1]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn given_from_event_should_remove_the_listener_on_unsubscribe() {
        let emitter = EventEmitter::new();
        let observer = TestObserver::new();
        let subscription = Observable::from_event(emitter.clone()).subscribe(observer.clone());

        emitter.emit(1);
        assert_eq!(emitter.listener_count(), 1);
        subscription.unsubscribe();
        emitter.emit(2);

        assert_eq!(observer.values(), vec![1]);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn given_a_resolved_future_should_emit_its_value_to_every_subscriber() {
        let observable = Observable::from_future(async { Ok(7) }, create_test_spawner());

        let first = TestObserver::new();
        let second = TestObserver::new();
        observable.subscribe(first.clone());
        observable.subscribe(second.clone());

        assert_eq!(first.values(), vec![7]);
        assert_eq!(second.values(), vec![7]);
        assert!(second.is_completed());
    }

    #[test]
    fn given_a_rejected_future_should_error() {
        let observable =
            Observable::<u8>::from_future(async { Err(RxError::msg("rejected")) }, create_test_spawner());

        let observer = TestObserver::new();
        observable.subscribe(observer.clone());

        assert_eq!(observer.error(), Some(RxError::msg("rejected")));
    }

    #[test]
    fn given_a_node_callback_failure_should_error() {
        let fetch = bind_node_callback(|key: &'static str, done: Callback<Result<u8, RxError>>| {
            if key == "known" {
                done(Ok(1));
            } else {
                done(Err(RxError::Callback(format!("missing {key}"))));
            }
        });

        let found = TestObserver::new();
        let missing = TestObserver::new();
        fetch("known").subscribe(found.clone());
        fetch("other").subscribe(missing.clone());

        assert_eq!(found.values(), vec![1]);
        assert_eq!(missing.error(), Some(RxError::Callback("missing other".to_string())));
    }
}
