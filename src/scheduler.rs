//! Timer facility used by every time-based factory and operator.

use core::time::Duration;
use std::collections::{BTreeMap, HashMap};

use portable_atomic_util::Arc;
use spin::Mutex;

use crate::{Subscription, Teardown};

/// Identifier of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) u64);

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A source of time and deferred execution.
///
/// This abstraction lets the same operator run against a real clock
/// ([`EventLoop`](crate::EventLoop)) or a deterministic virtual one
/// ([`VirtualTimeScheduler`]).
///
/// Handles are cheap to clone; clones drive the same timer queue.
pub trait Scheduler: Clone + Send + Sync + 'static {
    /// Time elapsed since the scheduler was created.
    fn now(&self) -> Duration;

    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a pending timer. Cancelling a fired or unknown timer is a no-op.
    fn cancel(&self, id: TimerId);

    /// Run `f` once after `delay`; unsubscribing cancels it.
    fn schedule_once<F>(&self, delay: Duration, f: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.schedule(delay, Box::new(f));
        let scheduler = self.clone();
        let subscription = Subscription::new();
        subscription.add(Teardown::from_fn(move || scheduler.cancel(id)));
        subscription
    }

    /// Run `f` every `period`; unsubscribing cancels the pending tick.
    ///
    /// A zero period is clamped to one millisecond.
    fn schedule_periodic<F>(&self, period: Duration, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let period = if period.is_zero() {
            tracing::warn!("zero scheduling period clamped to 1ms");
            Duration::from_millis(1)
        } else {
            period
        };
        let subscription = Subscription::new();
        let pending = Arc::new(Mutex::new(None));
        let tick = Arc::new(PeriodicTick {
            scheduler: self.clone(),
            period,
            f,
            pending: pending.clone(),
            subscription: subscription.clone(),
        });
        PeriodicTick::arm(&tick);

        let scheduler = self.clone();
        subscription.add(Teardown::from_fn(move || {
            if let Some(id) = pending.lock().take() {
                scheduler.cancel(id);
            }
        }));
        subscription
    }
}

struct PeriodicTick<S, F> {
    scheduler: S,
    period: Duration,
    f: F,
    pending: Arc<Mutex<Option<TimerId>>>,
    subscription: Subscription,
}

impl<S, F> PeriodicTick<S, F>
where
    S: Scheduler,
    F: Fn() + Send + Sync + 'static,
{
    fn arm(tick: &Arc<Self>) {
        let next = tick.clone();
        let id = tick.scheduler.schedule(
            tick.period,
            Box::new(move || {
                if next.subscription.is_closed() {
                    return;
                }
                (next.f)();
                if !next.subscription.is_closed() {
                    PeriodicTick::arm(&next);
                }
            }),
        );
        *tick.pending.lock() = Some(id);
    }
}

struct VirtualState {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, u64), Task>,
    deadlines: HashMap<u64, Duration>,
}

/// Deterministic scheduler whose clock only moves when told to.
///
/// Timers that share a deadline fire in the order they were scheduled.
/// Tasks run on the thread that advances the clock, outside of any lock, so
/// they may schedule or cancel further timers.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use oxide_rx::{Observable, TestObserver, VirtualTimeScheduler};
///
/// let scheduler = VirtualTimeScheduler::new();
/// let observer = TestObserver::new();
/// Observable::interval(Duration::from_millis(10), scheduler.clone())
///     .take(3)
///     .subscribe(observer.clone());
///
/// scheduler.advance_by(Duration::from_millis(25));
/// assert_eq!(observer.values(), vec![0, 1]);
///
/// scheduler.advance_by(Duration::from_millis(5));
/// assert_eq!(observer.values(), vec![0, 1, 2]);
/// assert!(observer.is_completed());
/// ```
#[derive(Clone)]
pub struct VirtualTimeScheduler {
    state: Arc<Mutex<VirtualState>>,
}

impl Default for VirtualTimeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTimeScheduler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(VirtualState {
                now: Duration::ZERO,
                next_id: 0,
                queue: BTreeMap::new(),
                deadlines: HashMap::new(),
            })),
        }
    }

    /// Move the clock forward by `delta`, running every timer that falls due.
    pub fn advance_by(&self, delta: Duration) {
        let target = self.now().saturating_add(delta);
        self.advance_to(target);
    }

    /// Move the clock to `target`, running every timer that falls due.
    ///
    /// Timers scheduled by running tasks also fire if they fall due before
    /// `target`. Moving backwards is ignored.
    pub fn advance_to(&self, target: Duration) {
        loop {
            let task = {
                let mut state = self.state.lock();
                let due = match state.queue.keys().next() {
                    Some(&(deadline, id)) if deadline <= target => (deadline, id),
                    _ => break,
                };
                state.now = due.0;
                state.deadlines.remove(&due.1);
                state.queue.remove(&due)
            };
            if let Some(task) = task {
                task();
            }
        }
        let mut state = self.state.lock();
        if state.now < target {
            state.now = target;
        }
    }

    /// Run every timer currently queued, advancing to the latest deadline.
    ///
    /// Periodic timers re-arm past that deadline and stay pending.
    pub fn flush(&self) {
        let last = self.state.lock().queue.keys().next_back().map(|&(d, _)| d);
        if let Some(last) = last {
            self.advance_to(last);
        }
    }

    /// Number of timers waiting to fire.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl Scheduler for VirtualTimeScheduler {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.now.saturating_add(delay);
        state.queue.insert((deadline, id), task);
        state.deadlines.insert(id, deadline);
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) {
        let task = {
            let mut state = self.state.lock();
            match state.deadlines.remove(&id.0) {
                Some(deadline) => state.queue.remove(&(deadline, id.0)),
                None => None,
            }
        };
        // Dropped outside the lock: the task may own subscriptions.
        drop(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn log_into(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Task {
        let log = log.clone();
        Box::new(move || log.lock().push(label))
    }

    #[test]
    fn given_timers_with_equal_deadlines_should_fire_in_scheduling_order() {
        let scheduler = VirtualTimeScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler.schedule(Duration::from_millis(10), log_into(&log, "a"));
        scheduler.schedule(Duration::from_millis(5), log_into(&log, "b"));
        scheduler.schedule(Duration::from_millis(10), log_into(&log, "c"));

        scheduler.advance_by(Duration::from_millis(10));

        assert_eq!(*log.lock(), vec!["b", "a", "c"]);
        assert_eq!(scheduler.now(), Duration::from_millis(10));
    }

    #[test]
    fn given_a_cancelled_timer_should_not_fire() {
        let scheduler = VirtualTimeScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = scheduler.schedule(Duration::from_millis(1), log_into(&log, "x"));

        scheduler.cancel(id);
        scheduler.advance_by(Duration::from_millis(5));

        assert!(log.lock().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn given_a_periodic_timer_should_tick_until_unsubscribed() {
        let scheduler = VirtualTimeScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let subscription = scheduler.schedule_periodic(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.advance_by(Duration::from_millis(35));
        subscription.unsubscribe();
        scheduler.advance_by(Duration::from_millis(100));

        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn given_a_task_scheduling_another_within_the_window_should_run_both() {
        let scheduler = VirtualTimeScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_scheduler = scheduler.clone();
        let inner_log = log.clone();
        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                inner_log.lock().push("outer");
                inner_scheduler.schedule(Duration::from_millis(5), log_into(&inner_log, "inner"));
            }),
        );

        scheduler.advance_by(Duration::from_millis(10));

        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn given_a_delay_past_the_end_of_the_clock_should_saturate_the_deadline() {
        let scheduler = VirtualTimeScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler.advance_by(Duration::from_millis(1));

        scheduler.schedule(Duration::MAX, log_into(&log, "far"));
        assert!(log.lock().is_empty());

        scheduler.advance_by(Duration::MAX);

        assert_eq!(*log.lock(), vec!["far"]);
        assert_eq!(scheduler.now(), Duration::MAX);
    }
}
