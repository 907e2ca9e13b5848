//! Real-time event loop and future spawning.

use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use flume::{Receiver, RecvTimeoutError, Sender};
use portable_atomic_util::Arc;

use crate::scheduler::{Scheduler, Task, TimerId};

/// A spawner trait for executing futures on an async runtime.
///
/// This abstraction allows you to use whatever concurrency model you want (tokio, async-std, embassy, etc.).
///
/// Function pointers and closures automatically implement this trait via the blanket implementation.
pub trait Spawner: Send + Sync + 'static {
    /// Spawn a future on the async runtime.
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

impl<F> Spawner for F
where
    F: Fn(Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static,
{
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
        self(future)
    }
}

#[cfg(any(test, feature = "testing"))]
/// Test spawner function that executes futures synchronously.
///
/// This blocks on the future immediately rather than spawning it on an async runtime.
pub fn test_spawner_fn(fut: Pin<Box<dyn Future<Output = ()> + Send>>) {
    futures::executor::block_on(fut);
}

#[cfg(any(test, feature = "testing"))]
/// Creates a test spawner that executes futures synchronously.
///
/// Use this with [`Observable::from_future`](crate::Observable::from_future)
/// in tests so that the future settles inside `subscribe`.
pub fn create_test_spawner() -> fn(Pin<Box<dyn Future<Output = ()> + Send>>) {
    test_spawner_fn
}

// Deadline used for delays past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

enum LoopMessage {
    Schedule {
        id: u64,
        deadline: Instant,
        task: Task,
    },
    Cancel(u64),
}

/// Real-time, single-threaded timer loop.
///
/// Timers can be scheduled and cancelled from any thread: registrations are
/// queued on a channel and picked up by [`run`](Self::run), which executes
/// every task on the calling thread in deadline order. Timers sharing a
/// deadline fire in scheduling order.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use oxide_rx::{EventLoop, Observable, TestObserver};
///
/// let event_loop = EventLoop::new();
/// let observer = TestObserver::new();
/// Observable::timer(Duration::from_millis(5), event_loop.clone())
///     .subscribe(observer.clone());
///
/// event_loop.run();
/// assert_eq!(observer.values(), vec![0]);
/// ```
#[derive(Clone)]
pub struct EventLoop {
    sender: Sender<LoopMessage>,
    receiver: Receiver<LoopMessage>,
    next_id: Arc<AtomicU64>,
    epoch: Instant,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            next_id: Arc::new(AtomicU64::new(0)),
            epoch: Instant::now(),
        }
    }

    /// Run timers until none remain.
    ///
    /// Sleeps between deadlines while staying responsive to registrations
    /// from other threads.
    pub fn run(&self) {
        let mut timers: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();
        let mut tasks: HashMap<u64, Task> = HashMap::new();

        loop {
            while let Ok(message) = self.receiver.try_recv() {
                Self::apply(message, &mut timers, &mut tasks);
            }

            // Skip entries whose task was cancelled.
            while let Some(Reverse((_, id))) = timers.peek() {
                if tasks.contains_key(id) {
                    break;
                }
                timers.pop();
            }

            let Some(&Reverse((deadline, id))) = timers.peek() else {
                tracing::debug!("event loop idle");
                break;
            };

            match self.receiver.recv_deadline(deadline) {
                Ok(message) => Self::apply(message, &mut timers, &mut tasks),
                Err(RecvTimeoutError::Timeout) => {
                    timers.pop();
                    if let Some(task) = tasks.remove(&id) {
                        task();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn apply(
        message: LoopMessage,
        timers: &mut BinaryHeap<Reverse<(Instant, u64)>>,
        tasks: &mut HashMap<u64, Task>,
    ) {
        match message {
            LoopMessage::Schedule { id, deadline, task } => {
                timers.push(Reverse((deadline, id)));
                tasks.insert(id, task);
            }
            LoopMessage::Cancel(id) => {
                tasks.remove(&id);
            }
        }
    }
}

impl Scheduler for EventLoop {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        self.sender
            .send(LoopMessage::Schedule { id, deadline, task })
            .ok();
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) {
        self.sender.send(LoopMessage::Cancel(id.0)).ok();
    }
}
