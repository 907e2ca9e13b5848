//! A push-based reactive streams runtime for Rust.
//!
//! Implements the observable pattern: lazy, cold stream descriptions that
//! start producing only when subscribed, a library of operators that derive
//! new streams from old ones, and subjects that broadcast one execution to
//! many consumers.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use oxide_rx::{merge, Observable, TestObserver, VirtualTimeScheduler};
//!
//! let scheduler = VirtualTimeScheduler::new();
//!
//! let ticks = Observable::interval(Duration::from_millis(50), scheduler.clone())
//!     .take(2)
//!     .map(|tick| tick as i64 + 10);
//! let merged = merge(vec![Observable::of(vec![1, 2]), ticks]);
//!
//! let observer = TestObserver::new();
//! merged.subscribe(observer.clone());
//! assert_eq!(observer.values(), vec![1, 2]);
//!
//! scheduler.advance_by(Duration::from_millis(100));
//! assert_eq!(observer.values(), vec![1, 2, 10, 11]);
//! assert!(observer.is_completed());
//! ```
//!
//! ## Time
//!
//! Every time-based factory and operator takes the [`Scheduler`] it runs on.
//! Use [`EventLoop`] for wall-clock time and [`VirtualTimeScheduler`] for
//! deterministic tests.

// Module declarations
mod emitter;
mod error;
mod factory;
mod multicast;
mod observable;
mod observer;
mod operators;
mod runtime;
mod scheduler;
mod subject;
mod subscriber;
mod subscription;

// Public re-exports
pub use emitter::{EventEmitter, EventTarget, Listener, ListenerId};
pub use error::RxError;
pub use factory::{bind_callback, bind_node_callback, Callback};
pub use multicast::ConnectableObservable;
pub use observable::{Item, Observable};
pub use observer::{CallbackObserver, Notification, Observer};
pub use operators::{
    combine_latest, combine_latest2, combine_latest_with, concat, merge, race, zip, zip2, zip3,
    zip_with,
};
pub use runtime::{EventLoop, Spawner};
pub use scheduler::{Scheduler, Task, TimerId, VirtualTimeScheduler};
pub use subject::{AsyncSubject, BehaviorSubject, ReplaySubject, Subject, SubjectLike};
pub use subscriber::Subscriber;
pub use subscription::{Subscription, Teardown};

// Test utilities (only available with 'testing' feature or during tests)
#[cfg(any(test, feature = "testing"))]
pub use observer::TestObserver;
#[cfg(any(test, feature = "testing"))]
pub use runtime::{create_test_spawner, test_spawner_fn};
