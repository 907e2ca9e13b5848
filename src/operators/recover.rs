//! Error recovery and cleanup.

use portable_atomic_util::Arc;

use crate::observable::forwarding;
use crate::{CallbackObserver, Item, Observable, RxError, Subscriber, Teardown};

impl<T: Item> Observable<T> {
    /// On error, continue with the stream `selector` returns for it.
    ///
    /// Values and completion of the replacement are forwarded as if they
    /// came from the original source.
    pub fn catch_error<F>(&self, selector: F) -> Observable<T>
    where
        F: Fn(RxError) -> Observable<T> + Send + Sync + 'static,
    {
        let selector = Arc::new(selector);
        self.lift(move |downstream, upstream| {
            let selector = selector.clone();
            let next = downstream.clone();
            let recover = downstream.clone();
            let on_complete = downstream.clone();
            CallbackObserver::new()
                .on_next(move |value| next.next(value))
                .on_error(move |err| {
                    let parent = recover.subscription();
                    parent.remove(&upstream);
                    let replacement = selector(err);
                    replacement.subscribe_child(&parent, recover.clone());
                })
                .on_complete(move || on_complete.complete())
        })
    }

    /// On error, resubscribe to the source up to `count` more times before
    /// giving up with the last error.
    pub fn retry(&self, count: usize) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |downstream: Subscriber<T>| {
            retry_attempt(&source, &downstream, count);
        })
    }

    /// Run `f` once the execution ends by completion, error or unsubscribe.
    ///
    /// `f` runs after the source has been unsubscribed.
    pub fn finalize<F>(&self, f: F) -> Observable<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream, _upstream| {
            let f = f.clone();
            downstream.add(Teardown::from_fn(move || f()));
            let next = downstream.clone();
            forwarding(&downstream).on_next(move |value| next.next(value))
        })
    }
}

fn retry_attempt<T: Item>(source: &Observable<T>, downstream: &Subscriber<T>, remaining: usize) {
    let parent = downstream.subscription();
    let attempt = parent.child();
    let own = attempt.clone();
    let retry_source = source.clone();
    let (next, error, complete) = (downstream.clone(), downstream.clone(), downstream.clone());
    source.subscribe_with(Subscriber::with_subscription(
        CallbackObserver::new()
            .on_next(move |value| next.next(value))
            .on_error(move |err| {
                parent.remove(&own);
                if remaining == 0 {
                    error.error(err);
                } else {
                    tracing::debug!(remaining, error = %err, "resubscribing after error");
                    retry_attempt(&retry_source, &error, remaining - 1);
                }
            })
            .on_complete(move || complete.complete()),
        attempt,
    ));
}
