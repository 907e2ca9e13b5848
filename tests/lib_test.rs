use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use oxide_rx::{
    BehaviorSubject, Notification, Observable, ReplaySubject, RxError, Subject, Subscriber, Subscription,
    Teardown, TestObserver,
};

// A cold source that counts how many executions it has started and how many
// teardowns have run.
fn counted_source(started: Arc<AtomicUsize>, released: Arc<AtomicUsize>) -> Observable<u32> {
    Observable::create(move |subscriber: Subscriber<u32>| {
        let execution = started.fetch_add(1, Ordering::SeqCst) as u32;
        subscriber.next(execution * 10);
        subscriber.next(execution * 10 + 1);
        let released = released.clone();
        Teardown::from_fn(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    })
}

#[test]
fn given_a_cold_source_should_run_one_independent_execution_per_subscriber() {
    let started = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicUsize::new(0));
    let source = counted_source(started.clone(), released.clone());
    let first = TestObserver::new();
    let second = TestObserver::new();

    source.subscribe(first.clone());
    source.subscribe(second.clone());

    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(first.values(), vec![0, 1]);
    assert_eq!(second.values(), vec![10, 11]);
}

#[test]
fn given_an_unsubscribed_subscription_when_unsubscribed_again_should_not_rerun_teardown() {
    let started = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicUsize::new(0));
    let subscription = counted_source(started, released.clone()).subscribe(TestObserver::new());

    subscription.unsubscribe();
    subscription.unsubscribe();

    assert!(subscription.is_closed());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn given_a_consumer_unsubscribing_during_delivery_should_receive_nothing_further() {
    let subject = Subject::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let seen = received.clone();
    let own = slot.clone();
    let subscription = subject.as_observable().map(|v: u32| v * 10).subscribe_next(move |value| {
        seen.lock().unwrap().push(value);
        let subscription = own.lock().unwrap().clone();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            subscription.unsubscribe();
        }
    });
    *slot.lock().unwrap() = Some(subscription.clone());

    subject.next(1);
    subject.next(2);

    assert_eq!(*received.lock().unwrap(), vec![10]);
    assert!(subscription.is_closed());
    assert_eq!(subject.observer_count(), 0);
}

#[test]
fn given_a_terminated_stream_should_drop_every_later_notification() {
    let observer = TestObserver::new();
    Observable::create(|subscriber: Subscriber<u32>| {
        subscriber.next(1);
        subscriber.complete();
        subscriber.next(2);
        subscriber.error(RxError::msg("late"));
        subscriber.complete();
    })
    .subscribe(observer.clone());

    observer.with_notifications(|notifications| {
        assert_eq!(notifications, &vec![Notification::Next(1), Notification::Complete]);
    });
}

#[test]
fn given_a_terminated_stream_should_run_its_teardown_without_an_unsubscribe() {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();

    let subscription = Observable::create(move |subscriber: Subscriber<u32>| {
        subscriber.complete();
        let counter = counter.clone();
        Teardown::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    })
    .subscribe(TestObserver::new());

    assert!(subscription.is_closed());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn given_take_zero_should_complete_without_subscribing_upstream() {
    let observer = TestObserver::new();
    let source = Observable::create::<_, ()>(|_subscriber: Subscriber<u32>| {
        panic!("take(0) must not subscribe upstream");
    });

    source.take(0).subscribe(observer.clone());

    assert_eq!(observer.count(), 0);
    assert!(observer.is_completed());
}

#[test]
fn given_a_behavior_subject_should_emit_the_latest_value_to_a_new_subscriber_first() {
    let subject = BehaviorSubject::new(0);
    subject.next(1);
    subject.next(2);

    let observer = TestObserver::new();
    subject.subscribe(observer.clone());
    subject.next(3);

    assert_eq!(observer.values(), vec![2, 3]);
}

#[test]
fn given_a_replay_subject_of_two_should_replay_only_the_last_two_values() {
    let subject = ReplaySubject::new(2);
    for value in 1..=5 {
        subject.next(value);
    }

    let observer = TestObserver::new();
    subject.subscribe(observer.clone());

    assert_eq!(observer.values(), vec![4, 5]);
    assert!(!observer.is_completed());
}

#[test]
fn given_an_erroring_source_should_deliver_the_error_exactly_once() {
    let observer = TestObserver::<u32>::new();
    Observable::throw_error(RxError::EmptySequence)
        .map(|value: u32| value + 1)
        .subscribe(observer.clone());

    observer.with_notifications(|notifications| {
        assert_eq!(notifications, &vec![Notification::Error(RxError::EmptySequence)]);
    });
}
