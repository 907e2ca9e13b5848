use super::ms;
use oxide_rx::{AsyncSubject, BehaviorSubject, Observable, ReplaySubject, RxError, TestObserver, VirtualTimeScheduler};

#[test]
fn given_a_shared_interval_should_disconnect_after_the_last_subscriber_and_restart_later() {
    let scheduler = VirtualTimeScheduler::new();
    let shared = Observable::interval(ms(10), scheduler.clone()).share();
    let first = TestObserver::new();
    let second = TestObserver::new();
    let third = TestObserver::new();

    let first_subscription = shared.subscribe(first.clone());
    scheduler.advance_to(ms(25));
    let second_subscription = shared.subscribe(second.clone());
    scheduler.advance_to(ms(35));
    first_subscription.unsubscribe();
    scheduler.advance_to(ms(45));
    second_subscription.unsubscribe();

    assert_eq!(first.values(), vec![0, 1, 2]);
    assert_eq!(second.values(), vec![2, 3]);
    assert_eq!(scheduler.pending(), 0);

    scheduler.advance_to(ms(50));
    shared.subscribe(third.clone());
    scheduler.advance_to(ms(70));

    assert_eq!(third.values(), vec![0, 1]);
}

#[test]
fn given_a_published_source_should_not_start_before_connect() {
    let scheduler = VirtualTimeScheduler::new();
    let published = Observable::interval(ms(10), scheduler.clone()).take(3).publish();
    let early = TestObserver::new();
    let late = TestObserver::new();

    published.subscribe(early.clone());
    scheduler.advance_by(ms(30));
    assert_eq!(early.count(), 0);

    published.connect();
    scheduler.advance_by(ms(15));
    published.subscribe(late.clone());
    scheduler.flush();

    assert_eq!(early.values(), vec![0, 1, 2]);
    assert_eq!(late.values(), vec![1, 2]);
    assert!(late.is_completed());
    assert!(!published.is_connected());
}

#[test]
fn given_a_behavior_subject_should_hand_each_subscriber_the_current_value() {
    let selection = BehaviorSubject::new("none");
    let early = TestObserver::new();
    let late = TestObserver::new();

    selection.subscribe(early.clone());
    selection.next("first");
    selection.next("second");
    selection.subscribe(late.clone());

    assert_eq!(early.values(), vec!["none", "first", "second"]);
    assert_eq!(late.values(), vec!["second"]);
    assert_eq!(selection.value(), "second");
}

#[test]
fn given_a_replay_subject_should_replay_its_window_then_the_terminal() {
    let history = ReplaySubject::new(2);
    history.next(1);
    history.next(2);
    history.next(3);
    history.complete();

    let observer = TestObserver::new();
    history.subscribe(observer.clone());

    assert_eq!(observer.values(), vec![2, 3]);
    assert!(observer.is_completed());
}

#[test]
fn given_an_async_subject_should_emit_only_the_last_value_on_completion() {
    let result = AsyncSubject::new();
    let early = TestObserver::new();
    result.subscribe(early.clone());

    result.next(1);
    result.next(2);
    assert_eq!(early.count(), 0);

    result.complete();
    let late = TestObserver::new();
    result.subscribe(late.clone());

    assert_eq!(early.values(), vec![2]);
    assert_eq!(late.values(), vec![2]);
    assert!(late.is_completed());
}

#[test]
fn given_an_async_subject_that_errors_should_emit_no_value() {
    let result = AsyncSubject::<u32>::new();
    let observer = TestObserver::new();
    result.subscribe(observer.clone());

    result.next(7);
    result.error(RxError::Timeout(ms(5)));

    assert_eq!(observer.count(), 0);
    assert!(matches!(observer.error(), Some(RxError::Timeout(_))));
}
