use super::{dispatch, given_a_key_target_expecting_one_listener, ms};
use oxide_rx::{EventEmitter, Observable, TestObserver, VirtualTimeScheduler};

#[test]
fn given_a_subscribed_event_target_should_emit_its_events_until_unsubscribed() {
    let (target, listener) = given_a_key_target_expecting_one_listener(7);
    let observer = TestObserver::new();

    let subscription = Observable::from_event(target).subscribe(observer.clone());
    dispatch(&listener, 1);
    dispatch(&listener, 2);
    subscription.unsubscribe();
    dispatch(&listener, 3);

    assert_eq!(observer.values(), vec![1, 2]);
}

#[test]
fn given_take_on_an_event_target_should_remove_the_listener_after_the_last_value() {
    let (target, listener) = given_a_key_target_expecting_one_listener(3);
    let observer = TestObserver::new();

    Observable::from_event(target).take(1).subscribe(observer.clone());
    dispatch(&listener, 42);

    assert_eq!(observer.values(), vec![42]);
    assert!(observer.is_completed());
}

#[test]
fn given_typed_search_input_should_only_query_the_settled_term() {
    let scheduler = VirtualTimeScheduler::new();
    let keystrokes = EventEmitter::new();
    let lookups = scheduler.clone();
    let observer = TestObserver::new();

    Observable::from_event(keystrokes.clone())
        .debounce_time(ms(300), scheduler.clone())
        .distinct_until_changed()
        .switch_map(move |term: &'static str| {
            Observable::timer(ms(100), lookups.clone()).map(move |_| format!("results for {term}"))
        })
        .subscribe(observer.clone());

    keystrokes.emit("r");
    scheduler.advance_by(ms(100));
    keystrokes.emit("ru");
    scheduler.advance_by(ms(100));
    keystrokes.emit("rust");
    scheduler.advance_by(ms(300));
    keystrokes.emit("rust");
    scheduler.advance_by(ms(300));
    scheduler.advance_by(ms(100));

    assert_eq!(observer.values(), vec!["results for rust".to_string()]);
    assert_eq!(keystrokes.listener_count(), 1);
}
