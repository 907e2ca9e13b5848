use super::ms;
use oxide_rx::{Observable, Subject, TestObserver, VirtualTimeScheduler};

#[test]
fn given_concat_all_should_start_each_inner_only_after_the_previous_completes() {
    let scheduler = VirtualTimeScheduler::new();
    let first = Observable::interval(ms(10), scheduler.clone()).take(2).map(|v| format!("a{v}"));
    let second = Observable::timer(ms(5), scheduler.clone()).map_to("b0".to_string());
    let observer = TestObserver::new();

    Observable::of(vec![first, second]).concat_all().subscribe(observer.clone());

    scheduler.advance_by(ms(10));
    assert_eq!(observer.values(), vec!["a0"]);

    scheduler.advance_by(ms(10));
    assert_eq!(observer.values(), vec!["a0", "a1"]);
    assert!(!observer.is_completed());

    scheduler.advance_by(ms(5));
    assert_eq!(observer.values(), vec!["a0", "a1", "b0"]);
    assert!(observer.is_completed());
}

#[test]
fn given_merge_map_over_timers_should_interleave_by_time() {
    let scheduler = VirtualTimeScheduler::new();
    let timers = scheduler.clone();
    let observer = TestObserver::new();

    Observable::of(vec![30u64, 10, 20])
        .merge_map(move |delay| Observable::timer(ms(delay), timers.clone()).map_to(delay))
        .subscribe(observer.clone());
    scheduler.flush();

    assert_eq!(observer.values(), vec![10, 20, 30]);
    assert!(observer.is_completed());
}

#[test]
fn given_switch_map_should_drop_a_slow_inner_when_a_new_value_arrives() {
    let scheduler = VirtualTimeScheduler::new();
    let requests = Subject::new();
    let timers = scheduler.clone();
    let observer = TestObserver::new();

    requests
        .as_observable()
        .switch_map(move |id: u32| Observable::timer(ms(50), timers.clone()).map_to(id))
        .subscribe(observer.clone());

    requests.next(1);
    scheduler.advance_by(ms(20));
    requests.next(2);
    scheduler.advance_by(ms(50));
    requests.complete();

    assert_eq!(observer.values(), vec![2]);
    assert!(observer.is_completed());
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn given_exhaust_map_should_ignore_triggers_while_busy() {
    let scheduler = VirtualTimeScheduler::new();
    let clicks = Subject::new();
    let timers = scheduler.clone();
    let observer = TestObserver::new();

    clicks
        .as_observable()
        .exhaust_map(move |click: u32| Observable::timer(ms(50), timers.clone()).map_to(click))
        .subscribe(observer.clone());

    clicks.next(1);
    scheduler.advance_by(ms(10));
    clicks.next(2);
    scheduler.advance_by(ms(40));
    clicks.next(3);
    scheduler.advance_by(ms(50));

    assert_eq!(observer.values(), vec![1, 3]);
}
