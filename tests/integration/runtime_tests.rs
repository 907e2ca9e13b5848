use std::time::Instant;

use super::ms;
use oxide_rx::{
    bind_callback, bind_node_callback, create_test_spawner, Callback, EventLoop, Observable, RxError, TestObserver,
};

#[test]
fn given_an_event_loop_should_run_a_bounded_interval_to_completion() {
    let event_loop = EventLoop::new();
    let observer = TestObserver::new();
    let started = Instant::now();

    Observable::interval(ms(5), event_loop.clone())
        .take(3)
        .subscribe(observer.clone());
    event_loop.run();

    assert_eq!(observer.values(), vec![0, 1, 2]);
    assert!(observer.is_completed());
    assert!(started.elapsed() >= ms(15));
}

#[test]
fn given_an_event_loop_should_fire_timers_in_deadline_order() {
    let event_loop = EventLoop::new();
    let observer = TestObserver::new();

    let late = Observable::timer(ms(20), event_loop.clone()).map_to("late");
    let early = Observable::timer(ms(5), event_loop.clone()).map_to("early");
    late.merge_with(&early).subscribe(observer.clone());
    event_loop.run();

    assert_eq!(observer.values(), vec!["early", "late"]);
}

#[test]
fn given_a_resolved_future_should_emit_its_value_then_complete() {
    let observer = TestObserver::new();

    Observable::from_future(async { Ok(42) }, create_test_spawner()).subscribe(observer.clone());

    assert_eq!(observer.values(), vec![42]);
    assert!(observer.is_completed());
}

#[test]
fn given_a_failed_future_should_forward_its_error() {
    let observer = TestObserver::<u32>::new();

    Observable::from_future(futures::future::ready(Err(RxError::msg("offline"))), create_test_spawner())
        .subscribe(observer.clone());

    assert_eq!(observer.error(), Some(RxError::msg("offline")));
}

#[test]
fn given_a_bound_callback_should_emit_once_per_call() {
    let lookup = bind_callback(|key: &'static str, done: Callback<usize>| done(key.len()));
    let observer = TestObserver::new();

    lookup("alpha").concat_with(&lookup("be")).subscribe(observer.clone());

    assert_eq!(observer.values(), vec![5, 2]);
    assert!(observer.is_completed());
}

#[test]
fn given_a_bound_result_callback_should_route_failures_to_the_error_channel() {
    let parse = bind_node_callback(|text: String, done: Callback<Result<i32, RxError>>| {
        done(text.parse::<i32>().map_err(RxError::msg))
    });
    let parsed = TestObserver::new();
    let failed = TestObserver::new();

    parse("17".to_string()).subscribe(parsed.clone());
    parse("x".to_string()).subscribe(failed.clone());

    assert_eq!(parsed.values(), vec![17]);
    assert!(parsed.is_completed());
    assert!(matches!(failed.error(), Some(RxError::Message(_))));
}
