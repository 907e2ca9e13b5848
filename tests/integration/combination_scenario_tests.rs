use super::ms;
use oxide_rx::{
    combine_latest, merge, race, zip, Observable, Scheduler, Subject, TestObserver, VirtualTimeScheduler,
};

#[test]
fn given_merge_of_sync_and_interval_sources_should_complete_at_the_last_tick() {
    let scheduler = VirtualTimeScheduler::new();
    let ticks = Observable::interval(ms(50), scheduler.clone())
        .take(2)
        .map(|tick| tick as i64 + 10);
    let observer = TestObserver::new();

    merge(vec![Observable::of(vec![1, 2]), ticks]).subscribe(observer.clone());
    assert_eq!(observer.values(), vec![1, 2]);

    scheduler.advance_by(ms(50));
    assert_eq!(observer.values(), vec![1, 2, 10]);
    assert!(!observer.is_completed());

    scheduler.advance_by(ms(50));
    assert_eq!(observer.values(), vec![1, 2, 10, 11]);
    assert!(observer.is_completed());
    assert_eq!(scheduler.now(), ms(100));
}

#[test]
fn given_race_of_a_slow_and_a_fast_timer_should_only_deliver_the_fast_one() {
    let scheduler = VirtualTimeScheduler::new();
    let slow = Observable::timer(ms(100), scheduler.clone()).map_to("slow");
    let fast = Observable::timer(ms(10), scheduler.clone()).map_to("fast");
    let observer = TestObserver::new();

    race(vec![slow, fast]).subscribe(observer.clone());
    scheduler.advance_by(ms(200));

    assert_eq!(observer.values(), vec!["fast"]);
    assert!(observer.is_completed());
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn given_combine_latest_should_stay_silent_until_every_source_has_emitted() {
    let temperature = Subject::new();
    let humidity = Subject::new();
    let observer = TestObserver::new();
    combine_latest(vec![temperature.as_observable(), humidity.as_observable()])
        .subscribe(observer.clone());

    temperature.next(20);
    temperature.next(21);
    assert_eq!(observer.count(), 0);

    humidity.next(60);
    humidity.next(65);
    temperature.next(22);

    assert_eq!(observer.values(), vec![vec![21, 60], vec![21, 65], vec![22, 65]]);
}

#[test]
fn given_zip_of_uneven_sources_should_pair_in_lock_step_and_stop_at_the_shortest() {
    let scheduler = VirtualTimeScheduler::new();
    let fast = Observable::interval(ms(10), scheduler.clone());
    let slow = Observable::interval(ms(30), scheduler.clone()).take(2);
    let observer = TestObserver::new();

    zip(vec![fast, slow]).subscribe(observer.clone());
    scheduler.advance_by(ms(60));

    assert_eq!(observer.values(), vec![vec![0, 0], vec![1, 1]]);
    assert!(observer.is_completed());
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn given_a_chained_pipeline_should_apply_every_stage_in_order() {
    let observer = TestObserver::new();
    Observable::range(1, 10)
        .filter(|n| n % 2 == 1)
        .map(|n| n * n)
        .skip(1)
        .take_while(|n| *n < 60)
        .scan(0, |total, n| total + n)
        .subscribe(observer.clone());

    assert_eq!(observer.values(), vec![0, 9, 34]);
    assert!(observer.is_completed());
}
