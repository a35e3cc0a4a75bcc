//! Round-trips for the blocking primitives.

use std::sync::Arc;
use std::thread;

use stealpool::sync::{Counter, Event, IsEqualTo, Semaphore, ValueEvent};

#[test]
fn event_wait_resets_the_flag() {
    let event = Event::new();
    event.set_and_notify_one();
    event.wait();
    assert!(!event.is_set());
}

#[test]
fn event_releases_a_blocked_waiter() {
    let event = Arc::new(Event::new());
    let waiter = {
        let event = Arc::clone(&event);
        thread::spawn(move || event.wait())
    };
    event.set_and_notify_one();
    waiter.join().expect("waiter");
}

#[test]
fn value_event_hands_over_the_value() {
    let slot = Arc::new(ValueEvent::new());
    let consumer = {
        let slot = Arc::clone(&slot);
        thread::spawn(move || slot.wait())
    };
    slot.set_and_notify_one(42_u64);
    assert_eq!(consumer.join().expect("consumer"), 42);
}

#[test]
fn counter_join_pattern_reaches_zero() {
    let counter = Arc::new(Counter::new(8));
    let mut workers = Vec::new();
    for _ in 0..8 {
        let counter = Arc::clone(&counter);
        workers.push(thread::spawn(move || counter.decrement_and_notify_one()));
    }
    counter.wait();
    assert_eq!(counter.get(), 0);
    for worker in workers {
        worker.join().expect("worker");
    }
}

#[test]
fn counter_custom_predicate_waits_for_the_target() {
    let counter = Counter::with_predicate(0, IsEqualTo(3));
    counter.increment();
    counter.increment();
    assert_eq!(counter.get(), 2);
    counter.increment_and_notify_all();
    counter.wait();
    assert_eq!(counter.get(), 3);
}

#[test]
fn semaphore_hands_resources_across_threads() {
    let semaphore = Arc::new(Semaphore::new(0));
    let consumer = {
        let semaphore = Arc::clone(&semaphore);
        thread::spawn(move || {
            semaphore.acquire();
            semaphore.acquire();
        })
    };
    semaphore.release();
    semaphore.set_and_notify_all(1);
    consumer.join().expect("consumer");
    assert_eq!(semaphore.available(), 0);
}
