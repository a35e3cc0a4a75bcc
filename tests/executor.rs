//! End-to-end executor scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use stealpool::sync::{Counter, Event};
use stealpool::{
    engine, release_current_worker, BuildError, EngineError, Executor, ReleaseError,
};

#[test]
fn thousand_jobs_all_execute() {
    let executor = Executor::new(4).expect("build");
    let hits = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(Counter::new(1000));
    for _ in 0..1000 {
        let hits = Arc::clone(&hits);
        let done = Arc::clone(&done);
        executor.submit(move || {
            hits.fetch_add(1, Ordering::Relaxed);
            done.decrement_and_notify_one();
        });
    }
    done.wait();
    assert_eq!(hits.load(Ordering::Relaxed), 1000);
}

#[test]
fn idle_worker_steals_from_loaded_queue() {
    let executor = Executor::new(2).expect("build");
    let gate0 = Arc::new(Event::new());
    let gate1 = Arc::new(Event::new());
    let tally: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
    let done = Arc::new(Counter::new(16));

    // Round-robin starts at queue 0: the first gate job blocks worker 0,
    // the second blocks worker 1.
    for gate in [&gate0, &gate1] {
        let gate = Arc::clone(gate);
        executor.submit(move || gate.wait());
    }
    // Eight jobs pile up behind each gate.
    for _ in 0..16 {
        let tally = Arc::clone(&tally);
        let done = Arc::clone(&done);
        executor.submit(move || {
            let name = thread::current().name().unwrap_or("unnamed").to_string();
            *tally.lock().unwrap().entry(name).or_insert(0) += 1;
            done.decrement_and_notify_one();
        });
    }

    // Worker 1 wakes first: it drains its own eight jobs, then steals half
    // of queue 0's eight while worker 0 is still gated.
    gate1.set_and_notify_one();
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let worker_one = tally
            .lock()
            .unwrap()
            .get("stealpool-worker-1")
            .copied()
            .unwrap_or(0);
        if worker_one >= 12 {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "worker 1 never stole (tally {worker_one})"
        );
        thread::sleep(Duration::from_millis(1));
    }
    gate0.set_and_notify_one();
    done.wait();

    let tally = tally.lock().unwrap();
    let worker_one = tally.get("stealpool-worker-1").copied().unwrap_or(0);
    assert!(
        worker_one > 8,
        "worker 1 ran {worker_one} jobs, round-robin alone gives 8"
    );
}

#[test]
fn released_worker_lets_queue_progress() {
    let executor = Executor::new(1).expect("build");
    let unblock = Arc::new(AtomicBool::new(false));
    let done = Arc::new(Counter::new(2));

    {
        let unblock = Arc::clone(&unblock);
        let done = Arc::clone(&done);
        executor.submit(move || {
            release_current_worker().expect("release");
            // Blocks until the job behind it in the same queue has run,
            // which only a replacement worker can make happen.
            while !unblock.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
            done.decrement_and_notify_one();
        });
    }
    {
        let unblock = Arc::clone(&unblock);
        let done = Arc::clone(&done);
        executor.submit(move || {
            unblock.store(true, Ordering::Release);
            done.decrement_and_notify_one();
        });
    }

    done.wait();
    assert_eq!(executor.thread_count(), 1);
}

#[test]
fn released_workers_are_reused() {
    let executor = Executor::new(1).expect("build");
    let names = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..2 {
        let step = Arc::new(Counter::new(1));
        let names = Arc::clone(&names);
        let step_done = Arc::clone(&step);
        executor.submit(move || {
            release_current_worker().expect("release");
            names
                .lock()
                .unwrap()
                .push(thread::current().name().unwrap_or("unnamed").to_string());
            step_done.decrement_and_notify_one();
        });
        step.wait();
    }
    let step = Arc::new(Counter::new(1));
    {
        let names = Arc::clone(&names);
        let step_done = Arc::clone(&step);
        executor.submit(move || {
            names
                .lock()
                .unwrap()
                .push(thread::current().name().unwrap_or("unnamed").to_string());
            step_done.decrement_and_notify_one();
        });
    }
    step.wait();

    let names = names.lock().unwrap();
    assert_eq!(
        *names,
        vec![
            "stealpool-worker-0".to_string(),
            "stealpool-worker-1".to_string(),
            "stealpool-worker-0".to_string(),
        ],
        "the second release must reuse the first suspended worker"
    );
}

#[test]
fn zero_threads_is_a_build_error() {
    assert!(matches!(Executor::new(0), Err(BuildError::ZeroThreads)));
}

#[test]
fn release_outside_worker_is_an_error() {
    assert!(matches!(
        release_current_worker(),
        Err(ReleaseError::NotAWorker)
    ));
}

#[test]
fn single_worker_runs_jobs_in_submission_order() {
    let executor = Executor::new(1).expect("build");
    let order = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(Counter::new(100));
    for index in 0..100 {
        let order = Arc::clone(&order);
        let done = Arc::clone(&done);
        executor.submit(move || {
            order.lock().unwrap().push(index);
            done.decrement_and_notify_one();
        });
    }
    done.wait();
    assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
}

#[test]
fn construct_and_drop_without_submissions() {
    let executor = Executor::new(3).expect("build");
    assert_eq!(executor.thread_count(), 3);
    drop(executor);
}

#[test]
fn teardown_destroys_jobs_without_running_them() {
    let executor = Executor::new(1).expect("build");
    let started = Arc::new(Event::new());
    {
        let started = Arc::clone(&started);
        executor.submit(move || {
            started.set_and_notify_one();
            thread::sleep(Duration::from_millis(300));
        });
    }
    started.wait();

    let ran = Arc::new(AtomicUsize::new(0));
    let probe = Arc::new(());
    for _ in 0..50 {
        let ran = Arc::clone(&ran);
        let probe = Arc::clone(&probe);
        executor.submit(move || {
            let _probe = probe;
            ran.fetch_add(1, Ordering::Relaxed);
        });
    }
    assert_eq!(Arc::strong_count(&probe), 51);
    drop(executor);
    assert_eq!(
        ran.load(Ordering::Relaxed),
        0,
        "queued jobs must not run during teardown"
    );
    assert_eq!(
        Arc::strong_count(&probe),
        1,
        "queued jobs must still be destroyed"
    );
}

#[test]
fn current_executor_is_visible_inside_jobs() {
    let executor = Executor::new(2).expect("build");
    assert!(Executor::current().is_none());

    let done = Arc::new(Counter::new(2));
    {
        let done = Arc::clone(&done);
        executor.submit(move || {
            let handle = Executor::current().expect("worker thread has an executor");
            assert_eq!(handle.thread_count(), 2);
            let nested_done = Arc::clone(&done);
            handle.submit(move || nested_done.decrement_and_notify_one());
            done.decrement_and_notify_one();
        });
    }
    done.wait();
}

#[test]
fn a_panicking_job_does_not_take_down_its_worker() {
    let executor = Executor::new(1).expect("build");
    executor.submit(|| panic!("job failure"));
    let done = Arc::new(Counter::new(1));
    {
        let done = Arc::clone(&done);
        executor.submit(move || done.decrement_and_notify_one());
    }
    done.wait();
}

#[test]
fn global_engine_lifecycle() {
    assert!(matches!(
        engine::execute(|| {}),
        Err(EngineError::NotInitialized)
    ));
    assert!(engine::thread_count().is_none());

    engine::init(2).expect("init");
    assert_eq!(engine::thread_count(), Some(2));
    assert!(matches!(engine::init(2), Err(EngineError::AlreadyInitialized)));

    let done = Arc::new(Counter::new(10));
    for _ in 0..10 {
        let done = Arc::clone(&done);
        engine::execute(move || done.decrement_and_notify_one()).expect("execute");
    }
    done.wait();

    engine::shutdown();
    assert!(matches!(
        engine::execute(|| {}),
        Err(EngineError::NotInitialized)
    ));
}
