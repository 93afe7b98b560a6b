use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::unbounded;
use ntest::timeout;
use threadcap::ThreadPool;

#[test]
#[should_panic(expected = "thread pool name must not contain null bytes")]
fn name_with_null_bytes_panics() {
    ThreadPool::builder().name("uh\0oh").build();
}

#[test]
#[timeout(1000)]
fn submit_runs_task() {
    let (tx, rx) = unbounded();
    let pool = ThreadPool::new(1);

    pool.submit(move || {
        tx.send(14).unwrap();
    })
    .unwrap();

    assert_eq!(rx.recv().unwrap(), 14);
}

#[test]
#[timeout(5000)]
fn every_task_runs_exactly_once_through_shutdown() {
    let pool = ThreadPool::new(4);
    assert_eq!(pool.threads(), 4);

    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let counter = counter.clone();
        pool.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.shutdown();

    assert_eq!(counter.load(Ordering::SeqCst), 100);
    assert_eq!(pool.completed_tasks(), 100);
    assert_eq!(pool.threads(), 0, "all workers terminated");
}

#[test]
#[timeout(5000)]
fn submit_after_shutdown_fails() {
    let pool = ThreadPool::new(2);
    pool.shutdown();

    let result = pool.submit(|| panic!("must never run"));

    assert!(result.is_err());
    assert_eq!(pool.queued_tasks(), 0);
    assert_eq!(pool.completed_tasks(), 0);
}

#[test]
#[timeout(5000)]
fn rejected_closure_is_returned() {
    let pool = ThreadPool::new(1);
    pool.shutdown();

    let (tx, rx) = unbounded();
    let err = pool.submit(move || tx.send(1).unwrap()).unwrap_err();

    // The pool never ran the closure, but we still can.
    err.into_inner()();
    assert_eq!(rx.recv().unwrap(), 1);
}

#[test]
#[timeout(5000)]
fn explicit_size_spawns_exactly_that_many() {
    let pool = ThreadPool::new(7);
    assert_eq!(pool.threads(), 7);

    pool.shutdown();
    assert_eq!(pool.threads(), 0);
}

#[test]
#[timeout(5000)]
fn zero_size_uses_core_count() {
    let pool = ThreadPool::builder().size(0).core_count(|| 3).build();
    assert_eq!(pool.threads(), 3);
}

#[test]
#[timeout(5000)]
fn default_size_matches_platform_parallelism() {
    let pool = ThreadPool::new(0);
    assert_eq!(pool.threads(), num_cpus::get().max(1));
}

#[test]
#[timeout(5000)]
fn wait_flushes_all_pending_tasks() {
    let pool = ThreadPool::new(1);
    let counter = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let c = counter.clone();
    pool.submit(move || {
        thread::sleep(Duration::from_millis(100));
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    let c = counter.clone();
    pool.submit(move || {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    pool.wait();

    // Both tasks ran, and the second was not skipped or started early.
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
#[timeout(1000)]
fn wait_on_idle_pool_returns_immediately() {
    let pool = ThreadPool::new(2);
    pool.wait();
}

#[test]
#[timeout(5000)]
fn single_worker_dequeues_in_submission_order() {
    let pool = ThreadPool::new(1);
    let (gate_tx, gate_rx) = unbounded();
    let (tx, rx) = unbounded();

    // Hold the only worker so the remaining submissions pile up in the queue.
    pool.submit(move || {
        gate_rx.recv().unwrap();
    })
    .unwrap();

    for i in 0..10 {
        let tx = tx.clone();
        pool.submit(move || {
            tx.send(i).unwrap();
        })
        .unwrap();
    }

    gate_tx.send(()).unwrap();
    pool.wait();

    let order: Vec<i32> = rx.try_iter().collect();
    assert_eq!(order, (0..10).collect::<Vec<i32>>());
}

#[test]
#[timeout(5000)]
fn shutdown_drains_queued_tasks() {
    let pool = ThreadPool::new(1);
    let counter = Arc::new(AtomicUsize::new(0));
    let (gate_tx, gate_rx) = unbounded();

    // Keep the only worker busy so the rest of the tasks stay queued when
    // shutdown begins.
    pool.submit(move || {
        gate_rx.recv().unwrap();
    })
    .unwrap();

    for _ in 0..5 {
        let counter = counter.clone();
        pool.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    // Release the worker once shutdown is underway.
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        gate_tx.send(()).unwrap();
    });

    pool.shutdown();

    assert_eq!(counter.load(Ordering::SeqCst), 5);
    releaser.join().unwrap();
}

#[test]
#[timeout(5000)]
fn shutdown_twice_is_harmless() {
    let pool = ThreadPool::new(2);
    pool.shutdown();
    pool.shutdown();
    assert_eq!(pool.threads(), 0);
}

#[test]
#[timeout(5000)]
fn panicking_task_does_not_kill_worker() {
    let pool = ThreadPool::new(1);

    pool.submit(|| panic!("oh no!")).unwrap();
    pool.wait();

    assert_eq!(pool.panicked_tasks(), 1);
    assert_eq!(pool.threads(), 1);

    // The worker survived and keeps taking tasks.
    let (tx, rx) = unbounded();
    pool.submit(move || tx.send(4).unwrap()).unwrap();
    assert_eq!(rx.recv().unwrap(), 4);
    assert_eq!(pool.completed_tasks(), 2);
}

#[test]
#[timeout(1000)]
fn pool_is_send_and_sync() {
    let pool = Arc::new(ThreadPool::new(1));
    let (tx, rx) = unbounded();

    let handle = thread::spawn(move || {
        tx.send(pool).unwrap();
    });

    let pool = rx.recv().unwrap();
    pool.submit(|| {}).unwrap();
    handle.join().unwrap();
}

#[test]
#[timeout(10000)]
fn concurrent_submitters() {
    let pool = Arc::new(ThreadPool::new(4));
    let counter = Arc::new(AtomicUsize::new(0));
    let mut submitters = Vec::new();

    for _ in 0..8 {
        let pool = pool.clone();
        let counter = counter.clone();

        submitters.push(thread::spawn(move || {
            for _ in 0..50 {
                let counter = counter.clone();
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }));
    }

    for submitter in submitters {
        submitter.join().unwrap();
    }

    pool.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 400);
}

#[test]
#[timeout(5000)]
fn dropping_pool_drains_queued_tasks() {
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let pool = ThreadPool::new(2);

        for _ in 0..20 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
    }

    // Drop blocked until every queued task ran.
    assert_eq!(counter.load(Ordering::SeqCst), 20);
}
