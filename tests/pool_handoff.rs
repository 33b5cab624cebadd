//! End-to-end wake-protocol tests against the process-wide pool.
//!
//! The pool is a singleton, so every test in this process shares one
//! roster; tests are written to tolerate workers being claimed by their
//! neighbors. Counts are clamped to the machine, so anything needing a
//! second worker skips itself on single-core runners.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

const DEADLINE: Duration = Duration::from_secs(10);

fn ensure_pool() {
    parkpool::prepare(4);
    while parkpool::worker_count() == 0 {
        thread::yield_now();
    }
}

/// Keeps offering `task` until some worker accepts it.
fn spawn_blocking<F>(task: F)
where
    F: Fn(parkpool::WorkerId) + Clone + Send + 'static,
{
    let start = Instant::now();
    loop {
        if parkpool::try_spawn(task.clone()) {
            return;
        }
        assert!(start.elapsed() < DEADLINE, "no worker accepted the task");
        thread::yield_now();
    }
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < DEADLINE, "timed out waiting for {what}");
        thread::yield_now();
    }
}

#[test]
fn test_try_spawn_reaches_idle_worker() {
    ensure_pool();
    if parkpool::worker_count() < 2 {
        return;
    }

    let cell = Arc::new(AtomicUsize::new(0));
    let cell2 = Arc::clone(&cell);
    spawn_blocking(move |_| {
        cell2.store(42, Ordering::SeqCst);
    });

    wait_until("the cell to be written", || cell.load(Ordering::SeqCst) == 42);
}

#[test]
fn test_task_sees_writes_made_before_spawn() {
    ensure_pool();
    if parkpool::worker_count() < 2 {
        return;
    }

    for round in 0..100 {
        let before = Arc::new(AtomicUsize::new(0));
        before.store(round + 1, Ordering::Relaxed);

        let before2 = Arc::clone(&before);
        let (tx, rx) = mpsc::channel();
        spawn_blocking(move |_| {
            // Publication through the slot mutex makes the producer's
            // prior writes visible here.
            tx.send(before2.load(Ordering::Relaxed)).unwrap();
        });
        assert_eq!(rx.recv().unwrap(), round + 1);
    }
}

#[test]
fn test_tasks_run_on_managed_workers() {
    ensure_pool();
    if parkpool::worker_count() < 2 {
        return;
    }

    let (tx, rx) = mpsc::channel();
    spawn_blocking(move |id| {
        tx.send((id, parkpool::current())).unwrap();
    });

    let (id, current) = rx.recv().unwrap();
    assert_eq!(id, current);
    assert!(parkpool::is_managed(id));
    assert_ne!(id, parkpool::MAIN_ID);
}

#[test]
fn test_roster_queries() {
    ensure_pool();

    let count = parkpool::worker_count();
    let all = parkpool::all_workers();

    assert_eq!(all.len(), count);
    assert_eq!(all[0], parkpool::MAIN_ID);

    let mut sorted = all.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..count).collect::<Vec<_>>());

    for id in all {
        assert!(parkpool::is_managed(id));
    }
    assert!(!parkpool::is_managed(count));
    assert!(!parkpool::is_managed(usize::MAX));
}

#[test]
fn test_prepare_is_idempotent() {
    ensure_pool();
    let count = parkpool::worker_count();

    parkpool::prepare(1);
    parkpool::prepare_opt(None);
    parkpool::prepare_opt(Some(2));

    assert_eq!(parkpool::worker_count(), count);
}

#[test]
fn test_current_panics_off_pool() {
    ensure_pool();

    // Freshly spawned OS threads are never managed.
    let result = thread::spawn(|| {
        std::panic::catch_unwind(parkpool::current).is_err()
    })
    .join()
    .unwrap();
    assert!(result);
}

#[test]
fn test_wakeup_during_task_delivers_exactly_once() {
    ensure_pool();
    if parkpool::worker_count() < 2 {
        return;
    }

    let runs = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let runs2 = Arc::clone(&runs);
    let gate2 = Arc::clone(&gate);
    spawn_blocking(move |id| {
        runs2.fetch_add(1, Ordering::SeqCst);
        tx.send(id).unwrap();
        while !gate2.load(Ordering::SeqCst) {
            thread::yield_now();
        }
    });

    // The worker is mid-task; the nudge must not produce a second run of
    // anything observable.
    let id = rx.recv().unwrap();
    parkpool::wakeup(id);
    parkpool::wakeup(id);
    gate.store(true, Ordering::SeqCst);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_idle_returns_when_predicate_flips() {
    ensure_pool();
    if parkpool::worker_count() < 2 {
        return;
    }

    struct Ready {
        done: AtomicBool,
    }

    let ready = Arc::new(Ready {
        done: AtomicBool::new(false),
    });
    let finished = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let ready2 = Arc::clone(&ready);
    let finished2 = Arc::clone(&finished);
    spawn_blocking(move |id| {
        tx.send(id).unwrap();
        parkpool::idle(&*ready2, |r| r.done.load(Ordering::SeqCst));
        finished2.store(true, Ordering::SeqCst);
    });

    let id = rx.recv().unwrap();
    assert!(!finished.load(Ordering::SeqCst));

    ready.done.store(true, Ordering::SeqCst);
    parkpool::wakeup(id);

    wait_until("idle() to observe the predicate", || {
        finished.load(Ordering::SeqCst)
    });
}

#[test]
fn test_idle_worker_still_accepts_real_tasks() {
    ensure_pool();
    if parkpool::worker_count() < 3 {
        return;
    }

    let done = Arc::new(AtomicBool::new(false));
    let ran_inside = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let done2 = Arc::clone(&done);
    let finished2 = Arc::clone(&finished);
    spawn_blocking(move |id| {
        tx.send(id).unwrap();
        parkpool::idle(&*done2, |d| d.load(Ordering::SeqCst));
        finished2.store(true, Ordering::SeqCst);
    });
    let idler = rx.recv().unwrap();

    // A task handed to the pool while the worker idles runs on some worker
    // thread, possibly the idling one, before its predicate flips.
    let ran2 = Arc::clone(&ran_inside);
    spawn_blocking(move |_| {
        ran2.fetch_add(1, Ordering::SeqCst);
    });
    wait_until("the interleaved task", || ran_inside.load(Ordering::SeqCst) == 1);

    done.store(true, Ordering::SeqCst);
    parkpool::wakeup(idler);
    wait_until("idle() to return", || finished.load(Ordering::SeqCst));
}

#[test]
fn test_many_handoffs() {
    ensure_pool();
    if parkpool::worker_count() < 2 {
        return;
    }

    const TASKS: usize = 1_000;
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..TASKS {
        let ran = Arc::clone(&ran);
        spawn_blocking(move |_| {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }

    wait_until("all tasks to run", || ran.load(Ordering::SeqCst) == TASKS);
}
