// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization Tests
//!
//! Mutex, semaphore, and event contracts exercised on the hosted
//! kernel with real blocking and wakeups.

mod common;

use minikern::sync::{Event, EventFlags, Mutex as KMutex, Semaphore};
use minikern::thread;
use minikern::types::{status, INFINITE_TIME};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Mutex Tests
// ============================================================================

#[test]
fn mutex_exclusion_under_contention() {
    let _guard = common::setup();

    const THREADS: usize = 5;
    const ITERATIONS: usize = 10_000;

    let mutex = Arc::new(KMutex::new());
    let shared = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for i in 0..THREADS {
        let mutex = mutex.clone();
        let shared = shared.clone();
        let id = i as u64 + 1;
        let t = thread::create("mutex_tester", thread::DEFAULT_PRIORITY, thread::DEFAULT_STACK_SIZE, move || {
            let mut violations = 0i32;
            for _ in 0..ITERATIONS {
                mutex.acquire();
                if shared.swap(id, Ordering::SeqCst) != 0 {
                    violations += 1;
                }
                thread::yield_now();
                shared.store(0, Ordering::SeqCst);
                mutex.release();
                thread::yield_now();
            }
            violations
        })
        .unwrap();
        thread::resume(t).unwrap();
        handles.push(t);
    }

    for t in handles {
        assert_eq!(thread::join(t, INFINITE_TIME), Ok(0), "exclusion violated");
    }
    assert!(!mutex.is_held());
    mutex.destroy();
}

#[test]
fn mutex_timeouts_while_held() {
    let _guard = common::setup();

    let mutex = Arc::new(KMutex::new());

    let owner = {
        let mutex = mutex.clone();
        let t = thread::create("owner", thread::DEFAULT_PRIORITY, thread::DEFAULT_STACK_SIZE, move || {
            mutex.acquire();
            thread::sleep_ms(400);
            mutex.release();
            0
        })
        .unwrap();
        thread::resume(t).unwrap();
        t
    };

    // Give the owner a turn to take the lock and park in its sleep.
    thread::yield_now();
    assert!(mutex.is_held());

    // Two finite-timeout waiters...
    let mut waiters = Vec::new();
    for _ in 0..2 {
        let mutex = mutex.clone();
        let t = thread::create("timed_waiter", thread::DEFAULT_PRIORITY, thread::DEFAULT_STACK_SIZE, move || {
            if mutex.acquire_timeout(100) == status::ERR_TIMED_OUT {
                0
            } else {
                1
            }
        })
        .unwrap();
        thread::resume(t).unwrap();
        waiters.push(t);
    }

    // ...and two zero-timeout tries from here.
    assert_eq!(mutex.acquire_timeout(0), status::ERR_TIMED_OUT);
    assert_eq!(mutex.acquire_timeout(0), status::ERR_TIMED_OUT);

    for t in waiters {
        assert_eq!(thread::join(t, INFINITE_TIME), Ok(0), "waiter did not time out");
    }

    assert_eq!(thread::join(owner, INFINITE_TIME), Ok(0));

    // Free again: a straight acquire succeeds.
    assert_eq!(mutex.acquire_timeout(INFINITE_TIME), status::OK);
    mutex.release();
    mutex.destroy();
}

#[test]
fn mutex_handoff_goes_to_the_waiter() {
    let _guard = common::setup();

    let mutex = Arc::new(KMutex::new());
    let got_it = Arc::new(AtomicUsize::new(0));

    mutex.acquire();

    let waiter = {
        let mutex = mutex.clone();
        let got_it = got_it.clone();
        let t = thread::create("handoff", thread::DEFAULT_PRIORITY, thread::DEFAULT_STACK_SIZE, move || {
            mutex.acquire();
            got_it.store(1, Ordering::SeqCst);
            mutex.release();
            0
        })
        .unwrap();
        thread::resume(t).unwrap();
        t
    };

    // Let the waiter block on the queue.
    thread::yield_now();
    assert_eq!(got_it.load(Ordering::SeqCst), 0);

    // Release hands ownership over; the mutex is never free in between,
    // so our immediate re-try must fail.
    mutex.release();
    assert_eq!(mutex.acquire_timeout(0), status::ERR_TIMED_OUT);

    assert_eq!(thread::join(waiter, INFINITE_TIME), Ok(0));
    assert_eq!(got_it.load(Ordering::SeqCst), 1);
    mutex.destroy();
}

#[test]
fn mutex_recursion_balances() {
    let _guard = common::setup();

    let mutex = KMutex::new();
    mutex.acquire();
    mutex.acquire();
    assert_eq!(mutex.acquire_timeout(5), status::OK);

    mutex.release();
    mutex.release();
    assert!(mutex.is_held());
    mutex.release();
    assert!(!mutex.is_held());
    mutex.destroy();
}

#[test]
fn mutex_release_by_non_owner_is_fatal() {
    let _guard = common::setup();

    let mutex = Arc::new(KMutex::new());
    mutex.acquire();

    let rogue = {
        let mutex = mutex.clone();
        let t = thread::create("rogue", thread::DEFAULT_PRIORITY, thread::DEFAULT_STACK_SIZE, move || {
            // Fatal assert; the panic surfaces as exit code -1.
            mutex.release();
            0
        })
        .unwrap();
        thread::resume(t).unwrap();
        t
    };

    assert_eq!(thread::join(rogue, INFINITE_TIME), Ok(-1));
    assert!(mutex.is_held());
    mutex.release();
}

// ============================================================================
// Semaphore Tests
// ============================================================================

#[test]
fn semaphore_producer_consumer_balance() {
    let _guard = common::setup();

    const START_VALUE: i32 = 10;
    const TOTAL: usize = 2000;
    const CONSUMERS: usize = 4;

    let sem = Arc::new(Semaphore::new(START_VALUE));

    let mut consumers = Vec::new();
    for _ in 0..CONSUMERS {
        let sem = sem.clone();
        let t = thread::create("sem_consumer", thread::DEFAULT_PRIORITY, thread::DEFAULT_STACK_SIZE, move || {
            for _ in 0..TOTAL / CONSUMERS {
                if sem.wait() != status::OK {
                    return 1;
                }
            }
            0
        })
        .unwrap();
        thread::resume(t).unwrap();
        consumers.push(t);
    }

    let producer = {
        let sem = sem.clone();
        let t = thread::create("sem_producer", thread::DEFAULT_PRIORITY, thread::DEFAULT_STACK_SIZE, move || {
            for i in 0..TOTAL {
                sem.post(true);
                if i % 64 == 0 {
                    thread::yield_now();
                }
            }
            0
        })
        .unwrap();
        thread::resume(t).unwrap();
        t
    };

    for t in consumers {
        assert_eq!(thread::join(t, INFINITE_TIME), Ok(0));
    }
    assert_eq!(thread::join(producer, INFINITE_TIME), Ok(0));

    // N posts against N waits: the count is back where it started.
    assert_eq!(sem.count(), START_VALUE);
    sem.destroy();
}

#[test]
fn semaphore_try_wait() {
    let _guard = common::setup();

    let sem = Semaphore::new(1);
    assert_eq!(sem.try_wait(), status::OK);
    assert_eq!(sem.try_wait(), status::ERR_TIMED_OUT);
    sem.post(false);
    assert_eq!(sem.try_wait(), status::OK);
    sem.destroy();
}

#[test]
fn semaphore_destroy_wakes_waiters() {
    let _guard = common::setup();

    let sem = Arc::new(Semaphore::new(0));

    let waiter = {
        let sem = sem.clone();
        let t = thread::create("doomed", thread::DEFAULT_PRIORITY, thread::DEFAULT_STACK_SIZE, move || {
            sem.wait()
        })
        .unwrap();
        thread::resume(t).unwrap();
        t
    };

    // Let the waiter park, then tear the semaphore down.
    thread::yield_now();
    sem.destroy();

    assert_eq!(
        thread::join(waiter, INFINITE_TIME),
        Ok(status::ERR_OBJECT_DESTROYED)
    );
}

// ============================================================================
// Event Tests
// ============================================================================

fn park_waiters(
    event: &Arc<Event>,
    resumed: &Arc<AtomicUsize>,
    waiting: &Arc<AtomicUsize>,
    count: usize,
) -> Vec<thread::ThreadId> {
    let mut handles = Vec::new();
    for _ in 0..count {
        let event = event.clone();
        let resumed = resumed.clone();
        let waiting = waiting.clone();
        let t = thread::create("event_waiter", thread::DEFAULT_PRIORITY, thread::DEFAULT_STACK_SIZE, move || {
            waiting.fetch_add(1, Ordering::SeqCst);
            let r = event.wait();
            resumed.fetch_add(1, Ordering::SeqCst);
            r
        })
        .unwrap();
        thread::resume(t).unwrap();
        handles.push(t);
    }

    // Cooperative scheduling: once a waiter has bumped the counter it
    // runs uninterrupted into its block, so when we get the CPU back
    // with the counter full they are all parked.
    while waiting.load(Ordering::SeqCst) < count {
        thread::yield_now();
    }
    handles
}

#[test]
fn event_broadcast_wakes_everyone() {
    let _guard = common::setup();

    let event = Arc::new(Event::new(false, EventFlags::empty()));
    let resumed = Arc::new(AtomicUsize::new(0));
    let waiting = Arc::new(AtomicUsize::new(0));

    let handles = park_waiters(&event, &resumed, &waiting, 4);
    assert_eq!(resumed.load(Ordering::SeqCst), 0);

    assert_eq!(event.signal(false), 4);
    for t in handles {
        assert_eq!(thread::join(t, INFINITE_TIME), Ok(status::OK));
    }
    assert_eq!(resumed.load(Ordering::SeqCst), 4);

    // Manual reset: still signaled, a late wait sails through.
    assert!(event.is_signaled());
    assert_eq!(event.wait(), status::OK);
    event.unsignal();
    assert!(!event.is_signaled());
}

#[test]
fn event_auto_unsignal_wakes_one_per_signal() {
    let _guard = common::setup();

    let event = Arc::new(Event::new(false, EventFlags::AUTO_UNSIGNAL));
    let resumed = Arc::new(AtomicUsize::new(0));
    let waiting = Arc::new(AtomicUsize::new(0));

    let handles = park_waiters(&event, &resumed, &waiting, 2);

    assert_eq!(event.signal(false), 1);
    for _ in 0..10 {
        thread::yield_now();
    }
    assert_eq!(resumed.load(Ordering::SeqCst), 1);
    assert!(!event.is_signaled());

    assert_eq!(event.signal(false), 1);
    for t in handles {
        assert_eq!(thread::join(t, INFINITE_TIME), Ok(status::OK));
    }
    assert_eq!(resumed.load(Ordering::SeqCst), 2);

    // No waiters left: the signal latches for the next wait.
    assert_eq!(event.signal(false), 0);
    assert!(event.is_signaled());
    assert_eq!(event.wait(), status::OK);
    assert!(!event.is_signaled());
}

#[test]
fn event_destroy_wakes_with_error() {
    let _guard = common::setup();

    let event = Arc::new(Event::new(false, EventFlags::empty()));
    let resumed = Arc::new(AtomicUsize::new(0));
    let waiting = Arc::new(AtomicUsize::new(0));

    let handles = park_waiters(&event, &resumed, &waiting, 2);
    event.destroy();

    for t in handles {
        assert_eq!(
            thread::join(t, INFINITE_TIME),
            Ok(status::ERR_OBJECT_DESTROYED)
        );
    }
}
