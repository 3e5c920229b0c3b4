// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Counting Semaphore
//!
//! Signed count: a negative value is the number of blocked waiters.
//! `wait` decrements and blocks when the result is negative; `post`
//! increments and releases one waiter when anyone was blocked.

use crate::sched;
use crate::sync::WaitQueue;
use crate::types::{status, Status};
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex as SpinMutex;

/// Magic number for semaphore validation
const SEM_MAGIC: u32 = 0x5345_4D41; // "SEMA"

pub struct Semaphore {
    count: SpinMutex<i32>,
    wait: WaitQueue,
    magic: AtomicU32,
}

impl Semaphore {
    /// Create a semaphore with `initial` resources.
    pub const fn new(initial: i32) -> Self {
        Self {
            count: SpinMutex::new(initial),
            wait: WaitQueue::new(),
            magic: AtomicU32::new(SEM_MAGIC),
        }
    }

    fn validate(&self) {
        assert_eq!(
            self.magic.load(Ordering::Relaxed),
            SEM_MAGIC,
            "operation on a destroyed semaphore"
        );
    }

    /// Take one resource, blocking when none are available.
    ///
    /// # Returns
    ///
    /// `OK`, or `ERR_OBJECT_DESTROYED` if the semaphore was destroyed
    /// while we waited.
    pub fn wait(&self) -> Status {
        self.validate();

        let l = sched::lock();
        {
            let mut count = self.count.lock();
            *count -= 1;
            if *count >= 0 {
                return status::OK;
            }
        }
        self.wait.block_locked(l, None)
    }

    /// Take one resource without blocking.
    ///
    /// # Returns
    ///
    /// `OK`, or `ERR_TIMED_OUT` when nothing is available.
    pub fn try_wait(&self) -> Status {
        self.validate();

        let _l = sched::lock();
        let mut count = self.count.lock();
        if *count <= 0 {
            return status::ERR_TIMED_OUT;
        }
        *count -= 1;
        status::OK
    }

    /// Return one resource, waking a blocked waiter if there is one.
    ///
    /// With `reschedule` set and the woken thread outranking the caller,
    /// the switch happens before this returns; otherwise it is deferred
    /// to the next reschedule point. Safe from interrupt context.
    ///
    /// # Returns
    ///
    /// Number of threads woken (0 or 1).
    pub fn post(&self, reschedule: bool) -> usize {
        self.validate();

        let mut l = sched::lock();
        let had_waiters = {
            let mut count = self.count.lock();
            *count += 1;
            *count <= 0
        };

        if !had_waiters {
            return 0;
        }

        let woken = self.wait.wake_one_locked(&mut l, status::OK).is_some() as usize;
        if reschedule {
            sched::preempt_if_pending(l);
        }
        woken
    }

    /// Current count; negative means that many waiters.
    pub fn count(&self) -> i32 {
        self.validate();
        *self.count.lock()
    }

    /// Tear the semaphore down, waking every waiter with
    /// `ERR_OBJECT_DESTROYED`. Any further use panics.
    pub fn destroy(&self) {
        self.validate();
        let mut l = sched::lock();
        self.magic.store(0, Ordering::Relaxed);
        self.wait.wake_all_locked(&mut l, status::ERR_OBJECT_DESTROYED);
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

// ============================================================================
// Tests
// ============================================================================
