// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Wait Queue
//!
//! The blocking primitive underneath mutexes, semaphores, and events.
//!
//! # Design
//!
//! - **Priority-ordered**: waiters queue by priority, FIFO within a level
//! - **Generation-tagged entries**: each entry carries the wait
//!   generation the thread parked under; a timed-out waiter leaves a
//!   stale entry behind which wakers skip and the waiter itself removes.
//!   The waking side therefore always tolerates a waiter that is gone.
//! - **Scheduler-locked**: every mutation happens under the scheduler
//!   lock with interrupts masked

use crate::sched::{self, SchedGuard};
use crate::thread::{ThreadId, ThreadPriority, ThreadState};
use crate::timer::{self, TimerAction};
use crate::types::{status, Status};
use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;

/// Magic number for wait queue validation
const WAIT_QUEUE_MAGIC: u32 = 0x5741_4954; // "WAIT"

/// Wait queue entry
#[derive(Debug, Clone, Copy)]
pub(crate) struct Waiter {
    pub(crate) tid: ThreadId,
    pub(crate) gen: u64,
    pub(crate) priority: ThreadPriority,
}

/// Queue of threads blocked on one synchronization object.
pub struct WaitQueue {
    queue: Mutex<VecDeque<Waiter>>,
    magic: AtomicU32,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            magic: AtomicU32::new(WAIT_QUEUE_MAGIC),
        }
    }

    fn validate(&self) {
        assert_eq!(
            self.magic.load(Ordering::Relaxed),
            WAIT_QUEUE_MAGIC,
            "operation on a destroyed wait queue"
        );
    }

    /// Block the current thread on this queue.
    ///
    /// Consumes the scheduler guard (the block is the reschedule). With
    /// a deadline, a timer wake delivers `ERR_TIMED_OUT` and the entry
    /// is cleaned up here before returning.
    ///
    /// # Returns
    ///
    /// The wake reason: `OK`, `ERR_TIMED_OUT`, or `ERR_OBJECT_DESTROYED`.
    pub(crate) fn block_locked(&self, mut l: SchedGuard, deadline_us: Option<u64>) -> Status {
        self.validate();

        let me = l.current;
        let (gen, priority) = {
            let rec = l.threads.get_mut(&me).expect("wait_queue: current thread missing");
            rec.wait_gen += 1;
            rec.wait_result = status::OK;
            rec.state = ThreadState::Blocked;
            (rec.wait_gen, rec.priority)
        };

        insert_by_priority(
            &mut self.queue.lock(),
            Waiter { tid: me, gen, priority },
        );

        if let Some(deadline) = deadline_us {
            timer::arm(
                deadline,
                TimerAction::Wake {
                    tid: me,
                    gen,
                    reason: status::ERR_TIMED_OUT,
                },
            );
        }

        sched::reschedule(l);

        let l = sched::lock();
        let result = l.threads.get(&me).expect("wait_queue: current thread missing").wait_result;
        if result == status::ERR_TIMED_OUT {
            // Nobody woke us; take our entry back out.
            self.queue.lock().retain(|w| !(w.tid == me && w.gen == gen));
        }
        drop(l);
        result
    }

    /// Convenience wrapper taking the scheduler lock itself.
    pub fn block(&self, deadline_us: Option<u64>) -> Status {
        let l = sched::lock();
        self.block_locked(l, deadline_us)
    }

    /// Wake the highest-priority live waiter.
    ///
    /// Returns the woken thread and its priority, or None if only stale
    /// entries (or nothing) remained.
    pub(crate) fn wake_one_locked(
        &self,
        l: &mut SchedGuard,
        reason: Status,
    ) -> Option<(ThreadId, ThreadPriority)> {
        self.validate();

        let mut queue = self.queue.lock();
        while let Some(w) = queue.pop_front() {
            let live = l
                .threads
                .get(&w.tid)
                .map_or(false, |r| r.state == ThreadState::Blocked && r.wait_gen == w.gen);
            if live {
                drop(queue);
                l.make_ready(w.tid, reason);
                return Some((w.tid, w.priority));
            }
            // Stale: the waiter timed out before we got here.
        }
        None
    }

    /// Wake every live waiter. Returns how many were woken.
    pub(crate) fn wake_all_locked(&self, l: &mut SchedGuard, reason: Status) -> usize {
        let mut count = 0;
        while self.wake_one_locked(l, reason).is_some() {
            count += 1;
        }
        count
    }

    /// Wake one waiter (for drivers and interrupt handlers).
    pub fn wake_one(&self, reason: Status) -> bool {
        let mut l = sched::lock();
        self.wake_one_locked(&mut l, reason).is_some()
    }

    /// Wake all waiters (for drivers and interrupt handlers).
    pub fn wake_all(&self, reason: Status) -> usize {
        let mut l = sched::lock();
        self.wake_all_locked(&mut l, reason)
    }

    /// Whether any entries are queued. Stale entries from a timed-out
    /// waiter may be counted until it runs again.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Tear the queue down; any further use panics.
    ///
    /// Panics if threads are still waiting.
    pub fn destroy(&self) {
        self.validate();
        assert!(
            self.is_empty(),
            "wait_queue_destroy: threads still waiting"
        );
        self.magic.store(0, Ordering::Relaxed);
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Higher priority first; FIFO among equals.
fn insert_by_priority(queue: &mut VecDeque<Waiter>, waiter: Waiter) {
    let pos = queue
        .iter()
        .position(|w| w.priority < waiter.priority)
        .unwrap_or(queue.len());
    queue.insert(pos, waiter);
}

// ============================================================================
// Tests
// ============================================================================
