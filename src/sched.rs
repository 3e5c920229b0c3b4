// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Scheduler
//!
//! Priority-based preemptive round-robin scheduler.
//!
//! # Design
//!
//! - **Priority-based**: 32 priority levels, highest runs first
//! - **Round-robin**: FIFO order within a priority level
//! - **Preemptive**: quantum expiry and higher-priority wakeups request
//!   a reschedule, delivered at the nearest reschedule point
//! - **Single CPU**: one run queue set, one current thread
//!
//! All scheduler state lives behind a single lock, acquired with
//! interrupts masked; the thread table and the run queues are both
//! under it. The lock is logically handed across a context switch: the
//! switching thread's guard stays live while it is suspended and the resuming
//! thread drops its own guard immediately after the switch returns, so
//! the release always happens on the incoming side. Threads entered for
//! the first time release it in the entry trampoline instead.

use crate::arch;
use crate::thread::{ThreadFlags, ThreadId, ThreadRecord, ThreadState, TID_INVALID};
use crate::types::Status;
use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};
use spin::{Mutex, MutexGuard, Once};

/// ============================================================================
/// Scheduler Configuration
/// ============================================================================

/// Number of priority levels
pub const NUM_PRIORITIES: usize = 32;

/// Quantum granted at dispatch, in platform timer ticks
const DEFAULT_QUANTUM_TICKS: u32 = 10;

static DEFAULT_QUANTUM: AtomicU32 = AtomicU32::new(DEFAULT_QUANTUM_TICKS);

/// Override the dispatch quantum (boot-argument `kernel.quantum_ticks`).
pub fn set_default_quantum(ticks: u32) {
    if ticks > 0 {
        DEFAULT_QUANTUM.store(ticks, Ordering::Relaxed);
    }
}

pub(crate) fn default_quantum() -> u32 {
    DEFAULT_QUANTUM.load(Ordering::Relaxed)
}

/// ============================================================================
/// Run Queue
/// ============================================================================

/// The ready set: one FIFO per priority plus a bitmap of the non-empty
/// levels.
pub(crate) struct RunQueue {
    queues: [VecDeque<ThreadId>; NUM_PRIORITIES],
    bitmap: u32,
}

impl RunQueue {
    pub(crate) fn new() -> Self {
        Self {
            queues: core::array::from_fn(|_| VecDeque::new()),
            bitmap: 0,
        }
    }

    pub(crate) fn push_tail(&mut self, priority: u8, tid: ThreadId) {
        self.queues[priority as usize].push_back(tid);
        self.bitmap |= 1 << priority;
    }

    pub(crate) fn push_head(&mut self, priority: u8, tid: ThreadId) {
        self.queues[priority as usize].push_front(tid);
        self.bitmap |= 1 << priority;
    }

    /// Pop the head of the highest non-empty priority FIFO.
    pub(crate) fn pop_highest(&mut self) -> Option<ThreadId> {
        if self.bitmap == 0 {
            return None;
        }
        let priority = 31 - self.bitmap.leading_zeros() as usize;
        let queue = &mut self.queues[priority];
        let tid = queue.pop_front();
        if queue.is_empty() {
            self.bitmap &= !(1 << priority);
        }
        tid
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bitmap == 0
    }
}

/// ============================================================================
/// Scheduler State
/// ============================================================================

pub(crate) struct SchedState {
    /// Every live thread record, keyed by id. Boxed so record addresses
    /// stay stable while the map rebalances.
    pub(crate) threads: BTreeMap<ThreadId, Box<ThreadRecord>>,

    pub(crate) run_queue: RunQueue,

    /// The one Running thread
    pub(crate) current: ThreadId,

    /// The idle thread; always Running or Ready, never blocks
    pub(crate) idle: ThreadId,

    /// A wakeup outranked the current thread (or its quantum expired)
    pub(crate) preempt_pending: bool,

    /// Exited detached threads awaiting reclamation. An entry's stack is
    /// still live until its owner has switched away, so the graveyard is
    /// only drained for threads other than `current`.
    pub(crate) graveyard: Vec<Box<ThreadRecord>>,
}

static SCHED: Once<Mutex<SchedState>> = Once::new();

/// Scheduler lock guard; pairs the spinlock with the interrupt mask.
pub(crate) struct SchedGuard {
    guard: MutexGuard<'static, SchedState>,
    _ints: arch::IntState,
}

impl Deref for SchedGuard {
    type Target = SchedState;
    fn deref(&self) -> &SchedState {
        &self.guard
    }
}

impl DerefMut for SchedGuard {
    fn deref_mut(&mut self) -> &mut SchedState {
        &mut self.guard
    }
}

/// Acquire the scheduler lock with interrupts masked.
pub(crate) fn lock() -> SchedGuard {
    let ints = arch::ints_disable();
    let guard = SCHED
        .get()
        .expect("scheduler not initialized; call minikern::init first")
        .lock();
    SchedGuard { guard, _ints: ints }
}

/// Release the scheduler lock inherited across a context switch.
///
/// # Safety
///
/// Only valid as the very first action of a freshly entered thread,
/// which holds the lock but owns no guard for it.
pub(crate) unsafe fn unlock_from_switch() {
    SCHED
        .get()
        .expect("scheduler not initialized")
        .force_unlock();
    arch::ints_force_enable();
}

/// ============================================================================
/// Initialization
/// ============================================================================

/// Stack for the idle thread; it runs the poll loop and little else.
const IDLE_STACK_SIZE: usize = 32 * 1024;

/// Bring the scheduler up: adopt the calling context as the bootstrap
/// thread and start the idle thread.
pub(crate) fn init() {
    let bootstrap = crate::thread::new_bootstrap_record("bootstrap");
    let boot_tid = bootstrap.tid;

    SCHED.call_once(|| {
        let mut threads = BTreeMap::new();
        threads.insert(boot_tid, Box::new(bootstrap));
        Mutex::new(SchedState {
            threads,
            run_queue: RunQueue::new(),
            current: boot_tid,
            idle: TID_INVALID,
            preempt_pending: false,
            graveyard: Vec::new(),
        })
    });

    let idle = crate::thread::create(
        "idle",
        crate::thread::IDLE_PRIORITY,
        IDLE_STACK_SIZE,
        idle_main,
    )
    .expect("failed to create idle thread");
    crate::thread::set_real_time(idle).expect("failed to mark idle real-time");

    {
        let mut l = lock();
        l.idle = idle;
    }
    crate::thread::resume(idle).expect("failed to start idle thread");

    log::info!("scheduler online: {} priorities, quantum {} ticks", NUM_PRIORITIES, default_quantum());
}

fn idle_main() -> i32 {
    loop {
        crate::timer::poll();
        crate::thread::yield_now();
        crate::platform::get().idle();
    }
}

/// ============================================================================
/// Core Operations
/// ============================================================================

impl SchedState {
    /// Insert a Ready thread into the run queue, recording a preemption
    /// request when it outranks the current thread.
    pub(crate) fn ready_insert(&mut self, tid: ThreadId, at_head: bool) {
        let priority = {
            let rec = self.threads.get(&tid).expect("ready_insert: unknown thread");
            debug_assert_eq!(rec.state, ThreadState::Ready);
            rec.priority
        };

        if at_head {
            self.run_queue.push_head(priority, tid);
        } else {
            self.run_queue.push_tail(priority, tid);
        }

        // The current thread may already be in the graveyard when an
        // exiting thread wakes its joiner; it cannot be outranked then.
        let cur_priority = self
            .threads
            .get(&self.current)
            .map(|r| r.priority)
            .unwrap_or(0);
        if priority > cur_priority {
            self.preempt_pending = true;
        }
    }

    /// Transition a Blocked/Sleeping thread to Ready with a wake reason.
    pub(crate) fn make_ready(&mut self, tid: ThreadId, reason: Status) {
        {
            let rec = self.threads.get_mut(&tid).expect("make_ready: unknown thread");
            debug_assert!(
                matches!(rec.state, ThreadState::Blocked | ThreadState::Sleeping),
                "make_ready: thread {} in state {:?}",
                tid,
                rec.state
            );
            rec.wait_result = reason;
            rec.state = ThreadState::Ready;
        }
        self.ready_insert(tid, false);
    }
}

/// Timer-driven wake. Ignores entries whose generation no longer
/// matches: the sleeper was already woken (or timed out) and may have
/// moved on.
pub(crate) fn timer_wake(tid: ThreadId, gen: u64, reason: Status) {
    let mut l = lock();
    let parked = l
        .threads
        .get(&tid)
        .map_or(false, |r| {
            r.wait_gen == gen && matches!(r.state, ThreadState::Blocked | ThreadState::Sleeping)
        });
    if parked {
        l.make_ready(tid, reason);
    }
}

/// Pick and switch to the highest-priority Ready thread.
///
/// The caller must already have repositioned the current thread (ready
/// queue, wait queue, sleep, or death) before calling. Consumes the
/// guard: it is either dropped here (no switch needed) or carried across
/// the switch and dropped when this thread next resumes.
pub(crate) fn reschedule(mut l: SchedGuard) {
    reap_graveyard(&mut l);
    l.preempt_pending = false;

    let prev = l.current;
    let next = l
        .run_queue
        .pop_highest()
        .expect("reschedule: no runnable threads");

    if next == prev {
        let quantum = default_quantum();
        let rec = l.threads.get_mut(&prev).expect("reschedule: current thread missing");
        rec.state = ThreadState::Running;
        rec.remaining_quantum = quantum;
        return;
    }

    let new_sp = {
        let quantum = default_quantum();
        let rec = l.threads.get_mut(&next).expect("reschedule: next thread missing");
        debug_assert_eq!(rec.state, ThreadState::Ready);
        rec.state = ThreadState::Running;
        rec.remaining_quantum = quantum;
        rec.sp
    };

    // An exiting detached thread has already moved its record to the
    // graveyard; its stack (and this sp slot) stay valid until the
    // switch below completes.
    let old_sp: *mut usize = if l.threads.contains_key(&prev) {
        let rec = l.threads.get_mut(&prev).expect("reschedule: current thread missing");
        &mut rec.sp
    } else {
        let rec = l
            .graveyard
            .iter_mut()
            .find(|r| r.tid == prev)
            .expect("reschedule: outgoing thread record missing");
        &mut rec.sp
    };

    l.current = next;

    unsafe { arch::context_switch(old_sp, new_sp) };
    // Back on this thread's stack; dropping `l` releases the lock the
    // thread that switched to us was holding.
}

/// Deliver a pending preemption: put the current thread back at the head
/// of its priority FIFO (it did not finish its quantum) and reschedule.
pub(crate) fn preempt_if_pending(mut l: SchedGuard) {
    if !l.preempt_pending {
        return;
    }
    let prev = l.current;
    {
        let rec = l.threads.get_mut(&prev).expect("preempt: current thread missing");
        debug_assert_eq!(rec.state, ThreadState::Running);
        rec.state = ThreadState::Ready;
    }
    l.ready_insert(prev, true);
    reschedule(l);
}

fn reap_graveyard(l: &mut SchedGuard) {
    if l.graveyard.is_empty() {
        return;
    }
    let cur = l.current;
    l.graveyard.retain(|rec| rec.tid == cur);
}

/// ============================================================================
/// Preemption Tick
/// ============================================================================

/// Account one platform timer tick against the running thread's
/// quantum. Real-time threads and the idle thread are exempt. Called
/// from the platform's periodic tick (interrupt context is fine).
pub fn preempt_tick() {
    let mut l = lock();
    let cur = l.current;
    if cur == l.idle {
        return;
    }
    let expired = {
        let rec = l.threads.get_mut(&cur).expect("preempt_tick: current thread missing");
        if rec.flags.contains(ThreadFlags::REAL_TIME) {
            false
        } else {
            if rec.remaining_quantum > 0 {
                rec.remaining_quantum -= 1;
            }
            rec.remaining_quantum == 0
        }
    };
    if expired {
        l.preempt_pending = true;
    }
}

/// Whether a preemption has been requested but not yet delivered.
pub fn preempt_requested() -> bool {
    lock().preempt_pending
}

/// Deliver a requested preemption, if any. The platform calls this on
/// the interrupt exit path.
pub fn preempt() {
    let l = lock();
    preempt_if_pending(l);
}

// ============================================================================
// Tests
// ============================================================================
