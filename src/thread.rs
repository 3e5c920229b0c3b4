// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Management
//!
//! Threads are the schedulable unit. Each has a record in the scheduler
//! table holding its stack, saved context, priority, and lifecycle
//! state; callers refer to threads by [`ThreadId`].
//!
//! # Thread States
//!
//! ```text
//! Suspended -> Ready -> Running -> Blocked/Sleeping -> Ready ...
//!                          |
//!                          v
//!                        Death (reaped by join/detach)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let t = thread::create("worker", thread::DEFAULT_PRIORITY,
//!                        thread::DEFAULT_STACK_SIZE, || { 0 })?;
//! thread::resume(t)?;
//! let code = thread::join(t, INFINITE_TIME)?;
//! ```
//!
//! Misuse, such as resuming a thread that is not suspended or exiting
//! the idle thread, is a programming error and panics rather than
//! mis-scheduling silently.

use crate::arch;
use crate::platform;
use crate::sched::{self, SchedState};
use crate::timer::{self, TimerAction};
use crate::types::{status, Result, Status, INFINITE_TIME};
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU64, Ordering};
use log::debug;

/// ============================================================================
/// Thread ID
/// ============================================================================

/// Thread ID type
pub type ThreadId = u64;

/// Invalid thread ID
pub const TID_INVALID: ThreadId = 0;

static TID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

fn alloc_tid() -> ThreadId {
    TID_ALLOCATOR.fetch_add(1, Ordering::Relaxed)
}

/// ============================================================================
/// Priorities and Stacks
/// ============================================================================

/// Thread priority (0 = idle, 31 = highest)
pub type ThreadPriority = u8;

pub const IDLE_PRIORITY: ThreadPriority = 0;
pub const LOWEST_PRIORITY: ThreadPriority = 1;
pub const LOW_PRIORITY: ThreadPriority = 4;
pub const DEFAULT_PRIORITY: ThreadPriority = 16;
pub const HIGH_PRIORITY: ThreadPriority = 24;
pub const HIGHEST_PRIORITY: ThreadPriority = 31;

/// Default thread stack size
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest stack `create` accepts
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Magic number for thread record validation
const THREAD_MAGIC: u32 = 0x5448_5244; // "THRD"

/// ============================================================================
/// Thread State
/// ============================================================================

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but not yet started
    Suspended = 0,

    /// Eligible to run (in a run queue)
    Ready = 1,

    /// Currently executing
    Running = 2,

    /// Parked on a wait queue or join
    Blocked = 3,

    /// Parked on a timer deadline
    Sleeping = 4,

    /// Exited; record held until reaped
    Death = 5,
}

impl ThreadState {
    pub const fn is_alive(self) -> bool {
        !matches!(self, Self::Death)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThreadFlags: u32 {
        /// Exempt from quantum preemption
        const REAL_TIME = 0x1;
        /// Self-reaping; may not be joined
        const DETACHED = 0x2;
    }
}

/// ============================================================================
/// Thread Record
/// ============================================================================

/// Per-thread state, owned by the scheduler table and mutated only under
/// the scheduler lock.
pub(crate) struct ThreadRecord {
    pub(crate) tid: ThreadId,
    pub(crate) magic: u32,
    pub(crate) name: String,
    pub(crate) priority: ThreadPriority,
    pub(crate) state: ThreadState,
    pub(crate) flags: ThreadFlags,
    pub(crate) remaining_quantum: u32,

    /// Bumped each time the thread parks; wait-queue entries and timer
    /// wakeups carry the value they were created under, so stale ones
    /// are recognizable.
    pub(crate) wait_gen: u64,

    /// Why the last park ended
    pub(crate) wait_result: Status,

    pub(crate) retcode: Option<i32>,

    /// The single thread joined on us, if any
    pub(crate) joiner: Option<ThreadId>,

    /// Entry closure, consumed by the trampoline on first dispatch
    pub(crate) entry: Option<Box<dyn FnOnce() -> i32 + Send>>,

    /// Owned stack; None for the adopted bootstrap thread
    pub(crate) stack: Option<Box<[u8]>>,

    /// Saved stack pointer while not running
    pub(crate) sp: usize,
}

pub(crate) fn new_bootstrap_record(name: &str) -> ThreadRecord {
    ThreadRecord {
        tid: alloc_tid(),
        magic: THREAD_MAGIC,
        name: name.to_string(),
        priority: DEFAULT_PRIORITY,
        state: ThreadState::Running,
        flags: ThreadFlags::empty(),
        remaining_quantum: sched::default_quantum(),
        wait_gen: 0,
        wait_result: status::OK,
        retcode: None,
        joiner: None,
        entry: None,
        stack: None,
        sp: 0,
    }
}

/// ============================================================================
/// Lifecycle
/// ============================================================================

/// Create a thread in the Suspended state.
///
/// The entry closure runs on the new thread's own stack once `resume`
/// schedules it; its return value becomes the thread's exit code.
///
/// # Arguments
///
/// * `name` - Debugging name
/// * `priority` - Scheduling priority, `0..=31`
/// * `stack_size` - Stack size in bytes, at least `MIN_STACK_SIZE`
/// * `entry` - Thread body
pub fn create<F>(
    name: &str,
    priority: ThreadPriority,
    stack_size: usize,
    entry: F,
) -> Result<ThreadId>
where
    F: FnOnce() -> i32 + Send + 'static,
{
    if priority > HIGHEST_PRIORITY {
        return Err(status::ERR_INVALID_ARGS);
    }
    if stack_size < MIN_STACK_SIZE {
        return Err(status::ERR_INVALID_ARGS);
    }

    let mut stack = alloc::vec![0u8; stack_size].into_boxed_slice();
    let sp = arch::init_stack_frame(&mut stack, thread_trampoline);
    let tid = alloc_tid();

    let record = ThreadRecord {
        tid,
        magic: THREAD_MAGIC,
        name: name.to_string(),
        priority,
        state: ThreadState::Suspended,
        flags: ThreadFlags::empty(),
        remaining_quantum: 0,
        wait_gen: 0,
        wait_result: status::OK,
        retcode: None,
        joiner: None,
        entry: Some(Box::new(entry)),
        stack: Some(stack),
        sp,
    };

    let mut l = sched::lock();
    l.threads.insert(tid, Box::new(record));
    drop(l);

    debug!("created thread {} ({}) priority {}", tid, name, priority);
    Ok(tid)
}

/// Schedule a Suspended thread.
///
/// If it outranks the caller, the switch happens before this returns.
pub fn resume(tid: ThreadId) -> Result {
    let mut l = sched::lock();
    {
        let rec = l.threads.get_mut(&tid).ok_or(status::ERR_BAD_HANDLE)?;
        if rec.magic != THREAD_MAGIC {
            return Err(status::ERR_BAD_HANDLE);
        }
        assert!(
            rec.state == ThreadState::Suspended,
            "thread_resume: thread {} ({}) is not suspended",
            tid,
            rec.name
        );
        rec.state = ThreadState::Ready;
        rec.wait_result = status::OK;
    }
    l.ready_insert(tid, false);
    sched::preempt_if_pending(l);
    Ok(())
}

/// Mark a thread self-reaping. An already-dead thread is reaped
/// immediately; a thread someone is joining cannot be detached.
pub fn detach(tid: ThreadId) -> Result {
    let mut l = sched::lock();
    {
        let rec = l.threads.get_mut(&tid).ok_or(status::ERR_BAD_HANDLE)?;
        if rec.magic != THREAD_MAGIC {
            return Err(status::ERR_BAD_HANDLE);
        }
        if rec.state != ThreadState::Death {
            if rec.joiner.is_some() {
                return Err(status::ERR_BAD_STATE);
            }
            rec.flags.insert(ThreadFlags::DETACHED);
            return Ok(());
        }
    }
    // Already exited: reap it here and now.
    reap(&mut l, tid);
    Ok(())
}

/// Detach and start a thread in one step.
pub fn detach_and_resume(tid: ThreadId) -> Result {
    detach(tid)?;
    resume(tid)
}

/// Wait for a thread to exit and collect its exit code.
///
/// A dead thread is reaped immediately. `timeout_ms` of zero is a
/// try-join; [`INFINITE_TIME`] waits forever.
///
/// # Returns
///
/// * `Ok(code)` - The thread's exit code; its record is reclaimed
/// * `Err(ERR_TIMED_OUT)` - Deadline expired; the thread stays joinable
/// * `Err(ERR_BAD_HANDLE)` - Unknown thread
/// * `Err(ERR_BAD_STATE)` - Detached, or someone else is already joining
pub fn join(tid: ThreadId, timeout_ms: u64) -> Result<i32> {
    let deadline = if timeout_ms == INFINITE_TIME {
        None
    } else {
        Some(platform::now_us().saturating_add(timer::ms_to_us(timeout_ms)))
    };

    let mut l = sched::lock();
    let me = l.current;

    let already_dead = {
        let rec = l.threads.get_mut(&tid).ok_or(status::ERR_BAD_HANDLE)?;
        if rec.magic != THREAD_MAGIC {
            return Err(status::ERR_BAD_HANDLE);
        }
        if rec.flags.contains(ThreadFlags::DETACHED) {
            return Err(status::ERR_BAD_STATE);
        }
        if rec.state == ThreadState::Death {
            true
        } else {
            if rec.joiner.is_some() {
                return Err(status::ERR_BAD_STATE);
            }
            if timeout_ms == 0 {
                return Err(status::ERR_TIMED_OUT);
            }
            rec.joiner = Some(me);
            false
        }
    };
    if already_dead {
        return Ok(reap(&mut l, tid));
    }

    {
        let rec = l.threads.get_mut(&me).expect("join: current thread missing");
        rec.wait_gen += 1;
        rec.wait_result = status::OK;
        rec.state = ThreadState::Blocked;
        if let Some(deadline_us) = deadline {
            timer::arm(
                deadline_us,
                TimerAction::Wake {
                    tid: me,
                    gen: rec.wait_gen,
                    reason: status::ERR_TIMED_OUT,
                },
            );
        }
    }
    sched::reschedule(l);

    // Woken: either the thread exited (OK) or the deadline fired.
    let mut l = sched::lock();
    let result = l.threads.get(&me).expect("join: current thread missing").wait_result;
    if result == status::OK {
        Ok(reap(&mut l, tid))
    } else {
        if let Some(rec) = l.threads.get_mut(&tid) {
            if rec.joiner == Some(me) {
                rec.joiner = None;
            }
        }
        Err(result)
    }
}

/// Terminate the current thread.
///
/// Stores the exit code, wakes the joiner if there is one, and switches
/// away for good. Detached threads park their record in the graveyard
/// for reclamation at a later reschedule.
pub fn exit(code: i32) -> ! {
    let mut l = sched::lock();
    let me = l.current;
    assert!(me != l.idle, "thread_exit: the idle thread may not exit");

    let (detached, joiner) = {
        let rec = l.threads.get_mut(&me).expect("thread_exit: current thread missing");
        debug_assert_eq!(rec.state, ThreadState::Running);
        rec.retcode = Some(code);
        rec.state = ThreadState::Death;
        (rec.flags.contains(ThreadFlags::DETACHED), rec.joiner.take())
    };

    if detached {
        let rec = l.threads.remove(&me).expect("thread_exit: record vanished");
        l.graveyard.push(rec);
    } else if let Some(j) = joiner {
        // The joiner may have timed out and be runnable again already;
        // only wake it if it is still parked.
        let parked = l.threads.get(&j).map_or(false, |r| r.state == ThreadState::Blocked);
        if parked {
            l.make_ready(j, status::OK);
        }
    }

    sched::reschedule(l);
    unreachable!("thread_exit: dead thread rescheduled");
}

/// Sleep for at least `ms` milliseconds.
pub fn sleep_ms(ms: u64) {
    if ms == 0 {
        yield_now();
        return;
    }
    let deadline = platform::now_us().saturating_add(timer::ms_to_us(ms));

    let mut l = sched::lock();
    let me = l.current;
    assert!(me != l.idle, "thread_sleep: the idle thread may not sleep");
    {
        let rec = l.threads.get_mut(&me).expect("thread_sleep: current thread missing");
        rec.wait_gen += 1;
        rec.wait_result = status::OK;
        rec.state = ThreadState::Sleeping;
        timer::arm(
            deadline,
            TimerAction::Wake {
                tid: me,
                gen: rec.wait_gen,
                reason: status::OK,
            },
        );
    }
    sched::reschedule(l);
}

/// Give up the CPU: move to the tail of our priority FIFO and let the
/// scheduler pick again.
pub fn yield_now() {
    timer::poll();

    let mut l = sched::lock();
    let me = l.current;
    {
        let rec = l.threads.get_mut(&me).expect("thread_yield: current thread missing");
        debug_assert_eq!(rec.state, ThreadState::Running);
        rec.state = ThreadState::Ready;
    }
    l.ready_insert(me, false);
    sched::reschedule(l);
}

/// Exempt a thread from quantum preemption. It still yields voluntarily
/// and is preempted by higher-priority wakeups.
pub fn set_real_time(tid: ThreadId) -> Result {
    let mut l = sched::lock();
    let rec = l.threads.get_mut(&tid).ok_or(status::ERR_BAD_HANDLE)?;
    if rec.magic != THREAD_MAGIC {
        return Err(status::ERR_BAD_HANDLE);
    }
    rec.flags.insert(ThreadFlags::REAL_TIME);
    Ok(())
}

fn reap(s: &mut SchedState, tid: ThreadId) -> i32 {
    let mut rec = s.threads.remove(&tid).expect("reap: thread missing");
    debug_assert_eq!(rec.state, ThreadState::Death);
    rec.magic = 0;
    rec.retcode.unwrap_or(0)
}

/// ============================================================================
/// Introspection
/// ============================================================================

/// The calling thread's id.
pub fn current_id() -> ThreadId {
    sched::lock().current
}

/// Number of live thread records (including zombies awaiting join).
pub fn count() -> usize {
    sched::lock().threads.len()
}

/// Snapshot of one thread for diagnostics.
#[derive(Debug, Clone)]
pub struct ThreadStats {
    pub tid: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub priority: ThreadPriority,
    pub real_time: bool,
}

/// Snapshot of every thread in the system.
pub fn stats() -> Vec<ThreadStats> {
    let l = sched::lock();
    l.threads
        .values()
        .map(|rec| ThreadStats {
            tid: rec.tid,
            name: rec.name.clone(),
            state: rec.state,
            priority: rec.priority,
            real_time: rec.flags.contains(ThreadFlags::REAL_TIME),
        })
        .collect()
}

/// ============================================================================
/// Entry Trampoline
/// ============================================================================

/// First code a new thread runs. Entered from the context switch with
/// the scheduler lock held and interrupts masked.
extern "C" fn thread_trampoline() -> ! {
    unsafe { sched::unlock_from_switch() };

    let entry = {
        let mut l = sched::lock();
        let me = l.current;
        l.threads
            .get_mut(&me)
            .expect("trampoline: current thread missing")
            .entry
            .take()
    };

    let code = match entry {
        Some(f) => run_entry(f),
        None => {
            log::error!("thread {} started without an entry point", current_id());
            status::ERR
        }
    };

    exit(code);
}

#[cfg(any(test, feature = "hosted"))]
fn run_entry(f: Box<dyn FnOnce() -> i32 + Send>) -> i32 {
    // A panic must not unwind into the switch frames below the entry;
    // turn it into an error exit code instead.
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || f())) {
        Ok(code) => code,
        Err(_) => {
            log::error!("thread {} panicked", current_id());
            -1
        }
    }
}

#[cfg(not(any(test, feature = "hosted")))]
fn run_entry(f: Box<dyn FnOnce() -> i32 + Send>) -> i32 {
    f()
}

// ============================================================================
// Tests
// ============================================================================
