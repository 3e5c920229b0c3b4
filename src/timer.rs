// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Timer Management
//!
//! One-shot deadline queue on top of the platform clock. Sleeps and
//! timeouts arm entries here; the platform timer interrupt (or, hosted,
//! the reschedule-point poll) drains the due ones via [`tick`].
//!
//! # Design
//!
//! - **Deadline-ordered**: entries live in a min-heap keyed by deadline,
//!   with a sequence number breaking ties in arm order
//! - **Lazy cancellation**: a fired entry that no longer matches its
//!   thread's wait generation is discarded, so wakers never need to hunt
//!   for entries to remove
//! - **One outstanding platform request**: the earliest deadline is the
//!   only one handed to `Platform::schedule_oneshot`

use crate::platform;
use crate::thread::ThreadId;
use crate::types::Status;
use alloc::collections::BinaryHeap;
use core::cmp::Ordering as CmpOrdering;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::{Lazy, Mutex};

/// ============================================================================
/// Time sources
/// ============================================================================

/// Monotonic time since boot in microseconds.
pub fn current_time_us() -> u64 {
    platform::now_us()
}

/// Monotonic milliseconds since boot. Derived from the microsecond
/// clock; wraps after about 49.7 days.
pub fn current_time_ms() -> u32 {
    (platform::now_us() / 1000) as u32
}

/// Convert milliseconds to microseconds, saturating at the infinite
/// sentinel.
pub const fn ms_to_us(ms: u64) -> u64 {
    ms.saturating_mul(1000)
}

/// Convert microseconds to milliseconds
pub const fn us_to_ms(us: u64) -> u64 {
    us / 1000
}

/// ============================================================================
/// One-shot queue
/// ============================================================================

/// What to do when a deadline expires.
pub(crate) enum TimerAction {
    /// Wake `tid` with `reason` if it is still parked under `gen`.
    Wake {
        tid: ThreadId,
        gen: u64,
        reason: Status,
    },
}

struct TimerEntry {
    deadline_us: u64,
    seq: u64,
    action: TimerAction,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_us == other.deadline_us && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest
        // deadline on top.
        match other.deadline_us.cmp(&self.deadline_us) {
            CmpOrdering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

static TIMER_QUEUE: Lazy<Mutex<BinaryHeap<TimerEntry>>> =
    Lazy::new(|| Mutex::new(BinaryHeap::new()));

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Arm a one-shot entry.
///
/// Safe to call with the scheduler lock held; the timer queue lock is
/// ordered strictly after it.
pub(crate) fn arm(deadline_us: u64, action: TimerAction) {
    let entry = TimerEntry {
        deadline_us,
        seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
        action,
    };

    let earliest = {
        let mut queue = TIMER_QUEUE.lock();
        queue.push(entry);
        queue.peek().map(|e| e.deadline_us)
    };

    if let Some(deadline) = earliest {
        platform::get().schedule_oneshot(deadline);
    }
}

/// Fire every entry whose deadline has passed.
///
/// Invoked by the platform timer interrupt with the current monotonic
/// time, and by the hosted poll. Must not be called with the scheduler
/// lock held.
pub fn tick(now_us: u64) {
    loop {
        let entry = {
            let mut queue = TIMER_QUEUE.lock();
            let due = queue.peek().map_or(false, |head| head.deadline_us <= now_us);
            if due {
                queue.pop()
            } else {
                None
            }
        };

        let Some(entry) = entry else { break };
        match entry.action {
            TimerAction::Wake { tid, gen, reason } => crate::sched::timer_wake(tid, gen, reason),
        }
    }

    let earliest = TIMER_QUEUE.lock().peek().map(|e| e.deadline_us);
    if let Some(deadline) = earliest {
        platform::get().schedule_oneshot(deadline);
    }
}

/// Hosted reschedule-point poll: fire due entries off the platform
/// clock. Bare-metal builds get their ticks from the timer interrupt
/// instead, so this is a no-op there.
pub(crate) fn poll() {
    #[cfg(any(test, feature = "hosted"))]
    {
        let due = {
            let queue = TIMER_QUEUE.lock();
            queue.peek().map(|e| e.deadline_us)
        };
        if let Some(deadline) = due {
            let now = platform::now_us();
            if deadline <= now {
                tick(now);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
