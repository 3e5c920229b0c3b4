// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Event
//!
//! Signalable wait object.
//!
//! # Design
//!
//! - **Manual reset** (default): `signal` wakes every waiter and the
//!   event stays signaled until `unsignal`
//! - **Auto unsignal**: `signal` wakes exactly one waiter and the event
//!   returns to unsignaled; with no waiters the signal latches so the
//!   next `wait` consumes it
//! - **Fair**: waiters wake in priority order, FIFO within a priority
//!
//! # Usage
//!
//! ```ignore
//! let event = Event::new(false, EventFlags::empty());
//! event.wait();
//! event.signal(true);
//! event.unsignal();
//! ```

use crate::sched;
use crate::sync::WaitQueue;
use crate::types::{status, Status};
use bitflags::bitflags;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Magic number for event validation
const EVENT_MAGIC: u32 = 0x4556_4E54; // "EVNT"

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        /// Wake one waiter per signal and return to unsignaled
        const AUTO_UNSIGNAL = 0x01;
    }
}

pub struct Event {
    signaled: AtomicBool,
    flags: EventFlags,
    wait: WaitQueue,
    magic: AtomicU32,
}

impl Event {
    /// Create an event.
    ///
    /// # Arguments
    ///
    /// * `initial` - Whether the event starts signaled
    /// * `flags` - [`EventFlags::AUTO_UNSIGNAL`] or empty
    pub const fn new(initial: bool, flags: EventFlags) -> Self {
        Self {
            signaled: AtomicBool::new(initial),
            flags,
            wait: WaitQueue::new(),
            magic: AtomicU32::new(EVENT_MAGIC),
        }
    }

    fn validate(&self) {
        assert_eq!(
            self.magic.load(Ordering::Relaxed),
            EVENT_MAGIC,
            "operation on a destroyed event"
        );
    }

    /// Wait until the event is signaled.
    ///
    /// Already-signaled events return immediately; auto-unsignal events
    /// consume the signal on the way out.
    ///
    /// # Returns
    ///
    /// `OK`, or `ERR_OBJECT_DESTROYED` if the event was destroyed while
    /// we waited.
    pub fn wait(&self) -> Status {
        self.validate();

        let l = sched::lock();
        if self.signaled.load(Ordering::Acquire) {
            if self.flags.contains(EventFlags::AUTO_UNSIGNAL) {
                self.signaled.store(false, Ordering::Release);
            }
            return status::OK;
        }
        self.wait.block_locked(l, None)
    }

    /// Signal the event.
    ///
    /// With `reschedule` set and a woken thread outranking the caller,
    /// the switch happens before this returns. Safe from interrupt
    /// context.
    ///
    /// # Returns
    ///
    /// Number of threads woken.
    pub fn signal(&self, reschedule: bool) -> usize {
        self.validate();

        let mut l = sched::lock();
        let woken = if self.flags.contains(EventFlags::AUTO_UNSIGNAL) {
            match self.wait.wake_one_locked(&mut l, status::OK) {
                Some(_) => 1,
                None => {
                    // Nobody to hand it to; latch for the next waiter.
                    self.signaled.store(true, Ordering::Release);
                    0
                }
            }
        } else {
            if self.signaled.load(Ordering::Acquire) {
                // Signaled events have no waiters by invariant.
                return 0;
            }
            self.signaled.store(true, Ordering::Release);
            self.wait.wake_all_locked(&mut l, status::OK)
        };

        if reschedule && woken > 0 {
            sched::preempt_if_pending(l);
        }
        woken
    }

    /// Clear the signaled state without touching waiters.
    pub fn unsignal(&self) {
        self.validate();
        self.signaled.store(false, Ordering::Release);
    }

    pub fn is_signaled(&self) -> bool {
        self.validate();
        self.signaled.load(Ordering::Acquire)
    }

    /// Tear the event down, waking every waiter with
    /// `ERR_OBJECT_DESTROYED`. Any further use panics.
    pub fn destroy(&self) {
        self.validate();
        let mut l = sched::lock();
        self.magic.store(0, Ordering::Relaxed);
        self.signaled.store(false, Ordering::Release);
        self.wait.wake_all_locked(&mut l, status::ERR_OBJECT_DESTROYED);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let e = Event::new(false, EventFlags::empty());
        assert!(!e.is_signaled());

        let s = Event::new(true, EventFlags::empty());
        assert!(s.is_signaled());
    }

    #[test]
    fn test_unsignal() {
        let e = Event::new(true, EventFlags::empty());
        e.unsignal();
        assert!(!e.is_signaled());
    }

    #[test]
    fn test_flag_bits() {
        assert_eq!(EventFlags::AUTO_UNSIGNAL.bits(), 0x01);
        assert!(EventFlags::empty().is_empty());
    }
}
