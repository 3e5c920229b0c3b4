// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture Support
//!
//! CPU-level primitives the rest of the core builds on: the interrupt
//! mask pair used by the scheduler lock, the context-switch entry, and
//! initial stack frame construction for new threads.
//!
//! # Design
//!
//! - **Interrupt pairing**: every scheduler lock acquisition masks local
//!   interrupts and restores them on release, RAII-style
//! - **Context switch**: callee-saved registers only; the frame lives on
//!   the outgoing thread's stack and the saved stack pointer is the only
//!   per-thread machine state
//! - **Hosted builds**: the mask degenerates to a depth counter (no
//!   asynchronous entries exist in a host process), the switch is the
//!   same real frame used on bare metal

#[cfg(target_arch = "x86_64")]
#[path = "x86_64.rs"]
mod imp;

#[cfg(target_arch = "aarch64")]
#[path = "aarch64.rs"]
mod imp;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("unsupported target architecture");

pub use imp::init_stack_frame;

/// Switch from the current thread to another.
///
/// Saves the callee-saved register frame on the current stack, stores
/// the resulting stack pointer through `old_sp`, and resumes execution
/// from the frame `new_sp` points at.
///
/// # Safety
///
/// `old_sp` must point at the saved-sp slot of the outgoing thread's
/// record and `new_sp` must be a stack pointer previously produced by
/// this function or by `init_stack_frame`. Must be called with the
/// scheduler lock held and interrupts masked.
pub unsafe fn context_switch(old_sp: *mut usize, new_sp: usize) {
    imp::context_switch(old_sp, new_sp);
}

/// Saved interrupt state; restores the previous mask level on drop.
pub struct IntState {
    token: usize,
}

/// Mask local interrupts, returning the state to restore.
pub fn ints_disable() -> IntState {
    IntState { token: mask::disable() }
}

impl Drop for IntState {
    fn drop(&mut self) {
        mask::restore(self.token);
    }
}

/// Unconditionally enable interrupts.
///
/// Used by the thread entry trampoline, which starts life holding the
/// scheduler lock with no saved state to restore.
///
/// # Safety
///
/// Discards any outstanding mask nesting; only valid at points where the
/// caller owns the whole interrupt state (thread entry).
pub unsafe fn ints_force_enable() {
    mask::force_enable();
}

/// Pause hint for spin loops
#[inline]
pub fn cpu_relax() {
    core::hint::spin_loop();
}

// ============================================================================
// Interrupt mask backends
// ============================================================================

// Hosted: no asynchronous interrupts exist, keep a depth counter so the
// nesting discipline is still checkable.
#[cfg(any(test, feature = "hosted"))]
mod mask {
    use core::sync::atomic::{AtomicUsize, Ordering};

    static DEPTH: AtomicUsize = AtomicUsize::new(0);

    pub fn disable() -> usize {
        DEPTH.fetch_add(1, Ordering::SeqCst)
    }

    pub fn restore(token: usize) {
        DEPTH.store(token, Ordering::SeqCst);
    }

    pub fn force_enable() {
        DEPTH.store(0, Ordering::SeqCst);
    }
}

#[cfg(not(any(test, feature = "hosted")))]
mod mask {
    pub fn disable() -> usize {
        super::imp::ints_save_disable()
    }

    pub fn restore(token: usize) {
        super::imp::ints_restore(token);
    }

    pub fn force_enable() {
        super::imp::ints_restore(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_state_nests() {
        let outer = ints_disable();
        let inner = ints_disable();
        drop(inner);
        drop(outer);
    }

    #[test]
    fn test_stack_frame_entry_slot() {
        extern "C" fn dummy_entry() -> ! {
            unreachable!();
        }

        let mut stack = alloc::vec![0u8; 4096].into_boxed_slice();
        let sp = init_stack_frame(&mut stack, dummy_entry);

        let base = stack.as_ptr() as usize;
        assert!(sp > base && sp < base + stack.len());
        // The frame must be pointer-aligned.
        assert_eq!(sp % core::mem::size_of::<usize>(), 0);
    }
}
