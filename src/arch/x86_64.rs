// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! x86_64 context switch and interrupt mask
//!
//! The switch frame holds the System V callee-saved integer registers
//! (rbp, rbx, r12-r15) plus the return address; everything else is
//! caller-saved and already on the stack at any switch point.

// Frame layout, low address first:
//   [sp + 0]  r15
//   [sp + 8]  r14
//   [sp + 16] r13
//   [sp + 24] r12
//   [sp + 32] rbx
//   [sp + 40] rbp
//   [sp + 48] return address
core::arch::global_asm!(
    r#"
    .text
    .balign 16
    .globl minikern_context_switch
    .globl _minikern_context_switch
minikern_context_switch:
_minikern_context_switch:
    push rbp
    push rbx
    push r12
    push r13
    push r14
    push r15
    mov [rdi], rsp
    mov rsp, rsi
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    pop rbp
    ret
"#
);

extern "C" {
    fn minikern_context_switch(old_sp: *mut usize, new_sp: usize);
}

pub(super) unsafe fn context_switch(old_sp: *mut usize, new_sp: usize) {
    minikern_context_switch(old_sp, new_sp);
}

const FRAME_WORDS: usize = 7;

/// Build the initial switch frame for a new thread.
///
/// Returns the stack pointer to store in the thread record; the first
/// switch to it pops six zeroed registers and returns into `entry`. The
/// top is placed so `entry` observes the same stack parity as a normal
/// call site (rsp ≡ 8 mod 16 on entry).
pub fn init_stack_frame(stack: &mut [u8], entry: extern "C" fn() -> !) -> usize {
    let base = stack.as_mut_ptr() as usize;
    let top = ((base + stack.len()) & !15) - 8;
    let sp = top - FRAME_WORDS * core::mem::size_of::<usize>();

    unsafe {
        let frame = sp as *mut usize;
        for i in 0..FRAME_WORDS - 1 {
            frame.add(i).write(0);
        }
        frame.add(FRAME_WORDS - 1).write(entry as usize);
    }

    sp
}

#[cfg(not(any(test, feature = "hosted")))]
pub(super) fn ints_save_disable() -> usize {
    let was_enabled = x86_64::instructions::interrupts::are_enabled();
    x86_64::instructions::interrupts::disable();
    was_enabled as usize
}

#[cfg(not(any(test, feature = "hosted")))]
pub(super) fn ints_restore(token: usize) {
    if token != 0 {
        x86_64::instructions::interrupts::enable();
    }
}
