// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Minikern - Portable Kernel Core
//!
//! A small operating-system kernel core for microcontrollers and small
//! SoCs: a preemptive priority scheduler with real context switching,
//! scheduler-aware synchronization primitives (mutex, semaphore, event),
//! and a block I/O layer with synchronous, asynchronous, and sub-device
//! access.
//!
//! Everything hardware-shaped goes through the [`platform`] trait. With
//! the `hosted` feature (the default) an std-backed platform is
//! installed automatically and the whole kernel runs inside an ordinary
//! host process, real stacks and real context switches included; this
//! is how the test suites exercise it. Bare-metal embedders build with
//! `default-features = false`, install their own platform, and drive
//! [`timer::tick`] and [`sched::preempt_tick`] from their timer
//! interrupt.
//!
//! # Boot
//!
//! ```ignore
//! minikern::init();
//! let t = minikern::thread::create("worker", thread::DEFAULT_PRIORITY,
//!                                  thread::DEFAULT_STACK_SIZE, || 0)?;
//! minikern::thread::resume(t)?;
//! ```

#![no_std]

#[cfg(any(test, feature = "hosted"))]
extern crate std;

extern crate alloc;

pub mod arch;
pub mod bio;
pub mod cmdline;
pub mod debug;
pub mod platform;
pub mod sched;
pub mod sync;
pub mod thread;
pub mod timer;
pub mod types;

pub use types::{status, Result, Status, INFINITE_TIME};

use spin::Once;

static INIT: Once<()> = Once::new();

/// Bring the core up with default configuration.
///
/// Idempotent. The calling context becomes the bootstrap thread.
pub fn init() {
    init_with_cmdline("");
}

/// Bring the core up, applying boot arguments.
///
/// Recognized keys: `kernel.loglevel` (off/error/warn/info/debug/trace)
/// and `kernel.quantum_ticks`. Unknown keys are ignored.
pub fn init_with_cmdline(args: &str) {
    INIT.call_once(|| {
        #[cfg(feature = "hosted")]
        platform::hosted::install();

        debug::init();

        let cl = cmdline::CmdLine::parse(args);
        if let Some(level) = cl.get("kernel.loglevel") {
            if !debug::set_level(level) {
                log::warn!("unknown kernel.loglevel '{}'", level);
            }
        }
        if let Some(ticks) = cl.get_u32("kernel.quantum_ticks") {
            sched::set_default_quantum(ticks);
        }

        sched::init();
        bio::init();

        log::info!("minikern core initialized");
    });
}
