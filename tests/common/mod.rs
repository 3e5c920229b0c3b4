// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Shared harness for the hosted kernel test suites.
//!
//! The kernel is a process-wide singleton with one bootstrap thread, so
//! tests that enter it must not overlap: each takes the boot lock for
//! its whole body and leaves the system drained (every thread it spawned
//! joined or reaped) on the way out.

use std::sync::{Mutex, MutexGuard};

static BOOT_LOCK: Mutex<()> = Mutex::new(());

/// Boot the kernel (idempotent) and serialize the calling test.
pub fn setup() -> MutexGuard<'static, ()> {
    let guard = BOOT_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    minikern::init();
    guard
}
