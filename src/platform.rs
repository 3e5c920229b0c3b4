// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Platform Interface
//!
//! The core owns no hardware. Everything it needs from the outside world
//! goes through this trait: a monotonic clock, a one-shot timer request,
//! an idle relaxation hint, and the console print hook used by logging.
//!
//! Bare-metal embedders implement [`Platform`] and call [`set_platform`]
//! before `init`. With the `hosted` feature (the default) an std-backed
//! platform is installed automatically so the kernel runs inside an
//! ordinary host process.

use spin::Once;

/// Services the embedding platform provides to the core.
pub trait Platform: Sync {
    /// Monotonic time since boot in microseconds.
    fn now_us(&self) -> u64;

    /// Request a timer interrupt at `deadline_us`.
    ///
    /// A new deadline supersedes any previously requested one. When it
    /// expires the platform must invoke [`crate::timer::tick`]. Platforms
    /// without asynchronous delivery (the hosted one) may ignore this;
    /// the core polls due timers at reschedule points.
    fn schedule_oneshot(&self, deadline_us: u64);

    /// Relaxation hint invoked by the idle thread between polls.
    fn idle(&self);

    /// Console print hook. Never called on performance paths.
    fn print(&self, s: &str);
}

static PLATFORM: Once<&'static dyn Platform> = Once::new();

/// Install the platform. The first installation wins; later calls are
/// ignored so the hosted default does not displace an embedder's choice.
pub fn set_platform(platform: &'static dyn Platform) {
    PLATFORM.call_once(|| platform);
}

pub(crate) fn get() -> &'static dyn Platform {
    *PLATFORM
        .get()
        .expect("platform not installed; call platform::set_platform before init")
}

/// Monotonic time since boot in microseconds.
pub fn now_us() -> u64 {
    get().now_us()
}

// ============================================================================
// Hosted platform
// ============================================================================

#[cfg(any(test, feature = "hosted"))]
pub mod hosted {
    //! std-backed platform for running the kernel inside a host process.

    use core::sync::atomic::{AtomicU64, Ordering};
    use spin::Once;
    use std::time::{Duration, Instant};

    /// How long the idle thread naps between timer polls. Bounds the
    /// extra latency a hosted one-shot timer can see.
    const IDLE_NAP: Duration = Duration::from_micros(50);

    pub struct HostPlatform {
        epoch: Instant,
        next_deadline: AtomicU64,
    }

    impl HostPlatform {
        fn new() -> Self {
            Self {
                epoch: Instant::now(),
                next_deadline: AtomicU64::new(u64::MAX),
            }
        }

        /// The most recently requested one-shot deadline.
        pub fn pending_deadline_us(&self) -> u64 {
            self.next_deadline.load(Ordering::Relaxed)
        }
    }

    impl super::Platform for HostPlatform {
        fn now_us(&self) -> u64 {
            self.epoch.elapsed().as_micros() as u64
        }

        fn schedule_oneshot(&self, deadline_us: u64) {
            // No asynchronous delivery on a host; remembered only for
            // inspection. Reschedule points poll the timer queue.
            self.next_deadline.store(deadline_us, Ordering::Relaxed);
        }

        fn idle(&self) {
            std::thread::sleep(IDLE_NAP);
        }

        fn print(&self, s: &str) {
            use std::io::Write;
            let _ = std::io::stderr().write_all(s.as_bytes());
        }
    }

    static HOST: Once<HostPlatform> = Once::new();

    /// Install the hosted platform (idempotent).
    pub fn install() {
        let host = HOST.call_once(HostPlatform::new);
        super::set_platform(host);
    }
}
