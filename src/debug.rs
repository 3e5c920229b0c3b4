// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Logging
//!
//! Wires the `log` crate facade to the platform print hook. Each record
//! is formatted into a single line with a level tag and the originating
//! module, then handed to [`crate::platform::Platform::print`].
//!
//! The sink is installed once by `init`; records emitted before that are
//! discarded by the facade. Logging is never used on performance paths.

use log::{LevelFilter, Log, Metadata, Record};

struct KernelLog;

impl Log for KernelLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = alloc::format!(
            "[{:5}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
        crate::platform::get().print(&line);
    }

    fn flush(&self) {}
}

static LOGGER: KernelLog = KernelLog;

/// Default maximum level when the boot arguments don't say otherwise.
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Install the logging sink. Idempotent; a pre-installed logger (a test
/// harness, say) is left in place.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(DEFAULT_LEVEL);
    }
}

/// Apply a level name from the boot arguments. Returns false for an
/// unrecognized name (the level is left unchanged).
pub fn set_level(name: &str) -> bool {
    let level = match name {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return false,
    };
    log::set_max_level(level);
    true
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_level_names() {
        assert!(set_level("debug"));
        assert!(set_level("off"));
        assert!(!set_level("loud"));
        // Restore something sane for the rest of the suite.
        assert!(set_level("info"));
    }
}
