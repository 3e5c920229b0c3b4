// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Common types used throughout the kernel core
//!
//! Errors are small negative integers carried in a signed `Status`;
//! nonnegative values mean success and, for I/O paths, a byte count.

/// Error code type (negative values indicate errors)
pub type Status = i32;

/// Result type for kernel operations
pub type Result<T = ()> = core::result::Result<T, Status>;

/// Thread ID type
pub type Tid = u64;

/// Time value in microseconds
pub type Microseconds = u64;

/// Time value in milliseconds
pub type Milliseconds = u64;

/// Sentinel for "wait forever" timeouts (in milliseconds)
pub const INFINITE_TIME: u64 = u64::MAX;

/// Common status codes
pub mod status {
    use super::Status;

    pub const OK: Status = 0;
    pub const ERR: Status = -1;
    pub const ERR_INVALID_ARGS: Status = -2;
    pub const ERR_BAD_HANDLE: Status = -3;
    pub const ERR_BAD_STATE: Status = -4;
    pub const ERR_NOT_SUPPORTED: Status = -5;
    pub const ERR_NO_MEMORY: Status = -6;
    pub const ERR_TIMED_OUT: Status = -7;
    pub const ERR_NOT_FOUND: Status = -8;
    pub const ERR_ALREADY_EXISTS: Status = -9;
    pub const ERR_OUT_OF_RANGE: Status = -10;
    pub const ERR_IO: Status = -11;
    pub const ERR_OBJECT_DESTROYED: Status = -12;
}

/// Human-readable name for a status code (for diagnostics)
pub fn status_name(s: Status) -> &'static str {
    match s {
        status::OK => "OK",
        status::ERR => "ERR",
        status::ERR_INVALID_ARGS => "ERR_INVALID_ARGS",
        status::ERR_BAD_HANDLE => "ERR_BAD_HANDLE",
        status::ERR_BAD_STATE => "ERR_BAD_STATE",
        status::ERR_NOT_SUPPORTED => "ERR_NOT_SUPPORTED",
        status::ERR_NO_MEMORY => "ERR_NO_MEMORY",
        status::ERR_TIMED_OUT => "ERR_TIMED_OUT",
        status::ERR_NOT_FOUND => "ERR_NOT_FOUND",
        status::ERR_ALREADY_EXISTS => "ERR_ALREADY_EXISTS",
        status::ERR_OUT_OF_RANGE => "ERR_OUT_OF_RANGE",
        status::ERR_IO => "ERR_IO",
        status::ERR_OBJECT_DESTROYED => "ERR_OBJECT_DESTROYED",
        s if s >= 0 => "OK",
        _ => "ERR_UNKNOWN",
    }
}

// ============================================================================
// Tests
// ============================================================================
