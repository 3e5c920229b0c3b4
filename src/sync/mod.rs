// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Synchronization Primitives
//!
//! Scheduler-aware blocking primitives, all built on [`WaitQueue`]:
//!
//! - **Mutex**: recursive mutual exclusion with ownership hand-off
//! - **Semaphore**: signed counting semaphore
//! - **Event**: manual-reset or auto-unsignal wait object
//!
//! Every primitive carries a magic word; using one after `destroy`
//! panics, and destroying one out from under sleepers wakes them with
//! `ERR_OBJECT_DESTROYED`.

pub mod event;
pub mod mutex;
pub mod sem;
pub mod wait_queue;

// Re-exports
pub use event::{Event, EventFlags};
pub use mutex::Mutex;
pub use sem::Semaphore;
pub use wait_queue::WaitQueue;
