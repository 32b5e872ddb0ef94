//! Futex-backed locking primitives.
//!
//! The buffer needs a mutex, a condition variable with an optional timeout,
//! and a raw timed futex wait for cancellable sleeps. They all sit on the
//! `atomic-wait` wait/wake calls.

pub mod condvar;
pub mod futex;
pub mod mutex;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard};
