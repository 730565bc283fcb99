//! The data-less mutex core.
//!
//! [`RawMutex`] holds the lock word and the waiter queue and nothing else. It
//! is fair: contended acquisitions are served strictly in the order they
//! joined the queue, and a release hands the lock directly to the next live
//! waiter instead of letting everyone race for it again. Waiters that are
//! cancelled, or whose futures are dropped, leave the queue without ever
//! receiving the lock.
//!
//! Asynchronous callers use [`RawMutex::lock`], whose [`Acquire`] future
//! carries its own waiter record. Synchronous callers use
//! [`RawMutex::lock_blocking`] with one of the strategies of the [`relax`]
//! module.
//!
//! [`relax`]: crate::relax

mod mutex;
pub use mutex::{Acquire, CancelOutcome, RawMutex};

#[cfg(test)]
pub(crate) use mutex::noop_waker;

pub use crate::state::LockState;
