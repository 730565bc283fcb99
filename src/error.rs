//! Errors reported by the mutex.
//!
//! Contention is never an error: a contended acquisition simply waits.

use thiserror::Error;

/// Returned by [`RawMutex::unlock`] when the mutex is not locked.
///
/// Ownership is implicit in this mutex, so releasing from a task that does not
/// hold the lock can only be detected when nobody holds it at all. Either way
/// it is a bug in the caller.
///
/// [`RawMutex::unlock`]: crate::raw::RawMutex::unlock
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("unlock called on a mutex that is not locked")]
pub struct IllegalUse;

/// Returned when an acquisition was cancelled before the lock was handed over.
///
/// Receiving this value guarantees that the caller does not own the lock.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("lock acquisition cancelled")]
pub struct Cancelled;

#[cfg(all(not(loom), test))]
mod test {
    use std::string::ToString;

    use super::{Cancelled, IllegalUse};

    #[test]
    fn display_messages() {
        assert_eq!(IllegalUse.to_string(), "unlock called on a mutex that is not locked");
        assert_eq!(Cancelled.to_string(), "lock acquisition cancelled");
    }

    #[test]
    fn implements_core_error() {
        fn assert_error<E: core::error::Error>(_: &E) {}
        assert_error(&IllegalUse);
        assert_error(&Cancelled);
    }
}
