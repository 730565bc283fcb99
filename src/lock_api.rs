//! Locking interfaces compatible with [lock_api].
//!
//! This module exports [`lock_api::Mutex`] and [`lock_api::MutexGuard`] aliases
//! whose raw lock is the fair queue of this crate. Threads that block on these
//! mutexes wait in the same FIFO order as suspended tasks would, and release
//! hands the lock directly to the oldest waiter.
//!
//! [`RawFairMutex`] implements both [`RawMutex`] and [`RawMutexFair`].
//!
//! [lock_api]: https://crates.io/crates/lock_api
//! [`lock_api::Mutex`]: https://docs.rs/lock_api/latest/lock_api/struct.Mutex.html
//! [`lock_api::MutexGuard`]: https://docs.rs/lock_api/latest/lock_api/struct.MutexGuard.html
//! [`RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html
//! [`RawMutexFair`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutexFair.html

use core::fmt;
use core::marker::PhantomData;

use crate::raw::{LockState, RawMutex};
use crate::relax::Relax;

/// A [`RawMutex`] that blocks threads with the relax strategy `R`.
pub struct RawFairMutex<R> {
    inner: RawMutex,
    relax: PhantomData<fn() -> R>,
}

// SAFETY: Acquisitions go through the queue of `RawMutex`, which grants the
// lock to at most one party at a time.
unsafe impl<R: Relax> lock_api::RawMutex for RawFairMutex<R> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self { inner: RawMutex::new(), relax: PhantomData };

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
        self.inner.lock_blocking::<R>();
    }

    fn try_lock(&self) -> bool {
        self.inner.try_lock()
    }

    unsafe fn unlock(&self) {
        // SAFETY: Caller guarantees that it holds the lock.
        unsafe { self.inner.unlock_unchecked() }
    }

    fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

// SAFETY: Every unlock is already a fair hand-off.
unsafe impl<R: Relax> lock_api::RawMutexFair for RawFairMutex<R> {
    unsafe fn unlock_fair(&self) {
        // SAFETY: Caller guarantees that it holds the lock.
        unsafe { self.inner.unlock_unchecked() }
    }
}

impl<R> RawFairMutex<R> {
    /// A snapshot of the lock state, see [`RawMutex::state`].
    pub fn state(&self) -> LockState {
        self.inner.state()
    }
}

impl<R> fmt::Debug for RawFairMutex<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawFairMutex").field(&self.inner).finish()
    }
}

/// A lock that provides mutually exclusive data access that is compatible with
/// [`lock_api`](https://crates.io/crates/lock_api).
pub type Mutex<T, R> = lock_api::Mutex<RawFairMutex<R>, T>;

/// A guard that provides mutable data access that is compatible with
/// [`lock_api`](https://crates.io/crates/lock_api).
pub type MutexGuard<'a, T, R> = lock_api::MutexGuard<'a, RawFairMutex<R>, T>;

/// Aliases that signal the processor that the thread is running a busy-wait
/// spin-loop while the hand-off is pending.
pub mod spins {
    use crate::relax::Spin;

    /// A fair lock that implements the [`Spin`] relax strategy and is
    /// compatible with the `lock_api` crate.
    ///
    /// # Example
    ///
    /// ```
    /// use fairmutex::lock_api::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// *mutex.lock() += 1;
    /// assert_eq!(mutex.into_inner(), 1);
    /// ```
    pub type Mutex<T> = super::Mutex<T, Spin>;

    /// A fair guard that implements the [`Spin`] relax strategy.
    pub type MutexGuard<'a, T> = super::MutexGuard<'a, T, Spin>;
}

/// Aliases that yield the current time slice to the OS scheduler while the
/// hand-off is pending.
#[cfg(any(feature = "yield", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "yield")))]
pub mod yields {
    use crate::relax::Yield;

    /// A fair lock that implements the [`Yield`] relax strategy and is
    /// compatible with the `lock_api` crate.
    ///
    /// # Example
    ///
    /// ```
    /// use fairmutex::lock_api::yields::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// *mutex.lock() += 1;
    /// assert_eq!(mutex.into_inner(), 1);
    /// ```
    pub type Mutex<T> = super::Mutex<T, Yield>;

    /// A fair guard that implements the [`Yield`] relax strategy.
    pub type MutexGuard<'a, T> = super::MutexGuard<'a, T, Yield>;
}

/// Aliases that rapidly spin without telling the CPU to do any power down
/// while the hand-off is pending.
pub mod loops {
    use crate::relax::Loop;

    /// A fair lock that implements the [`Loop`] relax strategy and is
    /// compatible with the `lock_api` crate.
    pub type Mutex<T> = super::Mutex<T, Loop>;

    /// A fair guard that implements the [`Loop`] relax strategy.
    pub type MutexGuard<'a, T> = super::MutexGuard<'a, T, Loop>;
}

/// Aliases that spin with exponential backoff while the hand-off is pending.
pub mod spins_backoff {
    use crate::relax::SpinBackoff;

    /// A fair lock that implements the [`SpinBackoff`] relax strategy and is
    /// compatible with the `lock_api` crate.
    pub type Mutex<T> = super::Mutex<T, SpinBackoff>;

    /// A fair guard that implements the [`SpinBackoff`] relax strategy.
    pub type MutexGuard<'a, T> = super::MutexGuard<'a, T, SpinBackoff>;
}

/// Aliases that spin with exponential backoff up to a threshold, then yield
/// back to the OS scheduler while the hand-off is pending.
#[cfg(feature = "yield")]
#[cfg_attr(docsrs, doc(cfg(feature = "yield")))]
pub mod yields_backoff {
    use crate::relax::YieldBackoff;

    /// A fair lock that implements the [`YieldBackoff`] relax strategy and is
    /// compatible with the `lock_api` crate.
    pub type Mutex<T> = super::Mutex<T, YieldBackoff>;

    /// A fair guard that implements the [`YieldBackoff`] relax strategy.
    pub type MutexGuard<'a, T> = super::MutexGuard<'a, T, YieldBackoff>;
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    use lock_api::{RawMutex as _, RawMutexFair as _};

    use super::yields::{Mutex, MutexGuard};
    use super::RawFairMutex;
    use crate::raw::LockState;
    use crate::relax::Yield;
    use crate::test::tests;
    use crate::test::{LockData, LockNew, LockQueued, LockThen, TryLockThen};

    impl<T> LockNew for Mutex<T> {
        type Target = T;

        fn new(value: Self::Target) -> Self
        where
            Self::Target: Sized,
        {
            Self::new(value)
        }
    }

    impl<T> LockThen for Mutex<T> {
        fn lock_then<F, Ret>(&self, f: F) -> Ret
        where
            F: FnOnce(&mut Self::Target) -> Ret,
        {
            f(&mut self.lock())
        }
    }

    impl<T> TryLockThen for Mutex<T> {
        fn try_lock_then<F, Ret>(&self, f: F) -> Ret
        where
            F: FnOnce(Option<&mut Self::Target>) -> Ret,
        {
            f(self.try_lock().as_deref_mut())
        }

        fn is_locked(&self) -> bool {
            Self::is_locked(self)
        }
    }

    impl<T> LockData for Mutex<T> {
        fn into_inner(self) -> Self::Target
        where
            Self::Target: Sized,
        {
            Self::into_inner(self)
        }

        fn get_mut(&mut self) -> &mut Self::Target {
            Self::get_mut(self)
        }
    }

    impl<T> LockQueued for Mutex<T> {
        fn queued(&self) -> usize {
            // SAFETY: The raw lock is only inspected, never unlocked.
            unsafe { self.raw() }.inner.queued()
        }
    }

    #[test]
    fn counts_every_locked_increment() {
        tests::counts_every_locked_increment::<Mutex<_>>();
    }

    #[test]
    fn mixed_increments() {
        tests::mixed_increments::<Mutex<_>>();
    }

    #[test]
    fn sections_never_overlap() {
        tests::sections_never_overlap::<Mutex<_>>();
    }

    #[test]
    fn blocked_threads_acquire_in_arrival_order() {
        tests::blocked_threads_acquire_in_arrival_order::<Mutex<_>>();
    }

    #[test]
    fn release_hands_off_without_barging() {
        tests::release_hands_off_without_barging::<Mutex<_>>();
    }

    #[test]
    fn panic_releases_lock() {
        tests::panic_releases_lock::<Mutex<_>>();
    }

    #[test]
    fn debug_hides_locked_data() {
        tests::debug_hides_locked_data::<Mutex<_>>();
    }

    #[test]
    fn try_lock_fails_while_held() {
        tests::try_lock_fails_while_held::<Mutex<_>>();
    }

    #[test]
    fn get_mut_skips_locking() {
        tests::get_mut_skips_locking::<Mutex<_>>();
    }

    #[test]
    fn unlock_fair_serves_blocked_threads_in_order() {
        const THREADS: usize = 4;
        let mutex = Arc::new(Mutex::new(Vec::new()));
        let guard = mutex.lock();
        let handles: Vec<_> = (0..THREADS)
            .map(|index| {
                let c_mutex = Arc::clone(&mutex);
                let handle = thread::spawn(move || {
                    let mut guard = c_mutex.lock();
                    guard.push(index);
                    MutexGuard::unlock_fair(guard);
                });
                while mutex.queued() <= index {
                    thread::yield_now();
                }
                handle
            })
            .collect();
        MutexGuard::unlock_fair(guard);
        for handle in handles {
            handle.join().unwrap();
        }
        // SAFETY: The raw lock is only inspected, never unlocked.
        assert_eq!(unsafe { mutex.raw() }.state(), LockState::Free);
        assert_eq!(*mutex.lock(), [0, 1, 2, 3]);
    }

    #[test]
    fn raw_unlock_fair_releases() {
        let raw = RawFairMutex::<Yield>::INIT;
        raw.lock();
        assert_eq!(raw.state(), LockState::Held);
        assert!(!raw.try_lock());
        unsafe { raw.unlock_fair() };
        assert!(!raw.is_locked());
    }
}
