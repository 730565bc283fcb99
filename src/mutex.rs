//! A data-owning mutex on top of [`RawMutex`].
//!
//! [`Mutex`] pairs the fair raw lock with the data it protects and hands out
//! RAII [`MutexGuard`]s. Acquisitions can be awaited, scoped to a closure or
//! an async action, raced against a cancellation signal, or performed from a
//! thread that has no executor.
//!
//! [`RawMutex`]: crate::raw::RawMutex

use core::fmt;
use core::future::{poll_fn, Future};
use core::marker::PhantomData;
use core::pin::{pin, Pin};
use core::task::{Context, Poll};

#[cfg(not(all(loom, test)))]
use core::ops::{Deref, DerefMut};

use crate::cfg::cell::{UnsafeCell, UnsafeCellWith};
use crate::error::Cancelled;
use crate::raw::{Acquire, CancelOutcome, LockState, RawMutex};
use crate::relax::Relax;

/// A fair, suspending mutual exclusion primitive useful for protecting shared
/// data across tasks.
///
/// Tasks that find the mutex locked are suspended and queued; the lock is then
/// handed to them one at a time, strictly in arrival order. A task waiting for
/// the lock can withdraw at any point, by dropping the [`lock`] future, by
/// calling [`Lock::cancel`] or by racing it against a cancellation signal with
/// [`lock_or_cancel`], and will never receive the lock afterwards.
///
/// The data can only be accessed through the RAII guards returned from
/// [`lock`], [`try_lock`] and [`lock_blocking`], or within the scope of
/// [`lock_then`], [`try_lock_then`] and [`with_lock`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use fairmutex::Mutex;
/// use futures_lite::future::block_on;
///
/// const N: usize = 10;
///
/// let data = Arc::new(Mutex::new(0));
/// let handles: Vec<_> = (0..N)
///     .map(|_| {
///         let data = Arc::clone(&data);
///         thread::spawn(move || block_on(async {
///             *data.lock().await += 1;
///         }))
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(block_on(data.lock_then(|data| *data)), N);
/// ```
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
/// [`lock_blocking`]: Mutex::lock_blocking
/// [`lock_then`]: Mutex::lock_then
/// [`try_lock_then`]: Mutex::try_lock_then
/// [`with_lock`]: Mutex::with_lock
/// [`lock_or_cancel`]: Mutex::lock_or_cancel
pub struct Mutex<T: ?Sized> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

// SAFETY: A `Mutex` is safe to be sent across thread boundaries and accessed
// concurrently, as long as the inner type `T` is safe to be sent across thread
// boundaries, since the lock serializes every access to the data.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new mutex in an unlocked state ready for use.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::Mutex;
    ///
    /// static MUTEX: Mutex<i32> = Mutex::new(0);
    /// let mutex = Mutex::new(0);
    /// ```
    #[cfg(not(all(loom, test)))]
    #[inline]
    pub const fn new(value: T) -> Self {
        Self { raw: RawMutex::new(), data: UnsafeCell::new(value) }
    }

    /// Creates a new mutex with Loom primitives (non-const).
    #[cfg(all(loom, test))]
    pub fn new(value: T) -> Self {
        Self { raw: RawMutex::new(), data: UnsafeCell::new(value) }
    }

    /// Consumes this mutex, returning the underlying data.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// assert_eq!(mutex.into_inner(), 0);
    /// ```
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Attempts to acquire this lock without waiting.
    ///
    /// If the lock could not be acquired at this time, then [`None`] is
    /// returned. Otherwise, an RAII guard is returned. A failed attempt does
    /// not join the queue.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let guard = mutex.try_lock();
    /// assert!(guard.is_some());
    /// assert!(mutex.try_lock().is_none());
    /// ```
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.raw.try_lock().then(|| MutexGuard::new(self))
    }

    /// Attempts to acquire this lock and then runs a closure against the
    /// protected data.
    ///
    /// The closure receives [`None`] if the lock could not be acquired. The
    /// lock is released when the closure returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.try_lock_then(|data| data.map(|data| {
    ///     *data += 1;
    ///     *data
    /// }));
    /// assert_eq!(value, Some(1));
    /// ```
    pub fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<&mut T>) -> Ret,
    {
        match self.try_lock() {
            Some(mut guard) => guard.data_with_mut(|data| f(Some(data))),
            None => f(None),
        }
    }

    /// Acquires this lock, suspending the current task until it is handed
    /// over.
    ///
    /// The returned future resolves to an RAII guard. Dropping the future
    /// before it resolves withdraws the task from the queue.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::Mutex;
    /// use futures_lite::future::block_on;
    ///
    /// let mutex = Mutex::new(0);
    /// block_on(async {
    ///     *mutex.lock().await = 10;
    ///     assert_eq!(*mutex.lock().await, 10);
    /// });
    /// ```
    pub fn lock(&self) -> Lock<'_, T> {
        Lock { mutex: self, acquire: self.raw.lock() }
    }

    /// Acquires this lock and then runs a closure against the protected data.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::Mutex;
    /// use futures_lite::future::block_on;
    ///
    /// let mutex = Mutex::new(vec![1]);
    /// let len = block_on(mutex.lock_then(|data| {
    ///     data.push(2);
    ///     data.len()
    /// }));
    /// assert_eq!(len, 2);
    /// ```
    pub async fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&mut T) -> Ret,
    {
        let mut guard = self.lock().await;
        guard.data_with_mut(f)
    }

    /// Acquires this lock and runs an asynchronous action that receives the
    /// guard.
    ///
    /// The lock is released exactly once, when the action's future finishes,
    /// whether it returns normally, returns an error value, panics, or is
    /// dropped part way through. An action that moves the guard into its
    /// output extends the critical section to that output.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::Mutex;
    /// use futures_lite::future::block_on;
    ///
    /// let mutex = Mutex::new(0);
    /// let result: Result<(), &str> = block_on(mutex.with_lock(|mut guard| async move {
    ///     *guard += 1;
    ///     Err("action failed")
    /// }));
    /// assert!(result.is_err());
    /// assert!(!mutex.is_locked());
    /// ```
    pub async fn with_lock<'a, F, Fut>(&'a self, f: F) -> Fut::Output
    where
        F: FnOnce(MutexGuard<'a, T>) -> Fut,
        Fut: Future,
    {
        let guard = self.lock().await;
        f(guard).await
    }

    /// Acquires this lock unless `signal` completes first.
    ///
    /// The acquisition is polled before the signal, so a hand-off that has
    /// already been committed to this task is returned even when the signal is
    /// ready at the same time. Any runtime's timeout or cancellation token
    /// future can serve as the signal.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the signal won the race. The lock is then not
    /// owned, and the task has left the queue.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::future::ready;
    ///
    /// use fairmutex::{Cancelled, Mutex};
    /// use futures_lite::future::block_on;
    ///
    /// let mutex = Mutex::new(0);
    /// let guard = mutex.try_lock().unwrap();
    /// let result = block_on(mutex.lock_or_cancel(ready(())));
    /// assert_eq!(result.err(), Some(Cancelled));
    /// drop(guard);
    /// assert!(block_on(mutex.lock_or_cancel(ready(()))).is_ok());
    /// ```
    pub async fn lock_or_cancel<S>(&self, signal: S) -> Result<MutexGuard<'_, T>, Cancelled>
    where
        S: Future<Output = ()>,
    {
        let mut lock = pin!(self.lock());
        let mut signal = pin!(signal);
        poll_fn(|cx| {
            if let Poll::Ready(guard) = lock.as_mut().poll(cx) {
                return Poll::Ready(Ok(guard));
            }
            match signal.as_mut().poll(cx) {
                Poll::Ready(()) => Poll::Ready(lock.as_mut().cancel()),
                Poll::Pending => Poll::Pending,
            }
        })
        .await
    }

    /// Acquires this lock from a synchronous context, waiting with the relax
    /// strategy `R`.
    ///
    /// The thread joins the same FIFO queue as suspended tasks.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::relax::Spin;
    /// use fairmutex::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// *mutex.lock_blocking::<Spin>() += 1;
    /// assert_eq!(mutex.into_inner(), 1);
    /// ```
    pub fn lock_blocking<R: Relax>(&self) -> MutexGuard<'_, T> {
        self.raw.lock_blocking::<R>();
        MutexGuard::new(self)
    }

    /// Returns `true` if the lock is currently held.
    ///
    /// This method does not provide any synchronization guarantees, so its only
    /// useful as a heuristic, and so must be considered not up to date.
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// A snapshot of the lock state, see [`RawMutex::state`].
    pub fn state(&self) -> LockState {
        self.raw.state()
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the `Mutex` mutably, no actual locking needs to
    /// take place.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::Mutex;
    ///
    /// let mut mutex = Mutex::new(0);
    /// *mutex.get_mut() = 10;
    /// assert_eq!(mutex.into_inner(), 10);
    /// ```
    #[cfg(not(all(loom, test)))]
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized + Default> Default for Mutex<T> {
    /// Creates a `Mutex<T>`, with the `Default` value for `T`.
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl<T> From<T> for Mutex<T> {
    /// Creates a `Mutex<T>` from a instance of `T`.
    fn from(data: T) -> Self {
        Self::new(data)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Some(guard) => guard.data_with(|data| d.field("data", &data)),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

/// The future returned by [`Mutex::lock`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Lock<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    acquire: Acquire<'a>,
}

impl<'a, T: ?Sized> Lock<'a, T> {
    fn acquire(self: Pin<&mut Self>) -> Pin<&mut Acquire<'a>> {
        // SAFETY: `acquire` is structurally pinned: it is never moved out of
        // `self`, and `Lock` has no `Drop` implementation of its own.
        unsafe { self.map_unchecked_mut(|lock| &mut lock.acquire) }
    }

    /// Withdraws this acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the task left the queue without receiving the
    /// lock. If the lock had already been handed over, the guard is returned
    /// instead.
    ///
    /// # Panics
    ///
    /// Panics if the future already resolved.
    pub fn cancel(self: Pin<&mut Self>) -> Result<MutexGuard<'a, T>, Cancelled> {
        let mutex = self.mutex;
        match self.acquire().cancel() {
            CancelOutcome::Acquired => Ok(MutexGuard::new(mutex)),
            CancelOutcome::Cancelled => Err(Cancelled),
        }
    }
}

impl<'a, T: ?Sized> Future for Lock<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mutex = self.mutex;
        self.acquire().poll(cx).map(|()| MutexGuard::new(mutex))
    }
}

impl<T: ?Sized> fmt::Debug for Lock<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock").field("acquire", &self.acquire).finish()
    }
}

/// An RAII implementation of a "scoped lock" of a mutex. When this structure is
/// dropped (falls out of scope), the lock is handed to the next waiter, or
/// released if there is none.
///
/// The data protected by the mutex can be accessed through this guard via its
/// [`Deref`] and [`DerefMut`] implementations.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized> {
    lock: &'a Mutex<T>,
    marker: PhantomData<&'a mut T>,
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    /// Creates a new `MutexGuard` instance. Caller must own the lock.
    const fn new(lock: &'a Mutex<T>) -> Self {
        Self { lock, marker: PhantomData }
    }

    /// Runs `f` with an immutable reference to the wrapped value.
    fn data_with<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&T) -> Ret,
    {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { self.lock.data.with_unchecked(f) }
    }

    /// Runs `f` with a mutable reference to the wrapped value.
    fn data_with_mut<F, Ret>(&mut self, f: F) -> Ret
    where
        F: FnOnce(&mut T) -> Ret,
    {
        // SAFETY: A guard instance holds the lock locked, and we have
        // exclusive access to the guard.
        unsafe { self.lock.data.with_mut_unchecked(f) }
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    /// Dereferences the guard to access the underlying data.
    fn deref(&self) -> &T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &*self.lock.data.get() }
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    /// Mutably dereferences the guard to access the underlying data.
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data_with(|data| fmt::Debug::fmt(data, f))
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data_with(|data| fmt::Display::fmt(data, f))
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: A guard is only created for the owner of the lock, and it
        // gives that ownership up here.
        unsafe { self.lock.raw.unlock_unchecked() }
    }
}

#[cfg(test)]
impl<T: ?Sized> crate::test::LockNew for Mutex<T> {
    type Target = T;

    fn new(value: Self::Target) -> Self
    where
        Self::Target: Sized,
    {
        Self::new(value)
    }
}

#[cfg(test)]
impl<T: ?Sized> crate::test::LockThen for Mutex<T> {
    fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&mut Self::Target) -> Ret,
    {
        self.lock_blocking::<crate::relax::Yield>().data_with_mut(f)
    }
}

#[cfg(test)]
impl<T: ?Sized> crate::test::TryLockThen for Mutex<T> {
    fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<&mut Self::Target>) -> Ret,
    {
        Self::try_lock_then(self, f)
    }

    fn is_locked(&self) -> bool {
        Self::is_locked(self)
    }
}

#[cfg(all(not(loom), test))]
impl<T: ?Sized> crate::test::LockData for Mutex<T> {
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

#[cfg(all(not(loom), test))]
impl<T: ?Sized> crate::test::LockQueued for Mutex<T> {
    fn queued(&self) -> usize {
        self.raw.queued()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::future::{pending, ready};
    use core::pin::pin;
    use core::task::Poll;
    use std::format;
    use std::string::String;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    use futures_lite::future::block_on;

    use super::Mutex;
    use crate::error::Cancelled;
    use crate::raw::LockState;
    use crate::relax::Yield;
    use crate::test::tests;
    use crate::test::{init_test_logging, poll_once, CountingWaker, LockQueued};

    #[test]
    fn counts_every_locked_increment() {
        tests::counts_every_locked_increment::<Mutex<_>>();
    }

    #[test]
    fn try_lock_only_drops_increments() {
        tests::try_lock_only_drops_increments::<Mutex<_>>();
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
    fn default_and_from() {
        tests::default_and_from::<Mutex<_>>();
    }

    #[test]
    fn try_lock_fails_while_held() {
        tests::try_lock_fails_while_held::<Mutex<_>>();
    }

    #[test]
    fn into_inner_moves_value() {
        tests::into_inner_moves_value::<Mutex<_>>();
    }

    #[test]
    fn get_mut_skips_locking() {
        tests::get_mut_skips_locking::<Mutex<_>>();
    }

    #[test]
    fn blocking_thread_queues_between_tasks() {
        let mutex = Arc::new(Mutex::new(Vec::new()));
        let waker = CountingWaker::new();
        let owner = mutex.try_lock().unwrap();

        let mut first = pin!(mutex.lock());
        assert!(poll_once(first.as_mut(), &waker).is_pending());
        let blocking = {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || mutex.lock_blocking::<Yield>().push("thread"))
        };
        while mutex.queued() < 2 {
            thread::yield_now();
        }
        let mut last = pin!(mutex.lock());
        assert!(poll_once(last.as_mut(), &waker).is_pending());
        assert_eq!(mutex.queued(), 3);

        drop(owner);
        match poll_once(first.as_mut(), &waker) {
            Poll::Ready(mut guard) => guard.push("first"),
            Poll::Pending => panic!("the oldest task was not handed the lock"),
        }
        blocking.join().unwrap();
        match poll_once(last.as_mut(), &waker) {
            Poll::Ready(mut guard) => guard.push("last"),
            Poll::Pending => panic!("the thread did not pass the lock on"),
        }
        assert_eq!(mutex.state(), LockState::Free);
        assert_eq!(*mutex.try_lock().unwrap(), ["first", "thread", "last"]);
    }

    #[test]
    fn test_lock_unsized() {
        let mutex: &Mutex<[i32]> = &Mutex::new([1, 2, 3]);
        block_on(async {
            let mut guard = mutex.lock().await;
            guard[0] = 4;
            guard[2] = 5;
        });
        let comp: &[i32] = &[4, 2, 5];
        assert_eq!(&*mutex.try_lock().unwrap(), comp);
    }

    #[test]
    fn test_guard_debug_display() {
        let value = 42;
        let mutex = Mutex::new(value);
        let guard = mutex.try_lock().unwrap();
        assert_eq!(format!("{value:?}"), format!("{guard:?}"));
        assert_eq!(format!("{value}"), format!("{guard}"));
    }

    #[test]
    fn lock_cancel_returns_guard_after_hand_off() {
        init_test_logging();
        let mutex = Mutex::new(String::from("a"));
        let waker = CountingWaker::new();
        let guard = mutex.try_lock().unwrap();
        {
            let mut lock = pin!(mutex.lock());
            assert!(poll_once(lock.as_mut(), &waker).is_pending());
            drop(guard);
            let mut guard = lock.as_mut().cancel().unwrap();
            guard.push('b');
        }
        assert!(!mutex.is_locked());
        assert_eq!(mutex.into_inner(), "ab");
    }

    #[test]
    fn lock_cancel_before_hand_off() {
        let mutex = Mutex::new(0);
        let waker = CountingWaker::new();
        let guard = mutex.try_lock().unwrap();
        let mut lock = pin!(mutex.lock());
        assert!(poll_once(lock.as_mut(), &waker).is_pending());
        assert_eq!(lock.as_mut().cancel().err(), Some(Cancelled));
        assert_eq!(mutex.state(), LockState::Held);
        drop(guard);
        assert_eq!(mutex.state(), LockState::Free);
    }

    #[test]
    fn lock_or_cancel_prefers_free_lock() {
        let mutex = Mutex::new(1);
        let guard = block_on(mutex.lock_or_cancel(ready(()))).unwrap();
        assert_eq!(*guard, 1);
    }

    #[test]
    fn lock_or_cancel_without_signal_waits() {
        let mutex = Mutex::new(1);
        let waker = CountingWaker::new();
        let guard = mutex.try_lock().unwrap();
        let mut attempt = pin!(mutex.lock_or_cancel(pending()));
        assert!(poll_once(attempt.as_mut(), &waker).is_pending());
        drop(guard);
        assert_eq!(waker.wakes(), 1);
        match poll_once(attempt.as_mut(), &waker) {
            Poll::Ready(Ok(guard)) => assert_eq!(*guard, 1),
            _ => panic!("expected the lock to be handed over"),
        }
        assert!(!mutex.is_locked());
    }

    #[test]
    fn with_lock_releases_on_error() {
        let mutex = Mutex::new(0);
        let result: Result<(), &str> = block_on(mutex.with_lock(|mut guard| async move {
            *guard += 1;
            Err("failed")
        }));
        assert_eq!(result, Err("failed"));
        assert!(!mutex.is_locked());
        assert_eq!(mutex.into_inner(), 1);
    }

    #[test]
    fn with_lock_releases_when_dropped() {
        let mutex = Mutex::new(0);
        let waker = CountingWaker::new();
        {
            let mut scoped = pin!(mutex.with_lock(|guard| async move {
                let _guard = guard;
                pending::<()>().await
            }));
            assert!(poll_once(scoped.as_mut(), &waker).is_pending());
            assert!(mutex.is_locked());
        }
        assert!(!mutex.is_locked());
    }

    #[test]
    fn try_lock_then_on_held_mutex() {
        let mutex = Mutex::new(0);
        let guard = mutex.try_lock().unwrap();
        assert!(mutex.try_lock_then(|data| data.is_none()));
        drop(guard);
        assert_eq!(mutex.try_lock_then(|data| data.map(|data| *data)), Some(0));
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::Mutex;

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<Mutex<_>>();
    }

    #[test]
    fn lock_join() {
        models::lock_join::<Mutex<_>>();
    }

    #[test]
    fn mixed_lock_join() {
        models::mixed_lock_join::<Mutex<_>>();
    }
}
