use core::fmt;
use core::future::Future;
use core::pin::{pin, Pin};
use core::ptr;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::cfg::cell::{UnsafeCell, UnsafeCellWith};
use crate::cfg::log;
use crate::error::IllegalUse;
use crate::queue::{Status, Waiter, WaiterQueue};
use crate::relax::Relax;
use crate::state::{Acquisition, LockState, State, Unlock, Word};

/// How a call to [`Acquire::cancel`] was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "an `Acquired` outcome means the caller owns the lock and must unlock it"]
pub enum CancelOutcome {
    /// The acquisition was withdrawn and the lock was never owned.
    Cancelled,
    /// The lock was handed over before the cancellation took effect. The
    /// caller owns it.
    Acquired,
}

/// A fair, suspending mutual exclusion primitive that protects no data.
///
/// `RawMutex` is the building block behind [`Mutex`]. Acquisitions that find
/// the lock free take it with a single CAS. Contended acquisitions link a
/// waiter record into a FIFO queue and suspend; on release the lock is handed
/// straight to the oldest live waiter, so the lock word never becomes free in
/// between and a late arrival cannot overtake the queue.
///
/// Ownership is not tied to a task or a thread. Whoever acquired the lock is
/// responsible for calling [`unlock`] exactly once.
///
/// # Examples
///
/// ```
/// use fairmutex::raw::RawMutex;
///
/// let mutex = RawMutex::new();
/// futures_lite::future::block_on(mutex.lock());
/// assert!(!mutex.try_lock());
/// mutex.unlock().unwrap();
/// assert!(mutex.try_lock());
/// ```
/// [`Mutex`]: crate::Mutex
/// [`unlock`]: RawMutex::unlock
pub struct RawMutex {
    state: State,
    queue: UnsafeCell<WaiterQueue>,
}

// SAFETY: The queue is only accessed by the owner of the queue-busy bit, and
// the waiter records it links are `Sync` by the same protocol.
unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    /// Creates a new, unlocked mutex.
    ///
    /// # Examples
    ///
    /// ```
    /// use fairmutex::raw::RawMutex;
    ///
    /// static MUTEX: RawMutex = RawMutex::new();
    /// assert!(!MUTEX.is_locked());
    /// ```
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        Self { state: State::new(), queue: UnsafeCell::new(WaiterQueue::new()) }
    }

    /// Creates a new Loom based `RawMutex` (non-const).
    #[cfg(all(loom, test))]
    #[must_use]
    pub fn new() -> Self {
        Self { state: State::new(), queue: UnsafeCell::new(WaiterQueue::new()) }
    }

    /// Attempts to acquire the lock without waiting.
    ///
    /// Returns `true` if the lock was free and now belongs to the caller.
    /// Failing attempts have no side effects, and in particular never join
    /// the queue.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.state.try_acquire()
    }

    /// Returns a future that resolves once the caller owns the lock.
    ///
    /// Dropping the future before it resolves withdraws from the queue. If the
    /// lock had already been handed to it, the drop passes it on.
    pub fn lock(&self) -> Acquire<'_> {
        Acquire { mutex: self, waiter: Waiter::new() }
    }

    /// Acquires the lock from a synchronous context, waiting for the hand-off
    /// with relax strategy `R`.
    ///
    /// Blocking callers join the same FIFO queue as asynchronous ones.
    pub fn lock_blocking<R: Relax>(&self) {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut acquire = pin!(self.lock());
        let mut relax = R::new();
        while acquire.as_mut().poll(&mut cx).is_pending() {
            while acquire.is_queued() {
                relax.relax();
            }
        }
    }

    /// Releases the lock, handing it to the oldest live waiter if any.
    ///
    /// The waker of the new owner is invoked after the queue is released.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalUse`] if the mutex is not locked.
    pub fn unlock(&self) -> Result<(), IllegalUse> {
        match self.state.release_or_queue() {
            Ok(Unlock::Released) => Ok(()),
            Ok(Unlock::Queue) => {
                self.hand_off();
                Ok(())
            }
            Err(err) => {
                log::warning!("unlock called on a mutex that is not locked");
                Err(err)
            }
        }
    }

    /// Releases a lock the caller is known to own.
    ///
    /// # Safety
    ///
    /// The caller must own the lock, and must not use that ownership again.
    pub unsafe fn unlock_unchecked(&self) {
        let released = self.unlock();
        debug_assert!(released.is_ok(), "released a mutex that was not locked");
    }

    /// A snapshot of the lock state. Only meaningful as a hint.
    pub fn state(&self) -> LockState {
        self.state.load()
    }

    /// Returns `true` if the lock is currently held.
    ///
    /// This is only a snapshot: the lock may be taken or released right after
    /// the call returns.
    pub fn is_locked(&self) -> bool {
        self.state() != LockState::Free
    }

    /// How many waiters are linked right now.
    #[cfg(all(not(loom), test))]
    pub(crate) fn queued(&self) -> usize {
        let Some(word) = self.state.lock_queue() else {
            return 0;
        };
        // SAFETY: We own the queue-busy bit.
        let len = unsafe { self.with_queue(|queue| queue.len()) };
        self.state.unlock_queue(word);
        len
    }

    /// Runs `f` against the waiter queue.
    ///
    /// # Safety
    ///
    /// Caller must own the queue-busy bit.
    unsafe fn with_queue<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&mut WaiterQueue) -> Ret,
    {
        // SAFETY: Caller guarantees exclusive access.
        unsafe { self.queue.with_mut_unchecked(f) }
    }

    /// Passes the lock on. Caller owns both the lock and the queue-busy bit.
    fn hand_off(&self) {
        // SAFETY: Caller owns the queue-busy bit and the lock being handed off.
        let (handoff, empty) = unsafe {
            self.with_queue(|queue| {
                let handoff = queue.dequeue_next();
                (handoff, queue.is_empty())
            })
        };
        debug_assert!(handoff.is_some() || empty);
        let next = if handoff.is_some() { Word::held(empty) } else { Word::FREE };
        self.state.unlock_queue(next);
        if let Some(handoff) = handoff {
            handoff.wake();
        }
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMutex").field("state", &self.state()).finish()
    }
}

/// The future returned by [`RawMutex::lock`].
///
/// Resolves to `()` once the caller owns the lock. The waiter record of a
/// contended acquisition lives inside this future, which is why it is
/// `!Unpin` and must be pinned before polling.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Acquire<'a> {
    mutex: &'a RawMutex,
    waiter: Waiter,
}

impl Acquire<'_> {
    /// Withdraws this acquisition.
    ///
    /// Cancellation and the hand-off race on the waiter status and exactly one
    /// of them wins. If the hand-off won, the outcome is
    /// [`CancelOutcome::Acquired`] and the caller owns the lock. Cancelling an
    /// acquisition that was never polled, or was already cancelled, reports
    /// [`CancelOutcome::Cancelled`].
    ///
    /// # Panics
    ///
    /// Panics if the future already resolved.
    pub fn cancel(self: Pin<&mut Self>) -> CancelOutcome {
        self.into_ref().get_ref().withdraw()
    }

    fn is_queued(&self) -> bool {
        self.waiter.status() == Status::Queued
    }

    fn complete(&self) -> Poll<()> {
        self.waiter.set_status(Status::Done);
        Poll::Ready(())
    }

    fn start(&self, cx: &Context<'_>) -> Poll<()> {
        match self.mutex.state.acquire_or_queue() {
            Acquisition::Acquired => self.complete(),
            Acquisition::Queue => {
                // SAFETY: We own the queue-busy bit. The record is pinned, and
                // it is unlinked before this future can be dropped.
                let sequence = unsafe {
                    self.mutex.with_queue(|queue| queue.push_back(&self.waiter, cx.waker()))
                };
                self.mutex.state.unlock_queue(Word::HELD_WITH_WAITERS);
                log::trace!("waiter enqueued", sequence = sequence);
                Poll::Pending
            }
        }
    }

    fn recheck(&self, cx: &Context<'_>) -> Poll<()> {
        // A queued waiter keeps the lock held, so the queue can be locked
        // unless the hand-off already completed.
        let Some(word) = self.mutex.state.lock_queue() else {
            return self.complete();
        };
        let granted = self.waiter.status() == Status::Granted;
        if !granted {
            // SAFETY: We own the queue-busy bit.
            unsafe { self.waiter.register(cx.waker()) };
        }
        self.mutex.state.unlock_queue(word);
        if granted {
            self.complete()
        } else {
            Poll::Pending
        }
    }

    fn withdraw(&self) -> CancelOutcome {
        match self.waiter.status() {
            Status::Idle | Status::Cancelled => {
                self.waiter.set_status(Status::Cancelled);
                CancelOutcome::Cancelled
            }
            Status::Granted => {
                self.waiter.set_status(Status::Done);
                CancelOutcome::Acquired
            }
            Status::Queued => match self.waiter.try_cancel() {
                Ok(()) => {
                    self.detach();
                    CancelOutcome::Cancelled
                }
                Err(status) => {
                    debug_assert_eq!(status, Status::Granted);
                    self.waiter.set_status(Status::Done);
                    CancelOutcome::Acquired
                }
            },
            Status::Done => panic!("`Acquire` cancelled after it resolved"),
        }
    }

    /// Unlinks a cancelled record, unless a release already skipped it.
    fn detach(&self) {
        let Some(word) = self.mutex.state.lock_queue() else {
            // The lock went free, so the queue is empty.
            return;
        };
        debug_assert!(word.is_held());
        // SAFETY: We own the queue-busy bit and our record is pinned.
        let (removed, empty, sequence) = unsafe {
            self.mutex.with_queue(|queue| {
                let removed = queue.remove(&self.waiter);
                (removed, queue.is_empty(), self.waiter.sequence())
            })
        };
        self.mutex.state.unlock_queue(Word::held(empty));
        log::trace!("cancelled waiter", sequence = sequence, removed = removed);
    }
}

impl Future for Acquire<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.into_ref().get_ref();
        match this.waiter.status() {
            Status::Idle => this.start(cx),
            Status::Queued => this.recheck(cx),
            Status::Granted => this.complete(),
            Status::Cancelled | Status::Done => panic!("`Acquire` polled after completion"),
        }
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        if matches!(self.waiter.status(), Status::Queued | Status::Granted) {
            if let CancelOutcome::Acquired = self.withdraw() {
                log::debug!("dropped acquisition passes on a granted lock");
                // SAFETY: The hand-off made us the owner and nobody else can
                // observe that ownership anymore.
                unsafe { self.mutex.unlock_unchecked() };
            }
        }
    }
}

impl fmt::Debug for Acquire<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquire")
            .field("mutex", self.mutex)
            .field("status", &self.waiter.status())
            .finish()
    }
}

/// A waker that does nothing, for callers that wait by relaxing instead.
pub(crate) fn noop_waker() -> Waker {
    const VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    const RAW: RawWaker = RawWaker::new(ptr::null(), &VTABLE);

    fn clone(_: *const ()) -> RawWaker {
        RAW
    }

    fn noop(_: *const ()) {}

    // SAFETY: The vtable functions ignore the data pointer entirely.
    unsafe { Waker::from_raw(RAW) }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::pin::pin;
    use core::task::Poll;
    use std::sync::Arc;
    use std::thread;

    use super::{CancelOutcome, RawMutex};
    use crate::error::IllegalUse;
    use crate::relax::Yield;
    use crate::state::LockState;
    use crate::test::{poll_once, CountingWaker};

    #[test]
    fn try_lock_is_idempotent_while_held() {
        let mutex = RawMutex::new();
        assert!(mutex.try_lock());
        assert!(!mutex.try_lock());
        assert!(!mutex.try_lock());
        assert_eq!(mutex.state(), LockState::Held);
        mutex.unlock().unwrap();
        assert_eq!(mutex.state(), LockState::Free);
    }

    #[test]
    fn unlock_free_mutex_is_illegal() {
        let mutex = RawMutex::new();
        assert_eq!(mutex.unlock(), Err(IllegalUse));
        assert!(!mutex.is_locked());
    }

    #[test]
    fn contended_lock_is_handed_off() {
        let mutex = RawMutex::new();
        let waker = CountingWaker::new();
        let mut first = pin!(mutex.lock());
        let mut second = pin!(mutex.lock());
        assert_eq!(poll_once(first.as_mut(), &waker), Poll::Ready(()));
        assert_eq!(poll_once(second.as_mut(), &waker), Poll::Pending);
        assert_eq!(mutex.state(), LockState::HeldWithWaiters);

        mutex.unlock().unwrap();
        assert_eq!(waker.wakes(), 1);
        // Handed off: the word never went free.
        assert_eq!(mutex.state(), LockState::Held);
        assert!(!mutex.try_lock());
        assert_eq!(poll_once(second.as_mut(), &waker), Poll::Ready(()));
        mutex.unlock().unwrap();
        assert_eq!(mutex.state(), LockState::Free);
    }

    #[test]
    fn repoll_refreshes_waker() {
        let mutex = RawMutex::new();
        assert!(mutex.try_lock());
        let (old, new) = (CountingWaker::new(), CountingWaker::new());
        let mut acquire = pin!(mutex.lock());
        assert_eq!(poll_once(acquire.as_mut(), &old), Poll::Pending);
        assert_eq!(poll_once(acquire.as_mut(), &new), Poll::Pending);
        mutex.unlock().unwrap();
        assert_eq!(old.wakes(), 0);
        assert_eq!(new.wakes(), 1);
        assert_eq!(poll_once(acquire.as_mut(), &new), Poll::Ready(()));
        mutex.unlock().unwrap();
    }

    #[test]
    fn cancel_queued_waiter() {
        let mutex = RawMutex::new();
        let waker = CountingWaker::new();
        assert!(mutex.try_lock());
        let mut acquire = pin!(mutex.lock());
        assert_eq!(poll_once(acquire.as_mut(), &waker), Poll::Pending);
        assert_eq!(acquire.as_mut().cancel(), CancelOutcome::Cancelled);
        // The last waiter left, so the waiters flag is cleared.
        assert_eq!(mutex.state(), LockState::Held);
        mutex.unlock().unwrap();
        assert_eq!(mutex.state(), LockState::Free);
        assert_eq!(waker.wakes(), 0);
    }

    #[test]
    fn cancelling_every_waiter_in_any_order_frees_the_queue() {
        let mutex = RawMutex::new();
        let waker = CountingWaker::new();
        assert!(mutex.try_lock());
        let mut a = pin!(mutex.lock());
        let mut b = pin!(mutex.lock());
        let mut c = pin!(mutex.lock());
        let mut d = pin!(mutex.lock());
        for acquire in [a.as_mut(), b.as_mut(), c.as_mut(), d.as_mut()] {
            assert_eq!(poll_once(acquire, &waker), Poll::Pending);
        }
        assert_eq!(mutex.queued(), 4);

        for acquire in [c.as_mut(), a.as_mut(), d.as_mut()] {
            assert_eq!(acquire.cancel(), CancelOutcome::Cancelled);
            assert_eq!(mutex.state(), LockState::HeldWithWaiters);
        }
        assert_eq!(b.as_mut().cancel(), CancelOutcome::Cancelled);
        assert_eq!(mutex.queued(), 0);
        assert_eq!(mutex.state(), LockState::Held);

        mutex.unlock().unwrap();
        assert_eq!(mutex.state(), LockState::Free);
        assert_eq!(waker.wakes(), 0);
    }

    #[test]
    fn cancel_after_hand_off_acquires() {
        let mutex = RawMutex::new();
        let waker = CountingWaker::new();
        assert!(mutex.try_lock());
        let mut acquire = pin!(mutex.lock());
        assert_eq!(poll_once(acquire.as_mut(), &waker), Poll::Pending);
        mutex.unlock().unwrap();
        assert_eq!(acquire.as_mut().cancel(), CancelOutcome::Acquired);
        assert!(mutex.is_locked());
        mutex.unlock().unwrap();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn cancel_unpolled_is_noop() {
        let mutex = RawMutex::new();
        let mut acquire = pin!(mutex.lock());
        assert_eq!(acquire.as_mut().cancel(), CancelOutcome::Cancelled);
        assert_eq!(acquire.as_mut().cancel(), CancelOutcome::Cancelled);
        assert!(!mutex.is_locked());
    }

    #[test]
    fn drop_granted_future_passes_lock_on() {
        let mutex = RawMutex::new();
        let waker = CountingWaker::new();
        assert!(mutex.try_lock());
        let mut third = Box::pin(mutex.lock());
        {
            let mut second = Box::pin(mutex.lock());
            assert_eq!(poll_once(second.as_mut(), &waker), Poll::Pending);
            assert_eq!(poll_once(third.as_mut(), &waker), Poll::Pending);
            mutex.unlock().unwrap();
            assert_eq!(waker.wakes(), 1);
            // `second` owns the lock but is dropped before observing it.
        }
        assert_eq!(waker.wakes(), 2);
        assert_eq!(poll_once(third.as_mut(), &waker), Poll::Ready(()));
        mutex.unlock().unwrap();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn drop_queued_future_leaves_queue() {
        let mutex = RawMutex::new();
        let waker = CountingWaker::new();
        assert!(mutex.try_lock());
        {
            let mut acquire = Box::pin(mutex.lock());
            assert_eq!(poll_once(acquire.as_mut(), &waker), Poll::Pending);
            assert_eq!(mutex.state(), LockState::HeldWithWaiters);
        }
        assert_eq!(mutex.state(), LockState::Held);
        mutex.unlock().unwrap();
        assert!(!mutex.is_locked());
    }

    #[test]
    #[should_panic(expected = "polled after completion")]
    fn poll_after_completion_panics() {
        let mutex = RawMutex::new();
        let waker = CountingWaker::new();
        let mut acquire = pin!(mutex.lock());
        let _ = poll_once(acquire.as_mut(), &waker);
        let _ = poll_once(acquire.as_mut(), &waker);
    }

    #[test]
    fn blocking_waiters_share_the_queue() {
        const THREADS: usize = 4;
        let mutex = Arc::new(RawMutex::new());
        assert!(mutex.try_lock());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    mutex.lock_blocking::<Yield>();
                    mutex.unlock().unwrap();
                })
            })
            .collect();
        mutex.unlock().unwrap();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(mutex.state(), LockState::Free);
    }

    #[test]
    fn debug_shows_state() {
        let mutex = RawMutex::new();
        assert_eq!(format!("{mutex:?}"), "RawMutex { state: Free }");
        assert!(mutex.try_lock());
        assert_eq!(format!("{mutex:?}"), "RawMutex { state: Held }");
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;

    #[test]
    fn cancel_races_hand_off() {
        models::cancel_races_hand_off();
    }

    #[test]
    fn drop_races_hand_off() {
        models::drop_races_hand_off();
    }
}
