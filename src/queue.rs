//! The intrusive FIFO queue of suspended acquirers.
//!
//! Every waiter record lives inside a pinned acquisition future, so the queue
//! never allocates. Links and wakers are only touched by the party that owns
//! the queue-busy bit of the state word. The status word is the one exception:
//! it is atomic because cancellation flips it without owning the queue.

use core::marker::PhantomPinned;
use core::ptr::NonNull;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};
use core::task::Waker;

use crate::cfg::atomic::AtomicUsize;
use crate::cfg::cell::{UnsafeCell, UnsafeCellWith};
use crate::cfg::log;

type Link = Option<NonNull<Waiter>>;

/// The lifecycle of a waiter record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub(crate) enum Status {
    /// Not yet polled, or polled and acquired without contention.
    Idle = 0,
    /// Linked into the queue, waiting for a hand-off.
    Queued = 1,
    /// Unlinked by a release and given ownership of the lock.
    Granted = 2,
    /// Withdrawn before any hand-off reached it.
    Cancelled = 3,
    /// Ownership was reported to the caller.
    Done = 4,
}

impl Status {
    const fn from_usize(value: usize) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Queued,
            2 => Self::Granted,
            3 => Self::Cancelled,
            _ => Self::Done,
        }
    }
}

/// Queue-owned part of a waiter record.
struct Slot {
    prev: Link,
    next: Link,
    waker: Option<Waker>,
    sequence: u64,
    linked: bool,
}

/// A waiter record, embedded in an acquisition future.
pub(crate) struct Waiter {
    status: AtomicUsize,
    slot: UnsafeCell<Slot>,
    _pinned: PhantomPinned,
}

// SAFETY: The slot is only accessed by the owner of the queue-busy bit, and
// the status is atomic.
unsafe impl Send for Waiter {}
unsafe impl Sync for Waiter {}

impl Waiter {
    #[cfg(not(all(loom, test)))]
    pub const fn new() -> Self {
        let slot = Slot { prev: None, next: None, waker: None, sequence: 0, linked: false };
        let status = AtomicUsize::new(Status::Idle as usize);
        Self { status, slot: UnsafeCell::new(slot), _pinned: PhantomPinned }
    }

    #[cfg(all(loom, test))]
    pub fn new() -> Self {
        let slot = Slot { prev: None, next: None, waker: None, sequence: 0, linked: false };
        let status = AtomicUsize::new(Status::Idle as usize);
        Self { status, slot: UnsafeCell::new(slot), _pinned: PhantomPinned }
    }

    /// Reads the status, synchronizing with a hand-off that granted the lock.
    pub fn status(&self) -> Status {
        Status::from_usize(self.status.load(Acquire))
    }

    /// Sets a status that no other party may race with.
    ///
    /// Only the owning future calls this, and never while `Queued`.
    pub fn set_status(&self, status: Status) {
        debug_assert_ne!(self.status(), Status::Queued);
        self.status.store(status as usize, Relaxed);
    }

    /// Flips a queued waiter to `Cancelled`, or reports the status that beat
    /// the cancellation.
    pub fn try_cancel(&self) -> Result<(), Status> {
        self.status
            .compare_exchange(Status::Queued as usize, Status::Cancelled as usize, AcqRel, Acquire)
            .map(drop)
            .map_err(Status::from_usize)
    }

    /// Replaces the stored waker unless it would wake the same task.
    ///
    /// # Safety
    ///
    /// Caller must own the queue-busy bit.
    pub unsafe fn register(&self, waker: &Waker) {
        let register = |slot: &mut Slot| match &slot.waker {
            Some(stored) if stored.will_wake(waker) => {}
            _ => slot.waker = Some(waker.clone()),
        };
        // SAFETY: Caller guarantees exclusive access to queue-owned fields.
        unsafe { self.slot.with_mut_unchecked(register) }
    }

    /// Whether the record is still linked into the queue.
    ///
    /// # Safety
    ///
    /// Caller must own the queue-busy bit.
    pub unsafe fn is_linked(&self) -> bool {
        // SAFETY: Caller guarantees exclusive access to queue-owned fields.
        unsafe { self.slot.with_unchecked(|slot| slot.linked) }
    }

    /// The enqueue sequence number, zero if never enqueued.
    ///
    /// # Safety
    ///
    /// Caller must own the queue-busy bit, or be the owning future after the
    /// record left the queue.
    pub unsafe fn sequence(&self) -> u64 {
        // SAFETY: Caller guarantees there are no concurrent writers.
        unsafe { self.slot.with_unchecked(|slot| slot.sequence) }
    }
}

/// A successful hand-off, ready to be delivered once the queue is unlocked.
pub(crate) struct Handoff {
    pub waker: Option<Waker>,
    pub sequence: u64,
}

impl Handoff {
    /// Resumes the task that now owns the lock.
    pub fn wake(self) {
        log::trace!("lock handed off", sequence = self.sequence);
        if let Some(waker) = self.waker {
            waker.wake();
        }
    }
}

/// The queue proper: head and tail links plus the sequence counter.
pub(crate) struct WaiterQueue {
    head: Link,
    tail: Link,
    next_sequence: u64,
}

impl WaiterQueue {
    pub const fn new() -> Self {
        Self { head: None, tail: None, next_sequence: 1 }
    }

    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Counts the linked records.
    ///
    /// # Safety
    ///
    /// Caller must own the queue-busy bit.
    #[cfg(all(not(loom), test))]
    pub unsafe fn len(&self) -> usize {
        let mut len = 0;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            len += 1;
            // SAFETY: Linked records are alive while linked.
            cursor = unsafe { node.as_ref().slot.with_unchecked(|s| s.next) };
        }
        len
    }

    /// Links `waiter` at the tail, marks it `Queued` and stores its waker.
    /// Returns the assigned sequence number.
    ///
    /// # Safety
    ///
    /// Caller must own the queue-busy bit, `waiter` must be pinned, unlinked,
    /// and must stay alive until it is unlinked again.
    pub unsafe fn push_back(&mut self, waiter: &Waiter, waker: &Waker) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let prev = self.tail;
        let push = |slot: &mut Slot| {
            debug_assert!(!slot.linked);
            *slot = Slot { prev, next: None, waker: Some(waker.clone()), sequence, linked: true };
        };
        // SAFETY: Caller guarantees exclusive access to queue-owned fields.
        unsafe { waiter.slot.with_mut_unchecked(push) };
        waiter.status.store(Status::Queued as usize, Relaxed);

        let node = NonNull::from(waiter);
        match prev {
            // SAFETY: Linked records are alive while linked.
            Some(tail) => unsafe { tail.as_ref().slot.with_mut_unchecked(|s| s.next = Some(node)) },
            None => self.head = Some(node),
        }
        self.tail = Some(node);
        sequence
    }

    /// Unlinks the head, if any, returning it.
    ///
    /// # Safety
    ///
    /// Caller must own the queue-busy bit.
    unsafe fn pop_front(&mut self) -> Option<&Waiter> {
        let head = self.head?;
        // SAFETY: Linked records are alive while linked, and the caller owns
        // the queue-busy bit.
        let waiter = unsafe { head.as_ref() };
        unsafe { self.unlink(waiter) };
        Some(waiter)
    }

    /// Pops waiters in FIFO order until one accepts the lock, discarding the
    /// cancelled ones. Returns `None` if no live waiter remains.
    ///
    /// A granted waiter may run, and even be freed, as soon as its status
    /// flips, so the record is not touched after the grant.
    ///
    /// # Safety
    ///
    /// Caller must own the queue-busy bit and the lock it hands off.
    pub unsafe fn dequeue_next(&mut self) -> Option<Handoff> {
        // SAFETY: Caller owns the queue-busy bit.
        while let Some(waiter) = unsafe { self.pop_front() } {
            // SAFETY: Unlinked but still alive: its owner can only free it
            // after observing a grant, or after taking the queue-busy bit.
            let (waker, sequence) =
                unsafe { waiter.slot.with_mut_unchecked(|s| (s.waker.take(), s.sequence)) };
            let granted = waiter.status.compare_exchange(
                Status::Queued as usize,
                Status::Granted as usize,
                AcqRel,
                Relaxed,
            );
            if granted.is_ok() {
                return Some(Handoff { waker, sequence });
            }
            log::trace!("skipped cancelled waiter", sequence = sequence);
        }
        None
    }

    /// Unlinks `waiter` if it is still linked. Returns whether it was.
    ///
    /// # Safety
    ///
    /// Caller must own the queue-busy bit, and `waiter` must be unlinked or
    /// linked into this very queue.
    pub unsafe fn remove(&mut self, waiter: &Waiter) -> bool {
        // SAFETY: Caller owns the queue-busy bit.
        if unsafe { !waiter.is_linked() } {
            return false;
        }
        unsafe { self.unlink(waiter) };
        true
    }

    /// # Safety
    ///
    /// Caller must own the queue-busy bit and `waiter` must be linked here.
    unsafe fn unlink(&mut self, waiter: &Waiter) {
        let detach = |slot: &mut Slot| {
            slot.linked = false;
            (slot.prev.take(), slot.next.take())
        };
        // SAFETY: Caller owns the queue-busy bit.
        let (prev, next) = unsafe { waiter.slot.with_mut_unchecked(detach) };
        // SAFETY: Neighbours are linked, hence alive.
        match prev {
            Some(prev) => unsafe { prev.as_ref().slot.with_mut_unchecked(|s| s.next = next) },
            None => self.head = next,
        }
        match next {
            Some(next) => unsafe { next.as_ref().slot.with_mut_unchecked(|s| s.prev = prev) },
            None => self.tail = prev,
        }
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use core::pin::pin;
    use std::vec::Vec;

    use super::{Status, Waiter, WaiterQueue};
    use crate::test::noop_waker;

    fn drain(queue: &mut WaiterQueue) -> Vec<u64> {
        let mut order = Vec::new();
        while let Some(handoff) = unsafe { queue.dequeue_next() } {
            order.push(handoff.sequence);
        }
        order
    }

    #[test]
    fn dequeue_is_fifo() {
        let waker = noop_waker();
        let (a, b, c) = (pin!(Waiter::new()), pin!(Waiter::new()), pin!(Waiter::new()));
        let mut queue = WaiterQueue::new();
        let seqs = unsafe { [&*a, &*b, &*c].map(|w| queue.push_back(w, &waker)) };
        assert_eq!(seqs, [1, 2, 3]);
        assert!(!queue.is_empty());
        assert_eq!(drain(&mut queue), [1, 2, 3]);
        assert!(queue.is_empty());
        assert_eq!(a.status(), Status::Granted);
        assert_eq!(c.status(), Status::Granted);
    }

    #[test]
    fn dequeue_skips_cancelled() {
        let waker = noop_waker();
        let (a, b, c) = (pin!(Waiter::new()), pin!(Waiter::new()), pin!(Waiter::new()));
        let mut queue = WaiterQueue::new();
        unsafe { [&*a, &*b, &*c].map(|w| queue.push_back(w, &waker)) };
        assert!(a.try_cancel().is_ok());
        let next = unsafe { queue.dequeue_next() }.map(|h| h.sequence);
        assert_eq!(next, Some(2));
        // The cancelled head was unlinked on the way.
        assert!(unsafe { !a.is_linked() });
        assert_eq!(a.status(), Status::Cancelled);
        assert_eq!(b.try_cancel(), Err(Status::Granted));
    }

    #[test]
    fn dequeue_all_cancelled_yields_none() {
        let waker = noop_waker();
        let (a, b) = (pin!(Waiter::new()), pin!(Waiter::new()));
        let mut queue = WaiterQueue::new();
        unsafe { [&*a, &*b].map(|w| queue.push_back(w, &waker)) };
        assert!(a.try_cancel().is_ok());
        assert!(b.try_cancel().is_ok());
        assert!(unsafe { queue.dequeue_next() }.is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn remove_middle_keeps_order() {
        let waker = noop_waker();
        let (a, b, c) = (pin!(Waiter::new()), pin!(Waiter::new()), pin!(Waiter::new()));
        let mut queue = WaiterQueue::new();
        unsafe { [&*a, &*b, &*c].map(|w| queue.push_back(w, &waker)) };
        assert!(unsafe { queue.remove(&b) });
        assert!(unsafe { !queue.remove(&b) });
        assert_eq!(drain(&mut queue), [1, 3]);
    }

    #[test]
    fn remove_tail_then_push() {
        let waker = noop_waker();
        let (a, b, c) = (pin!(Waiter::new()), pin!(Waiter::new()), pin!(Waiter::new()));
        let mut queue = WaiterQueue::new();
        unsafe { [&*a, &*b].map(|w| queue.push_back(w, &waker)) };
        assert!(unsafe { queue.remove(&b) });
        let seq = unsafe { queue.push_back(&c, &waker) };
        assert_eq!(seq, 3);
        assert_eq!(drain(&mut queue), [1, 3]);
    }
}
