//! The lock state word.
//!
//! One atomic word carries the lock state and a queue-busy bit. The bit grants
//! exclusive access to the waiter queue and is acquired with a CAS on the same
//! word that encodes the lock state, so the queue needs no lock of its own.
//! The busy bit is only ever set while the lock is held: a free mutex always
//! has an empty queue, so there is nothing to guard.

use core::fmt;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::cfg::atomic::AtomicUsize;
use crate::error::IllegalUse;
use crate::relax::Relax;

#[cfg(not(all(loom, test)))]
type Busy = crate::relax::SpinBackoff;

// Backoff spins would make Loom explore every hint as a separate yield point.
#[cfg(all(loom, test))]
type Busy = crate::relax::Yield;

/// An observation of the mutex state.
///
/// Returned by [`RawMutex::state`]. The value may be stale by the time it is
/// inspected unless the caller holds the lock.
///
/// [`RawMutex::state`]: crate::raw::RawMutex::state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockState {
    /// Nobody holds the lock and nobody waits for it.
    Free,
    /// The lock is held and no task is queued.
    Held,
    /// The lock is held and at least one task is queued.
    HeldWithWaiters,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Free => "free",
            Self::Held => "held",
            Self::HeldWithWaiters => "held with waiters",
        })
    }
}

/// A decoded value of the state word.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Word(usize);

impl Word {
    const HELD_BIT: usize = 1 << 0;
    const WAITERS_BIT: usize = 1 << 1;
    const BUSY_BIT: usize = 1 << 2;

    pub const FREE: Self = Self(0);
    pub const HELD: Self = Self(Self::HELD_BIT);
    pub const HELD_WITH_WAITERS: Self = Self(Self::HELD_BIT | Self::WAITERS_BIT);

    /// The held word that matches the queue contents.
    pub const fn held(queue_is_empty: bool) -> Self {
        if queue_is_empty {
            Self::HELD
        } else {
            Self::HELD_WITH_WAITERS
        }
    }

    pub const fn is_held(self) -> bool {
        self.0 & Self::HELD_BIT != 0
    }

    const fn is_busy(self) -> bool {
        self.0 & Self::BUSY_BIT != 0
    }

    const fn with_busy(self) -> Self {
        Self(self.0 | Self::BUSY_BIT)
    }

    const fn decode(self) -> LockState {
        match (self.is_held(), self.0 & Self::WAITERS_BIT != 0) {
            (false, _) => LockState::Free,
            (true, false) => LockState::Held,
            (true, true) => LockState::HeldWithWaiters,
        }
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Word")
            .field("state", &self.decode())
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// The outcome of an acquisition attempt.
pub(crate) enum Acquisition {
    /// The lock was free and now belongs to the caller.
    Acquired,
    /// The lock is held by someone else. The caller now owns the queue-busy
    /// bit and the word has been marked as having waiters.
    Queue,
}

/// The outcome of a release attempt.
pub(crate) enum Unlock {
    /// There were no waiters and the lock is now free.
    Released,
    /// There are waiters. The caller now owns the queue-busy bit and must pass
    /// the lock on.
    Queue,
}

/// The atomic lock state word.
pub(crate) struct State {
    word: AtomicUsize,
}

impl State {
    #[cfg(not(all(loom, test)))]
    pub const fn new() -> Self {
        Self { word: AtomicUsize::new(Word::FREE.0) }
    }

    #[cfg(all(loom, test))]
    pub fn new() -> Self {
        Self { word: AtomicUsize::new(Word::FREE.0) }
    }

    /// Racy snapshot of the lock state.
    pub fn load(&self) -> LockState {
        Word(self.word.load(Relaxed)).decode()
    }

    /// The single `Free -> Held` transition.
    pub fn try_acquire(&self) -> bool {
        self.word.compare_exchange(Word::FREE.0, Word::HELD.0, Acquire, Relaxed).is_ok()
    }

    /// Takes the lock if free, otherwise takes the queue-busy bit and marks the
    /// word as having waiters, all in one CAS.
    pub fn acquire_or_queue(&self) -> Acquisition {
        let mut busy = Busy::new();
        loop {
            let word = Word(self.word.load(Relaxed));
            if word == Word::FREE {
                if self.try_acquire() {
                    return Acquisition::Acquired;
                }
            } else if word.is_busy() {
                busy.relax();
            } else {
                let next = Word::HELD_WITH_WAITERS.with_busy();
                if self.swap_from(word, next) {
                    return Acquisition::Queue;
                }
            }
        }
    }

    /// Frees the lock if nobody waits, otherwise takes the queue-busy bit.
    pub fn release_or_queue(&self) -> Result<Unlock, IllegalUse> {
        let mut busy = Busy::new();
        loop {
            let word = Word(self.word.load(Relaxed));
            if !word.is_held() {
                return Err(IllegalUse);
            } else if word == Word::HELD {
                let freed = self.word.compare_exchange(word.0, Word::FREE.0, Release, Relaxed);
                if freed.is_ok() {
                    return Ok(Unlock::Released);
                }
            } else if word.is_busy() {
                busy.relax();
            } else if self.swap_from(word, word.with_busy()) {
                return Ok(Unlock::Queue);
            }
        }
    }

    /// Takes the queue-busy bit, returning the word it replaced, or `None` if
    /// the lock is free and the queue is therefore empty.
    ///
    /// A `None` result synchronizes with the release that freed the lock, so
    /// any access that release made to a waiter record happens before it.
    pub fn lock_queue(&self) -> Option<Word> {
        let mut busy = Busy::new();
        loop {
            let word = Word(self.word.load(Acquire));
            if !word.is_held() {
                return None;
            } else if word.is_busy() {
                busy.relax();
            } else if self.swap_from(word, word.with_busy()) {
                return Some(word);
            }
        }
    }

    /// Releases the queue-busy bit, publishing `next` as the new state.
    pub fn unlock_queue(&self, next: Word) {
        debug_assert!(Word(self.word.load(Relaxed)).is_busy());
        debug_assert!(!next.is_busy());
        self.word.store(next.0, Release);
    }

    fn swap_from(&self, current: Word, next: Word) -> bool {
        self.word.compare_exchange_weak(current.0, next.0, Acquire, Relaxed).is_ok()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{Acquisition, LockState, State, Unlock, Word};
    use crate::error::IllegalUse;

    #[test]
    fn fresh_state_is_free() {
        let state = State::new();
        assert_eq!(state.load(), LockState::Free);
        assert!(state.lock_queue().is_none());
    }

    #[test]
    fn try_acquire_is_exclusive() {
        let state = State::new();
        assert!(state.try_acquire());
        assert!(!state.try_acquire());
        assert_eq!(state.load(), LockState::Held);
    }

    #[test]
    fn contended_acquire_takes_queue() {
        let state = State::new();
        assert!(matches!(state.acquire_or_queue(), Acquisition::Acquired));
        assert!(matches!(state.acquire_or_queue(), Acquisition::Queue));
        // Busy bit set, lock state reads as having waiters.
        assert_eq!(state.load(), LockState::HeldWithWaiters);
        assert!(!state.try_acquire());
        state.unlock_queue(Word::HELD_WITH_WAITERS);
        assert!(matches!(state.release_or_queue(), Ok(Unlock::Queue)));
        state.unlock_queue(Word::FREE);
        assert_eq!(state.load(), LockState::Free);
    }

    #[test]
    fn release_of_free_word_is_illegal() {
        let state = State::new();
        assert_eq!(state.release_or_queue().err(), Some(IllegalUse));
        assert!(state.try_acquire());
        assert!(matches!(state.release_or_queue(), Ok(Unlock::Released)));
        assert_eq!(state.release_or_queue().err(), Some(IllegalUse));
    }

    #[test]
    fn held_word_matches_queue() {
        assert_eq!(Word::held(true), Word::HELD);
        assert_eq!(Word::held(false), Word::HELD_WITH_WAITERS);
        assert_eq!(Word::HELD_WITH_WAITERS.with_busy().decode(), LockState::HeldWithWaiters);
        assert!(!Word::FREE.is_held());
    }

    #[test]
    fn lock_state_display() {
        use std::string::ToString;
        assert_eq!(LockState::Free.to_string(), "free");
        assert_eq!(LockState::HeldWithWaiters.to_string(), "held with waiters");
    }
}
