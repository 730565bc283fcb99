use crate::cfg::sync::Arc;

/// A trait for lock types that can hold user defined values.
pub trait LockNew {
    /// The type of the value this lock holds.
    type Target: ?Sized;

    /// Creates a new mutex in an unlocked state ready for use.
    fn new(value: Self::Target) -> Self
    where
        Self::Target: Sized;
}

/// A trait for locks that block the current thread until acquired and then
/// run closures against the protected data.
pub trait LockThen: LockNew {
    /// Acquires the lock and then runs the closure against the protected data.
    fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&mut Self::Target) -> Ret;
}

/// A trait for locks that test if the lock is busy and run closures against
/// the protected data in case of success.
pub trait TryLockThen: LockThen {
    /// Attempts to acquire the lock and then runs the closure against the
    /// protected data if successful.
    fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<&mut Self::Target>) -> Ret;

    /// Returns `true` if the lock is currently held.
    #[cfg_attr(all(loom, test), allow(dead_code))]
    fn is_locked(&self) -> bool;
}

/// A trait for lock types that can return either the underlying value (by
/// consuming the mutex) or a exclusive reference to it.
#[cfg(not(loom))]
pub trait LockData: LockNew {
    /// Consumes this mutex, returning the underlying data.
    fn into_inner(self) -> Self::Target
    where
        Self::Target: Sized;

    /// Returns a mutable reference to the underlying data.
    fn get_mut(&mut self) -> &mut Self::Target;
}

/// A trait for locks whose waiter queue can be inspected, so tests can wait
/// until a blocked thread has actually joined it.
#[cfg(not(loom))]
pub trait LockQueued {
    /// The number of waiters currently linked into the queue.
    fn queued(&self) -> usize;
}

/// An arbitrary unsigned integer type.
pub type Int = u32;

/// Get a copy of the mutex protected data.
pub fn get<L>(mutex: &Arc<L>) -> L::Target
where
    L: LockThen<Target: Sized + Copy>,
{
    mutex.lock_then(|data| *data)
}

/// Increments a shared integer.
pub fn inc<L>(mutex: &Arc<L>)
where
    L: LockThen<Target = Int>,
{
    mutex.lock_then(|data| *data += 1);
}

/// Tries to increment a shared integer.
pub fn try_inc<L>(mutex: &Arc<L>)
where
    L: TryLockThen<Target = Int>,
{
    mutex.try_lock_then(|data| data.map(|data| *data += 1));
}

#[cfg(not(loom))]
pub use async_support::{init_test_logging, poll_once, CountingWaker};

#[cfg(not(loom))]
pub(crate) use crate::raw::noop_waker;

#[cfg(not(loom))]
mod async_support {
    use core::future::Future;
    use core::pin::Pin;
    use core::task::{Context, Poll};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Wake, Waker};

    /// A waker that counts how many times it was woken.
    #[derive(Clone)]
    pub struct CountingWaker {
        count: Arc<Counter>,
        waker: Waker,
    }

    struct Counter(AtomicUsize);

    impl Wake for Counter {
        fn wake(self: Arc<Self>) {
            self.wake_by_ref();
        }

        fn wake_by_ref(self: &Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingWaker {
        pub fn new() -> Self {
            let count = Arc::new(Counter(AtomicUsize::new(0)));
            let waker = Waker::from(Arc::clone(&count));
            Self { count, waker }
        }

        /// The number of wake-ups received so far.
        pub fn wakes(&self) -> usize {
            self.count.0.load(Ordering::SeqCst)
        }
    }

    /// Polls `future` exactly once with `waker`.
    pub fn poll_once<F: Future + ?Sized>(future: Pin<&mut F>, waker: &CountingWaker) -> Poll<F::Output> {
        let mut cx = Context::from_waker(&waker.waker);
        future.poll(&mut cx)
    }

    /// Installs a test-writer subscriber, once per test binary.
    pub fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init();
    }
}

#[cfg(all(not(loom), test))]
pub mod tests {
    use core::ops::RangeInclusive;
    use std::fmt::Debug;
    use std::format;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    use super::{get, inc, try_inc, Int};
    use super::{LockData, LockQueued, LockThen, TryLockThen};

    const THREADS: usize = 4;
    const ITERS: usize = 1000;
    const TOTAL: Int = (THREADS * ITERS) as Int;

    /// Counts how many times it was dropped.
    pub struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Runs `f` `ITERS` times on each of `THREADS` threads sharing one lock
    /// and returns the final value.
    fn contend<L>(f: fn(&Arc<L>)) -> Int
    where
        L: LockThen<Target = Int> + Send + Sync,
    {
        let mutex = Arc::new(L::new(0));
        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| (0..ITERS).for_each(|_| f(&mutex)));
            }
        });
        get(&mutex)
    }

    fn inc_and_try_inc<L>(mutex: &Arc<L>)
    where
        L: TryLockThen<Target = Int>,
    {
        inc(mutex);
        try_inc(mutex);
    }

    /// Waits until `mutex` has `len` queued waiters.
    fn wait_for_queue<L: LockQueued>(mutex: &L, len: usize) {
        while mutex.queued() < len {
            thread::yield_now();
        }
    }

    pub fn counts_every_locked_increment<L>()
    where
        L: LockThen<Target = Int> + Send + Sync,
    {
        assert_eq!(contend::<L>(inc), TOTAL);
    }

    pub fn try_lock_only_drops_increments<L>()
    where
        L: TryLockThen<Target = Int> + Send + Sync,
    {
        const EXPECTED: RangeInclusive<Int> = 1..=TOTAL;
        assert!(EXPECTED.contains(&contend::<L>(try_inc)));
    }

    pub fn mixed_increments<L>()
    where
        L: TryLockThen<Target = Int> + Send + Sync,
    {
        const EXPECTED: RangeInclusive<Int> = TOTAL..=2 * TOTAL;
        assert!(EXPECTED.contains(&contend::<L>(inc_and_try_inc)));
    }

    /// No two threads are ever inside the critical section together.
    pub fn sections_never_overlap<L>()
    where
        L: LockThen<Target = Int> + Send + Sync,
    {
        let mutex = L::new(0);
        let inside = AtomicBool::new(false);
        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    for _ in 0..ITERS {
                        mutex.lock_then(|data| {
                            assert!(!inside.swap(true, Ordering::Relaxed));
                            *data += 1;
                            inside.store(false, Ordering::Relaxed);
                        });
                    }
                });
            }
        });
        assert_eq!(mutex.lock_then(|data| *data), TOTAL);
    }

    /// Blocked threads are handed the lock in the order they queued.
    pub fn blocked_threads_acquire_in_arrival_order<L>()
    where
        L: LockThen<Target = Vec<usize>> + LockQueued + Send + Sync + 'static,
    {
        let mutex = Arc::new(L::new(Vec::new()));
        let handles: Vec<_> = mutex.lock_then(|_| {
            (0..THREADS)
                .map(|index| {
                    let c_mutex = Arc::clone(&mutex);
                    let handle = thread::spawn(move || c_mutex.lock_then(|order| order.push(index)));
                    wait_for_queue(&*mutex, index + 1);
                    handle
                })
                .collect()
        });
        for handle in handles {
            handle.join().unwrap();
        }
        let expected: Vec<_> = (0..THREADS).collect();
        mutex.lock_then(|order| assert_eq!(*order, expected));
    }

    /// A release with a queued thread passes ownership straight to it, so the
    /// lock is never observed free in between.
    pub fn release_hands_off_without_barging<L>()
    where
        L: TryLockThen<Target = Int> + LockQueued + Send + Sync + 'static,
    {
        let mutex = Arc::new(L::new(0));
        let (entered_tx, entered_rx) = channel();
        let (leave_tx, leave_rx) = channel::<()>();
        let waiter = mutex.lock_then(|_| {
            let c_mutex = Arc::clone(&mutex);
            let handle = thread::spawn(move || {
                c_mutex.lock_then(|data| {
                    *data += 1;
                    entered_tx.send(()).unwrap();
                    leave_rx.recv().unwrap();
                });
            });
            wait_for_queue(&*mutex, 1);
            handle
        });
        assert!(mutex.try_lock_then(|data| data.is_none()));
        entered_rx.recv().unwrap();
        assert!(mutex.is_locked());
        leave_tx.send(()).unwrap();
        waiter.join().unwrap();
        assert!(!mutex.is_locked());
        assert_eq!(get(&mutex), 1);
    }

    /// A panic inside the critical section still releases the lock.
    pub fn panic_releases_lock<L>()
    where
        L: TryLockThen<Target = Int>,
    {
        let mutex = L::new(0);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            mutex.lock_then(|data| {
                *data += 1;
                panic!("critical section failed");
            })
        }));
        assert!(result.is_err());
        assert!(!mutex.is_locked());
        assert_eq!(mutex.try_lock_then(|data| data.copied()), Some(1));
    }

    pub fn debug_hides_locked_data<L>()
    where
        L: LockThen<Target = Int> + Debug,
    {
        let mutex = L::new(7);
        assert_eq!(format!("{mutex:?}"), "Mutex { data: 7 }");
        let locked = mutex.lock_then(|_| format!("{mutex:?}"));
        assert_eq!(locked, "Mutex { data: <locked> }");
    }

    pub fn default_and_from<L>()
    where
        L: LockData<Target = Int> + Default + From<Int>,
    {
        assert_eq!(L::default().into_inner(), 0);
        assert_eq!(L::from(9).into_inner(), 9);
    }

    pub fn try_lock_fails_while_held<L>()
    where
        L: TryLockThen<Target = Int>,
    {
        let mutex = L::new(0);
        mutex.lock_then(|data| {
            *data = 3;
            assert!(mutex.is_locked());
            assert!(mutex.try_lock_then(|nested| nested.is_none()));
        });
        assert!(!mutex.is_locked());
        assert_eq!(mutex.try_lock_then(|data| data.copied()), Some(3));
    }

    /// Consuming the lock moves the value out without dropping it.
    pub fn into_inner_moves_value<L>()
    where
        L: LockData<Target = Tracked>,
    {
        let drops = Arc::new(AtomicUsize::new(0));
        let value = L::new(Tracked(Arc::clone(&drops))).into_inner();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(value);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    pub fn get_mut_skips_locking<L>()
    where
        L: LockData<Target = Vec<Int>>,
    {
        let mut mutex = L::new(Vec::new());
        mutex.get_mut().extend([1, 2]);
        mutex.get_mut().push(3);
        assert_eq!(mutex.into_inner(), [1, 2, 3]);
    }
}
