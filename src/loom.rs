pub mod models {
    use core::array;
    use core::future::Future;
    use core::pin::pin;
    use core::task::Context;

    use loom::sync::Arc;
    use loom::{model, thread};

    use crate::raw::{noop_waker, CancelOutcome, LockState, RawMutex};
    use crate::test::{get, inc, try_inc, Int};
    use crate::test::{LockThen, TryLockThen};

    /// Get a copy of the shared integer, converting it to usize.
    ///
    /// Panics if the cast fails.
    fn get_unwrap<L>(lock: &Arc<L>) -> usize
    where
        L: LockThen<Target = Int>,
    {
        get(lock).try_into().unwrap()
    }

    // TODO: Three or more threads make lock models run for too long. It would
    // be nice to run a lock model with at least three threads because that
    // would cover a queue with a hand-off to a waiter that is not the tail.
    const LOCKS: usize = 2;
    const TRY_LOCKS: usize = 3;

    /// Evaluates that concurrent `try_lock` calls will serialize all mutations
    /// against the shared data, therefore no data races.
    pub fn try_lock_join<L>()
    where
        L: TryLockThen<Target = Int> + 'static,
    {
        model(|| {
            const RUNS: usize = TRY_LOCKS;
            let lock = Arc::new(L::new(0));
            let handles: [_; RUNS] = array::from_fn(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || try_inc(&lock))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&lock);
            assert!((1..=RUNS).contains(&value));
        });
    }

    /// Evaluates that concurrent `lock` calls will serialize all mutations
    /// against the shared data, therefore no data races.
    pub fn lock_join<L>()
    where
        L: LockThen<Target = Int> + 'static,
    {
        model(|| {
            const RUNS: usize = LOCKS;
            let lock = Arc::new(L::new(0));
            let handles: [_; RUNS] = array::from_fn(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || inc(&lock))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&lock);
            assert_eq!(RUNS, value);
        });
    }

    /// Evaluates that concurrent `lock` and `try_lock` calls will serialize
    /// all mutations against the shared data, therefore no data races.
    pub fn mixed_lock_join<L>()
    where
        L: TryLockThen<Target = Int> + 'static,
    {
        model(|| {
            const RUNS: usize = LOCKS;
            let lock = Arc::new(L::new(0));
            let handles: [_; RUNS] = array::from_fn(|run| {
                let lock = Arc::clone(&lock);
                let f = if run % 2 == 0 { inc } else { try_inc };
                thread::spawn(move || f(&lock))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&lock);
            assert!((1..=RUNS).contains(&value));
        });
    }

    /// Evaluates that a cancellation racing the owner's release settles on
    /// exactly one outcome, and that the lock ends up free either way.
    pub fn cancel_races_hand_off() {
        model(|| {
            let mutex = Arc::new(RawMutex::new());
            assert!(mutex.try_lock());
            let waker = noop_waker();
            let mut cx = Context::from_waker(&waker);
            let mut acquire = pin!(mutex.lock());
            assert!(acquire.as_mut().poll(&mut cx).is_pending());

            let owner = {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || mutex.unlock().unwrap())
            };
            if acquire.as_mut().cancel() == CancelOutcome::Acquired {
                mutex.unlock().unwrap();
            }
            owner.join().unwrap();
            assert_eq!(mutex.state(), LockState::Free);
        });
    }

    /// Evaluates that dropping a queued acquisition while the owner releases
    /// never strands the lock.
    pub fn drop_races_hand_off() {
        model(|| {
            let mutex = Arc::new(RawMutex::new());
            assert!(mutex.try_lock());
            let waker = noop_waker();
            let mut cx = Context::from_waker(&waker);
            let mut acquire = Box::pin(mutex.lock());
            assert!(acquire.as_mut().poll(&mut cx).is_pending());

            let owner = {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || mutex.unlock().unwrap())
            };
            drop(acquire);
            owner.join().unwrap();
            assert_eq!(mutex.state(), LockState::Free);
        });
    }
}
