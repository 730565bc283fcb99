use core::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::vec::Vec;

use fairmutex::relax::Spin;
use fairmutex::{Cancelled, LockState, Mutex, MutexGuard};
use futures_lite::future::{self, block_on, poll_once};

#[test]
fn release_hands_off_to_suspended_task() {
    let mutex = Mutex::new(0);
    {
        let mut owner = mutex.try_lock().unwrap();
        let mut waiter = pin!(mutex.lock());
        assert!(block_on(poll_once(waiter.as_mut())).is_none());
        assert_eq!(mutex.state(), LockState::HeldWithWaiters);

        *owner += 1;
        drop(owner);
        // The lock never went free between the two owners.
        assert_eq!(mutex.state(), LockState::Held);
        assert!(mutex.try_lock().is_none());

        let mut guard = block_on(waiter.as_mut());
        *guard += 1;
    }
    assert_eq!(mutex.state(), LockState::Free);
    assert_eq!(mutex.into_inner(), 2);
}

#[test]
fn cancelled_waiter_is_skipped() {
    let mutex = Mutex::new(Vec::new());
    {
        let owner = mutex.try_lock().unwrap();
        let mut a = pin!(mutex.lock());
        let mut b = pin!(mutex.lock());
        let mut c = pin!(mutex.lock());
        assert!(block_on(poll_once(a.as_mut())).is_none());
        assert!(block_on(poll_once(b.as_mut())).is_none());
        assert!(block_on(poll_once(c.as_mut())).is_none());

        assert_eq!(a.as_mut().cancel().err(), Some(Cancelled));
        drop(owner);

        let mut guard = block_on(poll_once(b.as_mut())).expect("b is next in line");
        guard.push('b');
        assert!(block_on(poll_once(c.as_mut())).is_none());
        drop(guard);

        let mut guard = block_on(c.as_mut());
        guard.push('c');
        drop(guard);
    }
    assert_eq!(mutex.into_inner(), ['b', 'c']);
}

#[test]
fn try_lock_succeeds_once() {
    let mutex = Mutex::new(());
    let guard = mutex.try_lock();
    assert!(guard.is_some());
    assert!(mutex.try_lock().is_none());
    drop(guard);
    assert!(mutex.try_lock().is_some());
}

#[test]
fn failed_action_releases_lock() {
    let mutex = Mutex::new(0);
    let result: Result<(), &str> = block_on(mutex.with_lock(|mut guard| async move {
        *guard = 5;
        future::yield_now().await;
        Err("boom")
    }));
    assert_eq!(result, Err("boom"));
    assert_eq!(mutex.state(), LockState::Free);
    assert_eq!(*mutex.try_lock().unwrap(), 5);
}

#[test]
fn cancel_before_release_leaves_lock_free() {
    let mutex = Mutex::new(0);
    let owner = mutex.try_lock().unwrap();
    let mut waiter = pin!(mutex.lock());
    assert!(block_on(poll_once(waiter.as_mut())).is_none());

    assert!(waiter.as_mut().cancel().is_err());
    drop(owner);
    assert_eq!(mutex.state(), LockState::Free);
}

#[test]
fn cancel_after_release_returns_guard() {
    let mutex = Mutex::new(0);
    let owner = mutex.try_lock().unwrap();
    let mut waiter = pin!(mutex.lock());
    assert!(block_on(poll_once(waiter.as_mut())).is_none());

    drop(owner);
    let guard = waiter.as_mut().cancel().expect("hand-off came first");
    assert_eq!(mutex.state(), LockState::Held);
    drop(guard);
    assert_eq!(mutex.state(), LockState::Free);
}

#[test]
fn dropped_waiter_passes_granted_lock_on() {
    let mutex = Mutex::new(0);
    let owner = mutex.try_lock().unwrap();
    let mut first = Box::pin(mutex.lock());
    let mut second = pin!(mutex.lock());
    assert!(block_on(poll_once(first.as_mut())).is_none());
    assert!(block_on(poll_once(second.as_mut())).is_none());

    drop(owner);
    drop(first);
    assert!(block_on(poll_once(second.as_mut())).is_some());
    assert_eq!(mutex.state(), LockState::Free);
}

#[test]
fn lock_or_cancel_reports_signal() {
    let mutex = Mutex::new(0);
    let owner = mutex.try_lock().unwrap();
    let result = block_on(mutex.lock_or_cancel(future::ready(())));
    assert_eq!(result.err(), Some(Cancelled));
    drop(owner);
    assert_eq!(mutex.state(), LockState::Free);

    let guard = block_on(mutex.lock_or_cancel(future::pending()));
    assert!(guard.is_ok());
}

#[test]
fn waiters_are_served_in_arrival_order() {
    const WAITERS: usize = 16;
    let mutex = Mutex::new(Vec::new());
    {
        let owner = mutex.try_lock().unwrap();
        let mut waiters: Vec<_> = (0..WAITERS).map(|_| Box::pin(mutex.lock())).collect();
        for waiter in &mut waiters {
            assert!(block_on(poll_once(waiter.as_mut())).is_none());
        }
        drop(owner);

        for (index, waiter) in waiters.iter_mut().enumerate() {
            let mut guard = block_on(poll_once(waiter.as_mut())).expect("waiter was granted");
            guard.push(index);
        }
    }
    let order = mutex.into_inner();
    assert_eq!(order, (0..WAITERS).collect::<Vec<_>>());
}

#[test]
fn tasks_and_threads_share_the_queue() {
    const THREADS: usize = 4;
    const ITERS: usize = 500;
    let mutex = Arc::new(Mutex::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|run| {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                for _ in 0..ITERS {
                    if run % 2 == 0 {
                        block_on(mutex.lock_then(|data| *data += 1));
                    } else {
                        *mutex.lock_blocking::<Spin>() += 1;
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(block_on(mutex.lock_then(|data| *data)), THREADS * ITERS);
    assert_eq!(mutex.state(), LockState::Free);
}

#[test]
fn cancellation_storm_keeps_exclusion() {
    const THREADS: usize = 8;
    const ITERS: usize = 2000;
    let mutex = Mutex::new(0_usize);
    let inside = AtomicBool::new(false);
    let enter = |guard: MutexGuard<'_, usize>| {
        let mut guard = guard;
        assert!(!inside.swap(true, Ordering::Relaxed));
        *guard += 1;
        inside.store(false, Ordering::Relaxed);
    };
    thread::scope(|scope| {
        for run in 0..THREADS {
            let (mutex, enter) = (&mutex, &enter);
            scope.spawn(move || {
                for iter in 0..ITERS {
                    match (run + iter) % 3 {
                        0 => enter(block_on(mutex.lock())),
                        1 => {
                            if let Ok(guard) = block_on(mutex.lock_or_cancel(future::yield_now())) {
                                enter(guard);
                            }
                        }
                        _ => {
                            if let Some(guard) = block_on(poll_once(mutex.lock())) {
                                enter(guard);
                            }
                        }
                    }
                }
            });
        }
    });
    assert_eq!(mutex.state(), LockState::Free);
    // Plain acquisitions always count.
    assert!(mutex.into_inner() >= THREADS * (ITERS / 3));
}
