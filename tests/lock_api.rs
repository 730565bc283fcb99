use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;

use fairmutex::lock_api::{loops, spins, spins_backoff};
use fairmutex::relax::Relax;
use fairmutex::LockState;

type Mutex<T, R> = fairmutex::lock_api::Mutex<T, R>;

/// Waits until a thread has joined the queue of `mutex`.
fn wait_for_waiter<T, R: Relax>(mutex: &Mutex<T, R>) {
    // SAFETY: The raw lock is only inspected, never unlocked.
    while unsafe { mutex.raw() }.state() != LockState::HeldWithWaiters {
        thread::yield_now();
    }
}

fn contend<R: Relax>() {
    const THREADS: u32 = 4;
    const ITERS: u32 = 500;
    let mutex = Mutex::<u32, R>::new(0);
    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| (0..ITERS).for_each(|_| *mutex.lock() += 1));
        }
    });
    assert_eq!(mutex.into_inner(), THREADS * ITERS);
}

#[test]
fn every_relax_strategy_serializes() {
    contend::<fairmutex::relax::Spin>();
    contend::<fairmutex::relax::Loop>();
    contend::<fairmutex::relax::SpinBackoff>();
}

#[test]
fn static_mutex_starts_unlocked() {
    static COUNTER: spins::Mutex<u64> = spins::Mutex::new(0);
    assert!(!COUNTER.is_locked());
    *COUNTER.lock() += 2;
    assert_eq!(*COUNTER.try_lock().unwrap(), 2);
}

#[test]
fn unlock_fair_keeps_lock_for_blocked_thread() {
    let mutex = Arc::new(spins::Mutex::new(0));
    let guard = mutex.lock();
    let (entered_tx, entered_rx) = channel();
    let (leave_tx, leave_rx) = channel::<()>();
    let waiter = {
        let mutex = Arc::clone(&mutex);
        thread::spawn(move || {
            let mut guard = mutex.lock();
            *guard += 1;
            entered_tx.send(()).unwrap();
            leave_rx.recv().unwrap();
        })
    };
    wait_for_waiter(&*mutex);
    spins::MutexGuard::unlock_fair(guard);
    // Ownership moved to the queued thread, so the lock never went free.
    assert!(mutex.try_lock().is_none());
    entered_rx.recv().unwrap();
    leave_tx.send(()).unwrap();
    waiter.join().unwrap();
    assert_eq!(*mutex.lock(), 1);
}

#[test]
fn unlocked_scope_lets_queued_thread_in() {
    let mutex = Arc::new(spins_backoff::Mutex::new(Vec::new()));
    let mut guard = mutex.lock();
    guard.push("owner");
    let (done_tx, done_rx) = channel();
    let waiter = {
        let mutex = Arc::clone(&mutex);
        thread::spawn(move || {
            mutex.lock().push("waiter");
            done_tx.send(()).unwrap();
        })
    };
    wait_for_waiter(&*mutex);
    spins_backoff::MutexGuard::unlocked(&mut guard, || done_rx.recv().unwrap());
    guard.push("owner again");
    drop(guard);
    waiter.join().unwrap();
    assert_eq!(*mutex.lock(), ["owner", "waiter", "owner again"]);
}

#[test]
fn panicking_owner_hands_off() {
    let mutex = Arc::new(loops::Mutex::new(0));
    let (locked_tx, locked_rx) = channel();
    let owner = {
        let mutex = Arc::clone(&mutex);
        thread::spawn(move || {
            let _guard = mutex.lock();
            locked_tx.send(()).unwrap();
            while unsafe { mutex.raw() }.state() != LockState::HeldWithWaiters {
                thread::yield_now();
            }
            panic!("owner failed");
        })
    };
    locked_rx.recv().unwrap();
    *mutex.lock() += 1;
    assert!(owner.join().is_err());
    assert!(!mutex.is_locked());
    assert_eq!(*mutex.lock(), 1);
}

#[test]
fn unsized_data_behind_guard() {
    let mutex: &spins::Mutex<[u8]> = &spins::Mutex::new([1, 2, 3]);
    mutex.lock().reverse();
    assert_eq!(&*mutex.lock(), [3, 2, 1]);
}
