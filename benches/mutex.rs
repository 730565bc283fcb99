use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};
use fairmutex::relax::Spin;
use fairmutex::Mutex;
use futures_lite::future::block_on;

fn gen_create(bencher: &mut Bencher) {
    bencher.iter(|| {
        let value = black_box(0);
        Mutex::new(value)
    });
}

fn gen_try_lock_unlock(bencher: &mut Bencher) {
    let mutex = Mutex::new(0_u32);

    bencher.iter(|| {
        if let Some(mut guard) = mutex.try_lock() {
            *guard = guard.wrapping_add(1);
        }
    });
}

fn gen_lock_unlock(bencher: &mut Bencher) {
    let mutex = Mutex::new(0_u32);

    bencher.iter(|| {
        let mut guard = block_on(mutex.lock());
        *guard = guard.wrapping_add(1);
        drop(guard);
    });
}

fn gen_lock_unlock_read_contention(bencher: &mut Bencher) {
    let data = Arc::new(Mutex::new(0_u32));

    let thread = thread::spawn({
        let data = Arc::clone(&data);
        move || {
            while Arc::strong_count(&data) > 1 {
                for _ in 0..1000 {
                    black_box(*data.lock_blocking::<Spin>());
                }
            }
        }
    });

    bencher.iter(|| {
        let mut data = block_on(data.lock());
        *data = data.wrapping_add(1);
        drop(data);
    });

    drop(data);
    thread.join().unwrap();
}

fn gen_lock_unlock_write_contention(bencher: &mut Bencher) {
    let data = Arc::new(Mutex::new(0_u32));

    let thread = thread::spawn({
        let data = Arc::clone(&data);
        move || {
            while Arc::strong_count(&data) > 1 {
                for _ in 0..1000 {
                    let mut m = data.lock_blocking::<Spin>();
                    *m = m.wrapping_add(1);
                    drop(m);
                }
            }
        }
    });

    bencher.iter(|| {
        let mut m = block_on(data.lock());
        *m = m.wrapping_add(1);
        drop(m);
    });

    drop(data);
    thread.join().unwrap();
}

fn create(criterion: &mut Criterion) {
    criterion.bench_function("create", |bench| gen_create(bench));
}

fn try_lock_unlock(criterion: &mut Criterion) {
    criterion.bench_function("try_lock_unlock", |bench| gen_try_lock_unlock(bench));
}

fn lock_unlock(criterion: &mut Criterion) {
    criterion.bench_function("lock_unlock", |bench| gen_lock_unlock(bench));
}

fn lock_unlock_read_contention(criterion: &mut Criterion) {
    criterion.bench_function("lock_unlock_read_contention", |bench| {
        gen_lock_unlock_read_contention(bench)
    });
}

fn lock_unlock_write_contention(criterion: &mut Criterion) {
    criterion.bench_function("lock_unlock_write_contention", |bench| {
        gen_lock_unlock_write_contention(bench)
    });
}

criterion_group!(
    mutex,
    create,
    try_lock_unlock,
    lock_unlock,
    lock_unlock_read_contention,
    lock_unlock_write_contention,
);

criterion_main!(mutex);
