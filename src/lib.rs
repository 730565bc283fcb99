//! A fair, suspending mutual exclusion lock for asynchronous code.
//!
//! The lock is built from two pieces only: a single atomic word and an
//! intrusive queue of suspended waiters. It does not rely on any OS locking
//! primitive, never allocates, and works the same on multi-threaded runtimes
//! and on single-threaded cooperative executors. The main properties of this
//! lock are:
//!
//! - an uncontended acquisition or release is one compare-and-swap;
//! - contended acquisitions suspend the task instead of spinning;
//! - waiters are served strictly in FIFO order, and a release hands the lock
//!   directly to the next waiter, so late arrivals cannot barge in;
//! - a waiting task can be cancelled at any point, and a cancelled waiter never
//!   receives the lock nor blocks the ones behind it.
//!
//! ## Acquiring and cancelling
//!
//! [`Mutex::lock`] returns a future that resolves to an RAII [`MutexGuard`].
//! Rust futures are cancelled by dropping them, and so is this one: dropping a
//! pending [`Lock`] future removes its waiter from the queue. If the lock had
//! already been handed to it, the drop passes the lock on to the next waiter.
//! The outcome of such a race can also be observed explicitly with
//! [`Lock::cancel`], or by racing the acquisition against any signal future
//! with [`Mutex::lock_or_cancel`].
//!
//! Synchronous callers can join the very same queue with
//! [`Mutex::lock_blocking`], choosing how to wait with one of the strategies
//! in the [`relax`] module.
//!
//! ## Features
//!
//! This crate does not provide any default features. Features that can be
//! enabled are:
//!
//! ### yield
//!
//! The `yield` feature requires linking to the standard library, so it is not
//! suitable for `no_std` environments. It enables the [`relax::Yield`] and
//! [`relax::YieldBackoff`] strategies, which call [`std::thread::yield_now`]
//! while a blocked thread waits for its hand-off.
//!
//! ### lock_api
//!
//! This feature implements the [`RawMutex`] and [`RawMutexFair`] traits from
//! the [lock_api] crate for a blocking flavour of this lock, see the
//! [`lock_api`] module, which also provides type aliases for every relax
//! strategy. This feature is `no_std` compatible.
//!
//! ### tracing
//!
//! Emits [tracing] events at the `fairmutex` target for contended enqueues,
//! hand-offs, cancelled waiters and illegal unlocks. This feature is `no_std`
//! compatible.
//!
//! [`std::thread::yield_now`]: https://doc.rust-lang.org/std/thread/fn.yield_now.html
//! [lock_api]: https://docs.rs/lock_api/latest/lock_api
//! [tracing]: https://docs.rs/tracing/latest/tracing
//! [`RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html
//! [`RawMutexFair`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutexFair.html

#![cfg_attr(all(not(feature = "yield"), not(test)), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::inline_always)]
#![warn(missing_docs)]

mod error;
mod mutex;
mod queue;
mod state;

pub mod raw;
pub mod relax;

pub use error::{Cancelled, IllegalUse};
pub use mutex::{Lock, Mutex, MutexGuard};
pub use raw::{CancelOutcome, LockState};

#[cfg(all(feature = "lock_api", not(loom)))]
#[cfg_attr(docsrs, doc(cfg(feature = "lock_api")))]
pub mod lock_api;

pub(crate) mod cfg;

#[cfg(test)]
pub(crate) mod test;

#[cfg(all(loom, test))]
#[cfg(not(tarpaulin))]
pub(crate) mod loom;
