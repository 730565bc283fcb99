// Modified version of relax.rs from spin-rs to support Loom yielding and
// exponential backoff.
//
// Original file at its most recent change (at the time of writing):
// https://github.com/mvdnes/spin-rs/blob/5860ee114094cf200b97348ff332155fbd7159b4/src/relax.rs
//
// Copyright (c) 2014 Mathijs van de Nes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Strategies for waiting without an executor.
//!
//! Asynchronous acquisitions never spin: a contended [`lock`] future parks
//! its task and is woken by the hand-off. Threads that have no executor to
//! park on use [`lock_blocking`] instead, which joins the very same FIFO
//! queue and then waits for the hand-off with one of the strategies below.
//!
//! [`lock`]: crate::Mutex::lock
//! [`lock_blocking`]: crate::Mutex::lock_blocking

use crate::cfg::hint;

/// A trait implemented by relax strategies.
pub trait Relax {
    /// Initialize the state for the relaxing operation, if any.
    fn new() -> Self;

    /// Perform the relaxing operation while the hand-off is still pending.
    fn relax(&mut self);
}

/// A strategy that rapidly spins while informing the CPU that it should power
/// down non-essential components via [`core::hint::spin_loop`].
///
/// A blocked thread that spins competes for CPU time with the owner it is
/// waiting on, which can delay the very release it needs. Prefer [`Yield`] or
/// [`YieldBackoff`] when the standard library is available and critical
/// sections are not extremely short.
pub struct Spin;

impl Relax for Spin {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {
        hint::spin_loop();
    }
}

/// A strategy that yields the current time slice to the scheduler in favour of
/// other threads or processes.
#[cfg(any(feature = "yield", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "yield")))]
pub struct Yield;

#[cfg(any(feature = "yield", test))]
impl Relax for Yield {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline]
    fn relax(&mut self) {
        crate::cfg::thread::yield_now();
    }
}

/// A strategy that rapidly spins, without telling the CPU to do any powering
/// down.
///
/// Use [`Spin`] instead unless the target miscompiles spin hint intrinsics.
pub struct Loop;

impl Relax for Loop {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {}
}

// Exponential backoff is based on the crossbeam-utils implementation.
// link to most recent change (as the time of writing):
// https://github.com/crossbeam-rs/crossbeam/blob/371de8c2d304db07662450995848f3dc9598ac99/crossbeam-utils/src/backoff.rs
//
// Copyright (c) 2019 The Crossbeam Project Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

/// A strategy that, as [`Spin`], runs a busy-wait spin-loop, doubling the
/// number of spin hints on every step up to a fixed limit.
///
/// This is also the strategy the mutex itself uses while another party owns
/// the waiter queue for its short, constant-time update.
pub struct SpinBackoff {
    step: Step,
}

impl SpinBackoff {
    const SPIN_LIMIT: u32 = 6;
}

impl Relax for SpinBackoff {
    #[inline(always)]
    fn new() -> Self {
        Self { step: Step(0) }
    }

    #[inline(always)]
    fn relax(&mut self) {
        self.step.spin_to(Self::SPIN_LIMIT);
        self.step.step_to(Self::SPIN_LIMIT);
    }
}

/// A strategy that, as [`Yield`], yields back to the OS scheduler, but only
/// after a bounded exponential backoff in a spin loop.
#[cfg(feature = "yield")]
#[cfg_attr(docsrs, doc(cfg(feature = "yield")))]
pub struct YieldBackoff {
    step: Step,
}

#[cfg(feature = "yield")]
impl YieldBackoff {
    const SPIN_LIMIT: u32 = SpinBackoff::SPIN_LIMIT;
    const YIELD_LIMIT: u32 = 10;
}

#[cfg(feature = "yield")]
impl Relax for YieldBackoff {
    #[inline(always)]
    fn new() -> Self {
        Self { step: Step(0) }
    }

    #[inline(always)]
    fn relax(&mut self) {
        if self.step.0 <= Self::SPIN_LIMIT {
            self.step.spin_to(Self::SPIN_LIMIT);
        } else {
            crate::cfg::thread::yield_now();
        }
        self.step.step_to(Self::YIELD_LIMIT);
    }
}

/// Keeps count of the number of steps taken.
struct Step(u32);

impl Step {
    /// Bounded backoff spinning.
    fn spin_to(&self, max: u32) {
        for _ in 0..1 << self.0.min(max) {
            hint::spin_loop();
        }
    }

    /// Bounded step increment.
    fn step_to(&mut self, end: u32) {
        if self.0 <= end {
            self.0 += 1;
        }
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{Loop, Relax, Spin, SpinBackoff, Step};

    #[test]
    fn step_saturates_past_limit() {
        let mut step = Step(0);
        for _ in 0..20 {
            step.step_to(SpinBackoff::SPIN_LIMIT);
        }
        assert_eq!(step.0, SpinBackoff::SPIN_LIMIT + 1);
    }

    #[test]
    fn strategies_relax_without_state() {
        Spin::new().relax();
        Loop::new().relax();
        let mut backoff = SpinBackoff::new();
        for _ in 0..10 {
            backoff.relax();
        }
        assert_eq!(backoff.step.0, SpinBackoff::SPIN_LIMIT + 1);
    }
}
