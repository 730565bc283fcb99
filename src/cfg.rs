pub mod atomic {
    #[cfg(not(all(loom, test)))]
    pub use core::sync::atomic::AtomicUsize;

    #[cfg(all(loom, test))]
    pub use loom::sync::atomic::AtomicUsize;
}

pub mod cell {
    pub use sealed::UnsafeCellWith;

    #[cfg(not(all(loom, test)))]
    pub use core::cell::UnsafeCell;

    #[cfg(all(loom, test))]
    pub use loom::cell::UnsafeCell;

    #[cfg(not(all(loom, test)))]
    impl<T: ?Sized> UnsafeCellWith<T> for UnsafeCell<T> {
        unsafe fn with_unchecked<F, Ret>(&self, f: F) -> Ret
        where
            F: FnOnce(&T) -> Ret,
        {
            // SAFETY: Caller must guarantee there are no mutable aliases.
            f(unsafe { &*self.get() })
        }

        unsafe fn with_mut_unchecked<F, Ret>(&self, f: F) -> Ret
        where
            F: FnOnce(&mut T) -> Ret,
        {
            // SAFETY: Caller must guarantee there are no aliases at all.
            f(unsafe { &mut *self.get() })
        }
    }

    #[cfg(all(loom, test))]
    impl<T: ?Sized> UnsafeCellWith<T> for UnsafeCell<T> {
        unsafe fn with_unchecked<F, Ret>(&self, f: F) -> Ret
        where
            F: FnOnce(&T) -> Ret,
        {
            // SAFETY: Caller must guarantee there are no mutable aliases.
            self.with(|ptr| f(unsafe { &*ptr }))
        }

        unsafe fn with_mut_unchecked<F, Ret>(&self, f: F) -> Ret
        where
            F: FnOnce(&mut T) -> Ret,
        {
            // SAFETY: Caller must guarantee there are no aliases at all.
            self.with_mut(|ptr| f(unsafe { &mut *ptr }))
        }
    }

    mod sealed {
        /// A trait that extends [`UnsafeCell`] to allow running closures against
        /// its underlying data, so the same code runs against core's and Loom's
        /// cells.
        ///
        /// [`UnsafeCell`]: super::UnsafeCell
        pub trait UnsafeCellWith<T: ?Sized> {
            /// Runs `f` against a shared reference borrowed from the cell.
            ///
            /// # Safety
            ///
            /// Caller must guarantee there are no mutable aliases to the
            /// underlying data.
            unsafe fn with_unchecked<F, Ret>(&self, f: F) -> Ret
            where
                F: FnOnce(&T) -> Ret;

            /// Runs `f` against a mutable reference borrowed from the cell.
            ///
            /// # Safety
            ///
            /// Caller must guarantee there are no other references to the
            /// underlying data, mutable or not.
            unsafe fn with_mut_unchecked<F, Ret>(&self, f: F) -> Ret
            where
                F: FnOnce(&mut T) -> Ret;
        }
    }
}

#[cfg(test)]
pub mod sync {
    #[cfg(not(loom))]
    pub use std::sync::Arc;

    #[cfg(loom)]
    pub use loom::sync::Arc;
}

pub mod hint {
    #[cfg(not(all(loom, test)))]
    pub use core::hint::spin_loop;

    #[cfg(all(loom, test))]
    pub use loom::hint::spin_loop;
}

#[cfg(any(feature = "yield", test))]
pub mod thread {
    #[cfg(not(all(loom, test)))]
    pub use std::thread::yield_now;

    #[cfg(all(loom, test))]
    pub use loom::thread::yield_now;
}

/// Structured events, forwarded to `tracing` when the `tracing` feature is
/// enabled and compiled out otherwise.
///
/// Events take a message literal followed by `name = value` fields. The
/// disabled variants still evaluate to a borrow of every field value so the
/// call sites do not trip unused warnings.
pub mod log {
    #[cfg(feature = "tracing")]
    macro_rules! trace {
        ($msg:literal $(, $field:ident = $value:expr)* $(,)?) => {
            ::tracing::trace!(target: "fairmutex", $($field = $value,)* $msg)
        };
    }

    #[cfg(not(feature = "tracing"))]
    macro_rules! trace {
        ($msg:literal $(, $field:ident = $value:expr)* $(,)?) => {{
            $(let _ = &$value;)*
        }};
    }

    #[cfg(feature = "tracing")]
    macro_rules! debug {
        ($msg:literal $(, $field:ident = $value:expr)* $(,)?) => {
            ::tracing::debug!(target: "fairmutex", $($field = $value,)* $msg)
        };
    }

    #[cfg(not(feature = "tracing"))]
    macro_rules! debug {
        ($msg:literal $(, $field:ident = $value:expr)* $(,)?) => {{
            $(let _ = &$value;)*
        }};
    }

    #[cfg(feature = "tracing")]
    macro_rules! warning {
        ($msg:literal $(, $field:ident = $value:expr)* $(,)?) => {
            ::tracing::warn!(target: "fairmutex", $($field = $value,)* $msg)
        };
    }

    #[cfg(not(feature = "tracing"))]
    macro_rules! warning {
        ($msg:literal $(, $field:ident = $value:expr)* $(,)?) => {{
            $(let _ = &$value;)*
        }};
    }

    pub(crate) use {debug, trace, warning};
}
