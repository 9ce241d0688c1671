//! Per-thread re-entrancy guard.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    /// Whether this thread is currently inside a tracer operation.
    static IN_TRACER: Cell<bool> = const { Cell::new(false) };
}

/// RAII marker that the current thread is inside the tracer.
///
/// The tracker's own bookkeeping can allocate. If the host routes that
/// allocation through an instrumented allocator, the resulting notification
/// comes back on the same thread while the tracer lock is held; the guard
/// turns that into a dropped event instead of a deadlock.
pub(crate) struct ReentrancyGuard {
    // Must be released on the thread that acquired it.
    _not_send: PhantomData<*const ()>,
}

impl ReentrancyGuard {
    /// Enter the tracer, or `None` if this thread is already inside it.
    ///
    /// Also `None` while the thread's locals are being torn down.
    pub(crate) fn enter() -> Option<Self> {
        IN_TRACER
            .try_with(|inside| {
                if inside.get() {
                    None
                } else {
                    inside.set(true);
                    Some(Self {
                        _not_send: PhantomData,
                    })
                }
            })
            .ok()
            .flatten()
    }

    #[cfg(test)]
    fn is_active() -> bool {
        IN_TRACER.try_with(Cell::get).unwrap_or(true)
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        let _ = IN_TRACER.try_with(|inside| inside.set(false));
    }
}
