use crate::IrqGuard;
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// Interrupt-masking lock for state shared between the main line and ISRs.
///
/// Acquiring masks interrupts first and then claims the lock. On a single CPU
/// the lock can only be found held when an interrupt handler re-entered code
/// that the main line was in the middle of; spinning there would never make
/// progress, so [`try_lock`](Self::try_lock) fails instead and the caller
/// decides (drop the log record, report the allocation as failed).
pub struct IrqLock<T> {
    /// * `false`: free
    /// * `true`: held
    busy: AtomicBool,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion via `busy`; only T: Send may cross contexts.
unsafe impl<T: Send> Sync for IrqLock<T> {}

impl<T> IrqLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            busy: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Masks interrupts and claims the lock, or returns `None` on re-entrance.
    ///
    /// The interrupt state is restored before returning `None`.
    #[inline]
    pub fn try_lock(&self) -> Option<IrqLockGuard<'_, T>> {
        let irq = IrqGuard::new();
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqLockGuard { lock: self, _irq: irq })
        } else {
            None
        }
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut g = self.try_lock()?;
        Some(f(&mut g))
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Holds the lock and the interrupt mask. Dropping releases the lock, then
/// restores interrupts.
pub struct IrqLockGuard<'a, T> {
    lock: &'a IrqLock<T>,
    _irq: IrqGuard,
}

impl<T> Deref for IrqLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for IrqLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for IrqLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release publishes the critical section; `_irq` drops afterwards.
        self.lock.busy.store(false, Ordering::Release);
    }
}
