//! Lock domains for the paging subsystem
//!
//! Two exclusions exist: one around the residency tracker and one around the
//! backing store. They are never held at the same time, so no order between
//! them can deadlock. With std available (host tests), every acquisition
//! checks that rule for the current thread and panics on a violation.

use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

/// The two independently locked parts of the subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDomain {
    /// Residency tracker list structure
    Tracker,
    /// Backing-store partitions
    Store,
}

impl LockDomain {
    const fn bit(self) -> u8 {
        match self {
            Self::Tracker => 0b01,
            Self::Store => 0b10,
        }
    }
}

/// A spin lock tagged with the domain it belongs to
pub struct DomainLock<T> {
    domain: LockDomain,
    inner: Mutex<T>,
}

impl<T> DomainLock<T> {
    /// Wraps `value` in a lock of the given domain
    pub const fn new(domain: LockDomain, value: T) -> Self {
        Self {
            domain,
            inner: Mutex::new(value),
        }
    }

    /// Acquires the lock
    pub fn lock(&self) -> DomainGuard<'_, T> {
        order::acquire(self.domain);
        DomainGuard {
            domain: self.domain,
            guard: self.inner.lock(),
        }
    }

    /// The domain this lock belongs to
    pub fn domain(&self) -> LockDomain {
        self.domain
    }
}

/// Scoped access to a [`DomainLock`]
pub struct DomainGuard<'a, T> {
    domain: LockDomain,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for DomainGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for DomainGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for DomainGuard<'_, T> {
    fn drop(&mut self) {
        order::release(self.domain);
    }
}

#[cfg(any(test, feature = "std"))]
mod order {
    extern crate std;

    use std::cell::Cell;

    use super::LockDomain;

    std::thread_local! {
        static HELD: Cell<u8> = const { Cell::new(0) };
    }

    pub(super) fn acquire(domain: LockDomain) {
        HELD.with(|held| {
            let current = held.get();
            assert!(
                current & domain.bit() == 0,
                "paging lock domain {:?} acquired recursively",
                domain
            );
            assert!(
                current == 0,
                "paging lock domain {:?} acquired while another domain is held",
                domain
            );
            held.set(current | domain.bit());
        });
    }

    pub(super) fn release(domain: LockDomain) {
        HELD.with(|held| held.set(held.get() & !domain.bit()));
    }
}

#[cfg(not(any(test, feature = "std")))]
mod order {
    use super::LockDomain;

    #[inline(always)]
    pub(super) fn acquire(_domain: LockDomain) {}

    #[inline(always)]
    pub(super) fn release(_domain: LockDomain) {}
}
