//! Reference-counted heap handles.
//!
//! The host engine reclaims objects by reference counting; `GcRef` is the
//! strong handle used everywhere script values are shared. Handles may be
//! cloned on any thread, but the pointee may only be *used* while the
//! owning isolate's lock is held.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Strong reference to an engine-managed allocation.
pub struct GcRef<T: ?Sized>(Arc<T>);

impl<T> GcRef<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Identity comparison (same allocation, not structural equality).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(this: &Self) -> WeakRef<T> {
        WeakRef(Arc::downgrade(&this.0))
    }

    /// Number of live strong handles, used by reclamation tests.
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.0)
    }
}

impl<T: ?Sized> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for GcRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Weak counterpart of [`GcRef`].
pub struct WeakRef<T: ?Sized>(Weak<T>);

impl<T> WeakRef<T> {
    pub fn upgrade(&self) -> Option<GcRef<T>> {
        self.0.upgrade().map(GcRef)
    }
}

impl<T: ?Sized> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
