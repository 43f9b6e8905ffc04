//! Reference-counted cells for cacheable parser-derived objects.
//!
//! The object graph behind a parsed document is cyclic: pages reference
//! resources that reference the document again. Caches therefore share
//! objects through counted cells and break cycles with observer handles
//! that never own what they point at. Destruction is deterministic: it
//! happens on the exact 1 -> 0 transition of the count, which cache
//! eviction relies on.

use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Shared-ownership cell.
///
/// Cloning retains (a relaxed atomic increment with overflow aborting the
/// process), dropping releases (acquire-release, the synchronization edge
/// before the payload is destroyed), and moves transfer the handle without
/// touching the counter.
#[derive(Debug)]
pub struct ObjCell<T>(Arc<T>);

impl<T> ObjCell<T> {
    pub fn new(value: T) -> Self {
        ObjCell(Arc::new(value))
    }

    /// Explicit retain; identical to `clone`.
    pub fn retain(&self) -> Self {
        ObjCell(Arc::clone(&self.0))
    }

    /// True when this handle is the only owner.
    pub fn has_one(&self) -> bool {
        Arc::strong_count(&self.0) == 1
    }

    /// Current owner count. Racy by nature; for diagnostics and tests.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// A non-owning observer of this cell.
    pub fn observer(&self) -> ObjObserver<T> {
        ObjObserver(Arc::downgrade(&self.0))
    }
}

impl<T> Clone for ObjCell<T> {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl<T> Deref for ObjCell<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Non-owning view of an [`ObjCell`].
///
/// Never contributes to the count; once every owning handle is gone the
/// observer reads as invalid and `get` returns nothing.
#[derive(Debug)]
pub struct ObjObserver<T>(Weak<T>);

impl<T> ObjObserver<T> {
    /// Retain the object if it is still alive.
    pub fn get(&self) -> Option<ObjCell<T>> {
        self.0.upgrade().map(ObjCell)
    }

    /// Whether the observed object has not been destroyed yet.
    pub fn is_valid(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl<T> Clone for ObjObserver<T> {
    fn clone(&self) -> Self {
        ObjObserver(Weak::clone(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter<'a>(&'a AtomicUsize);

    impl Drop for DropCounter<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn destroyed_exactly_on_last_release() {
        let drops = AtomicUsize::new(0);
        let cell = ObjCell::new(DropCounter(&drops));
        let second = cell.retain();
        drop(cell);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(second);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn has_one_tracks_ownership() {
        let cell = ObjCell::new(5);
        assert!(cell.has_one());
        let other = cell.retain();
        assert!(!cell.has_one());
        drop(other);
        assert!(cell.has_one());
    }

    #[test]
    fn observer_does_not_own() {
        let cell = ObjCell::new("x");
        let observer = cell.observer();
        assert!(cell.has_one());
        assert!(observer.is_valid());
        assert_eq!(*observer.get().unwrap(), "x");
        drop(cell);
        assert!(!observer.is_valid());
        assert!(observer.get().is_none());
    }

    #[test]
    fn observer_upgrade_keeps_object_alive() {
        let drops = AtomicUsize::new(0);
        let cell = ObjCell::new(DropCounter(&drops));
        let observer = cell.observer();
        let retained = observer.get().unwrap();
        drop(cell);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(retained);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
