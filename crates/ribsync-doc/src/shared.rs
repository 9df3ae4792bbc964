//! Shared single-writer / multiple-reader access to a document.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cloneable handle to a document behind a read/write lock.
///
/// Read guards are taken for snapshots and UI reads; the write guard only
/// while transforms are applied. Guards are scoped: dropping releases.
pub struct SharedDocument<D> {
    inner: Arc<RwLock<D>>,
}

impl<D> SharedDocument<D> {
    pub fn new(doc: D) -> Self {
        Self {
            inner: Arc::new(RwLock::new(doc)),
        }
    }

    /// Acquire shared read access, blocking while a writer holds the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, D> {
        self.inner.read()
    }

    /// Acquire exclusive write access, blocking until all readers release.
    pub fn write(&self) -> RwLockWriteGuard<'_, D> {
        self.inner.write()
    }

    /// Non-blocking read attempt (UI thread must never stall on a sync round).
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, D>> {
        self.inner.try_read()
    }
}

impl<D> Clone for SharedDocument<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_read_fails_while_writing() {
        let doc = SharedDocument::new(5u32);
        let other = doc.clone();
        {
            let mut w = doc.write();
            *w = 6;
            assert!(other.try_read().is_none());
        }
        assert_eq!(*other.try_read().unwrap(), 6);
    }

    #[test]
    fn test_readers_share() {
        let doc = SharedDocument::new(String::from("x"));
        let a = doc.read();
        let b = doc.try_read().unwrap();
        assert_eq!(*a, *b);
    }
}
