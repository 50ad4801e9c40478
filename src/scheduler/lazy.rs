//! Exactly-once lazy creation of shared pools.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// A slot holding a lazily created, shared value.
///
/// Creation uses double-checked locking: a read lock serves the fast path,
/// the write lock re-checks before running the constructor, so concurrent
/// first accesses produce exactly one instance.
pub struct LazySlot<T> {
    slot: RwLock<Option<Arc<T>>>,
    creations: AtomicUsize,
}

impl<T> LazySlot<T> {
    /// Create an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            creations: AtomicUsize::new(0),
        }
    }

    /// The value, if it has been created.
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    /// Return the value, creating it with `create` if the slot is empty.
    ///
    /// # Errors
    ///
    /// Propagates the constructor's error; the slot stays empty and a later
    /// call retries.
    pub fn get_or_try_init<E>(&self, create: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        if let Some(value) = self.slot.read().as_ref() {
            return Ok(Arc::clone(value));
        }
        let mut slot = self.slot.write();
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(create()?);
        self.creations.fetch_add(1, Ordering::AcqRel);
        *slot = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Infallible variant of [`LazySlot::get_or_try_init`].
    pub fn get_or_init(&self, create: impl FnOnce() -> T) -> Arc<T> {
        match self.get_or_try_init::<std::convert::Infallible>(|| Ok(create())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// How many times the constructor has run.
    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::Acquire)
    }
}

impl<T> Default for LazySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
