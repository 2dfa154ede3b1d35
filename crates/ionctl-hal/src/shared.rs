//! Shared ownership of device modules.

use std::sync::{Arc, Mutex, MutexGuard};

/// A device module shared between services.
///
/// Each hardware module has exactly one owner; services that need it hold a
/// clone of this handle and lock it for the duration of one operation.
#[derive(Debug, Default)]
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    /// Wrap a module.
    pub fn new(module: T) -> Self {
        Self(Arc::new(Mutex::new(module)))
    }

    /// Lock the module. A poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let a = Shared::new(0_u32);
        let b = a.clone();
        *b.lock() += 3;
        assert_eq!(*a.lock(), 3);
    }
}
