//! Lifecycle and concurrency guard.
//!
//! One `parking_lot::Mutex` guards all mutable VFS state. `None` inside the
//! mutex is the uninitialized state. The mutex is constructed with the
//! `Vfs` and cannot fail or be poisoned, so there is no lazy re-creation
//! and no critical-section fallback to manage.
//!
//! The lock is held for the whole of every public operation, backend call
//! included. Mount changes can never race with handle allocation.

use parking_lot::{Mutex, MutexGuard};

use dmvfs_types::{VfsError, VfsResult};

use super::state::VfsState;

#[derive(Debug, Default)]
pub(crate) struct StateLock {
    inner: Mutex<Option<VfsState>>,
}

impl StateLock {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Raw access, for lifecycle transitions.
    pub fn lock(&self) -> MutexGuard<'_, Option<VfsState>> {
        self.inner.lock()
    }

    /// Run `f` under the lock, failing with `NotInitialized` if there is no state.
    pub fn with_initialized<T, F>(&self, f: F) -> VfsResult<T>
    where
        F: FnOnce(&mut VfsState) -> VfsResult<T>,
    {
        let mut guard = self.inner.lock();
        match guard.as_mut() {
            Some(state) => f(state),
            None => Err(VfsError::NotInitialized),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_guard() {
        let lock = StateLock::new();
        assert!(!lock.is_initialized());
        assert!(matches!(
            lock.with_initialized(|_| Ok(())),
            Err(VfsError::NotInitialized)
        ));

        *lock.lock() = Some(VfsState::new(1, 1));
        assert!(lock.is_initialized());
        let cwd = lock.with_initialized(|state| Ok(state.cwd.clone())).unwrap();
        assert_eq!(cwd, "/");
    }
}
