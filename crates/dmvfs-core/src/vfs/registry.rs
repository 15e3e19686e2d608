//! Backend registry.
//!
//! Maps driver names to [`FsDriver`] implementations and tracks how many
//! mounts currently use each one, so a driver cannot be unregistered out
//! from under a live mount.

use dashmap::DashMap;
use std::sync::Arc;

use dmvfs_types::{VfsError, VfsResult};

use super::backends::{RamFsDriver, TestFsDriver};
use super::ops::FsDriver;

struct RegistryEntry {
    driver: Arc<dyn FsDriver>,
    usage: usize,
}

/// Name-indexed set of filesystem drivers.
///
/// Thread-safe via DashMap; shared between [`Vfs`](super::Vfs) instances
/// through an `Arc`.
#[derive(Default)]
pub struct Registry {
    drivers: DashMap<String, RegistryEntry>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("drivers", &self.names())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the in-tree drivers (`ramfs`, `testfs`).
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        let builtin: [Arc<dyn FsDriver>; 2] = [Arc::new(RamFsDriver), Arc::new(TestFsDriver::new())];
        for driver in builtin {
            registry
                .drivers
                .insert(driver.name().to_string(), RegistryEntry { driver, usage: 0 });
        }
        registry
    }

    /// Add a driver under its own name.
    pub fn register(&self, driver: Arc<dyn FsDriver>) -> VfsResult<()> {
        let name = driver.name().to_string();
        match self.drivers.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(VfsError::already_exists(name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(RegistryEntry { driver, usage: 0 });
                tracing::debug!(fs = %name, "registered filesystem driver");
                Ok(())
            }
        }
    }

    /// Remove a driver. Refused while any mount still uses it.
    pub fn unregister(&self, name: &str) -> VfsResult<()> {
        if self.drivers.remove_if(name, |_, entry| entry.usage == 0).is_some() {
            tracing::debug!(fs = %name, "unregistered filesystem driver");
            return Ok(());
        }
        if self.drivers.contains_key(name) {
            Err(VfsError::Busy(name.to_string()))
        } else {
            Err(VfsError::BackendNotFound(name.to_string()))
        }
    }

    /// Look up a driver by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn FsDriver>> {
        self.drivers.get(name).map(|entry| Arc::clone(&entry.driver))
    }

    /// Look up a driver and count one more user of it, atomically with
    /// respect to [`unregister`](Registry::unregister). Pair with
    /// [`end_usage`](Registry::end_usage).
    pub fn acquire(&self, name: &str) -> Option<Arc<dyn FsDriver>> {
        let mut entry = self.drivers.get_mut(name)?;
        entry.usage += 1;
        Some(Arc::clone(&entry.driver))
    }

    /// Record that a user of `name` went away.
    pub fn end_usage(&self, name: &str) {
        if let Some(mut entry) = self.drivers.get_mut(name) {
            entry.usage = entry.usage.saturating_sub(1);
        }
    }

    /// Number of live mounts using `name`; 0 if unknown.
    pub fn usage(&self, name: &str) -> usize {
        self.drivers.get(name).map(|entry| entry.usage).unwrap_or(0)
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
