//! Publication of registries to concurrent readers.
//!
//! Readers take a snapshot with [`RegistryHandle::load`] and never block.
//! Builds run under a single writer lock and become visible through one
//! atomic pointer swap, so a reader sees the old registry or the new
//! one, never a mix. A failed build publishes nothing.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use arc_swap::ArcSwap;

use crate::registry::Registry;

/// Shared handle to the currently published registry.
#[derive(Debug)]
pub struct RegistryHandle {
    current: ArcSwap<Registry>,
    writer: Mutex<()>,
}

impl Default for RegistryHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right to publish, held for the duration of a build.
pub struct WriterGuard<'a> {
    handle: &'a RegistryHandle,
    _lock: MutexGuard<'a, ()>,
}

impl WriterGuard<'_> {
    /// The registry published before this build.
    pub fn current(&self) -> Arc<Registry> {
        self.handle.load()
    }

    /// Publish `registry`, replacing the current one.
    pub fn publish(&self, mut registry: Registry) -> Arc<Registry> {
        registry.mark_published();
        let registry = Arc::new(registry);
        self.handle.current.store(Arc::clone(&registry));
        tracing::debug!(
            models = registry.len(),
            fingerprint = registry.fingerprint(),
            "published registry"
        );
        registry
    }
}

impl RegistryHandle {
    /// A handle holding the empty registry.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Registry::empty()),
            writer: Mutex::new(()),
        }
    }

    /// The process-wide handle.
    pub fn global() -> &'static RegistryHandle {
        static GLOBAL: OnceLock<RegistryHandle> = OnceLock::new();
        GLOBAL.get_or_init(RegistryHandle::new)
    }

    /// Snapshot of the published registry.
    pub fn load(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    /// Take the writer lock. Blocks while another build is running.
    pub fn write(&self) -> WriterGuard<'_> {
        let lock = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        WriterGuard {
            handle: self,
            _lock: lock,
        }
    }

    /// Build a new registry from the current one under the writer lock and
    /// publish it. On error the current registry stays published.
    pub fn rebuild<F, E>(&self, build: F) -> Result<Arc<Registry>, E>
    where
        F: FnOnce(&Registry) -> Result<Registry, E>,
    {
        let guard = self.write();
        let current = guard.current();
        let next = build(&current)?;
        Ok(guard.publish(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let handle = RegistryHandle::new();
        assert!(handle.load().is_empty());
    }

    #[test]
    fn failed_rebuild_keeps_current() {
        let handle = RegistryHandle::new();
        let before = handle.load();
        let result: Result<_, &str> = handle.rebuild(|_| Err("boom"));
        assert!(result.is_err());
        assert!(Arc::ptr_eq(&before, &handle.load()));
    }

    #[test]
    fn successful_rebuild_swaps() {
        let handle = RegistryHandle::new();
        let before = handle.load();
        let result: Result<_, &str> = handle.rebuild(|_| Ok(Registry::empty()));
        let published = result.unwrap();
        assert!(!Arc::ptr_eq(&before, &published));
        assert!(Arc::ptr_eq(&published, &handle.load()));
    }

    #[test]
    fn global_is_shared() {
        assert!(std::ptr::eq(RegistryHandle::global(), RegistryHandle::global()));
    }
}
