//! Concurrent cache of loaded type handles, keyed by logical class name.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::debug;

use crate::handle::TypeHandle;

/// Handle cache with a runtime enable switch. While disabled, lookups miss
/// and insertions are dropped, but removal still works so stale entries can
/// be purged before re-enabling.
#[derive(Debug, Default)]
pub struct TypeCache {
    entries: DashMap<String, Arc<TypeHandle>>,
    enabled: AtomicBool,
}

impl TypeCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeHandle>> {
        if !self.is_enabled() {
            return None;
        }
        self.entries.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn put(&self, name: &str, handle: Arc<TypeHandle>) {
        if !self.is_enabled() {
            return;
        }
        debug!("caching handle for '{name}'");
        self.entries.insert(name.to_string(), handle);
    }

    /// Remove an entry regardless of the enable switch. Returns the evicted
    /// handle, if any; the library unmaps when its last reference drops.
    pub fn remove(&self, name: &str) -> Option<Arc<TypeHandle>> {
        self.entries.remove(name).map(|(_, handle)| {
            debug!("evicted handle for '{name}'");
            handle
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.is_enabled() && self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
