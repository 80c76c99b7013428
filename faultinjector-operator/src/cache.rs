//! In-memory index of declared specs.
//!
//! The cache is the operator's only notion of "what should exist". It holds
//! no derived state and can always be rebuilt from the cluster, either by the
//! change feed's initial list or by the bootstrap scan.

use crate::declared::{DeclaredSpec, SpecKey};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Mutex-guarded map from identity to the last-known declared spec.
///
/// Every method takes the lock for the duration of a single map operation;
/// [`keys`](Self::keys) and [`snapshot`](Self::snapshot) return owned copies,
/// so callers never iterate while another task mutates.
#[derive(Debug, Default)]
pub struct DeclaredStateCache {
    entries: Mutex<HashMap<SpecKey, DeclaredSpec>>,
}

impl DeclaredStateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a spec, returning the one it replaced.
    pub fn put(&self, spec: DeclaredSpec) -> Option<DeclaredSpec> {
        self.entries.lock().insert(spec.key(), spec)
    }

    /// Remove a spec, returning it if it was present.
    pub fn remove(&self, key: &SpecKey) -> Option<DeclaredSpec> {
        self.entries.lock().remove(key)
    }

    /// Look up a spec.
    pub fn get(&self, key: &SpecKey) -> Option<DeclaredSpec> {
        self.entries.lock().get(key).cloned()
    }

    /// Whether an identity is known.
    pub fn contains(&self, key: &SpecKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// All known identities, sorted.
    pub fn keys(&self) -> Vec<SpecKey> {
        let mut keys: Vec<_> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All known specs, sorted by identity.
    pub fn snapshot(&self) -> Vec<DeclaredSpec> {
        let mut specs: Vec<_> = self.entries.lock().values().cloned().collect();
        specs.sort_by_key(DeclaredSpec::key);
        specs
    }

    /// Number of known specs.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
