//! Per-entity mutual exclusion for synchronizer operations.
//!
//! A lease is held from before the first read of a mutating operation until
//! local persistence has completed or failed, so two operations on the same
//! entity never interleave their remote and local steps. Operations on
//! different entities do not contend.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::types::EntityKind;

pub type EntityKey = (EntityKind, i64);

#[derive(Debug, Default)]
pub struct EntityLeases {
    held: Mutex<HashSet<EntityKey>>,
    released: Condvar,
}

impl EntityLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lease for `(kind, id)` is free, then take it.
    pub fn acquire(&self, kind: EntityKind, id: i64) -> Lease<'_> {
        let key = (kind, id);
        let mut held = self.lock();
        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(key);
        Lease { table: self, key }
    }

    pub fn is_held(&self, kind: EntityKind, id: i64) -> bool {
        self.lock().contains(&(kind, id))
    }

    // The set is only mutated under the lock with no user code running, so a
    // poisoned lock still holds a consistent set.
    fn lock(&self) -> MutexGuard<'_, HashSet<EntityKey>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// RAII guard; dropping it releases the lease.
#[derive(Debug)]
pub struct Lease<'a> {
    table: &'a EntityLeases,
    key: EntityKey,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.table.lock().remove(&self.key);
        self.table.released.notify_all();
    }
}
