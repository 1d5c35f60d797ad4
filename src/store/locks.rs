use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::config::device::EUI64;

/// Owned guard over one identity
pub type IdentityGuard = ArcMutexGuard<RawMutex, ()>;

/// Lazily created mutex per DevEUI
///
/// Clones share the same lock table, so every handle of a store serializes
/// the same identities.
#[derive(Clone, Default)]
pub struct IdentityLocks {
    table: Arc<Mutex<HashMap<EUI64, Arc<Mutex<()>>>>>,
}

impl IdentityLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, dev_eui: &EUI64) -> Arc<Mutex<()>> {
        self.table.lock().entry(*dev_eui).or_default().clone()
    }

    /// Block until the identity is free
    pub fn acquire(&self, dev_eui: &EUI64) -> IdentityGuard {
        self.entry(dev_eui).lock_arc()
    }

    /// Take the identity lock if it is free
    pub fn try_acquire(&self, dev_eui: &EUI64) -> Option<IdentityGuard> {
        self.entry(dev_eui).try_lock_arc()
    }
}
