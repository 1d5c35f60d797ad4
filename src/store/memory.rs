use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::locks::{IdentityGuard, IdentityLocks};
use super::{CounterField, CounterRecord, CounterStore, StoreError};
use crate::config::device::EUI64;

/// In-memory counter store
///
/// Clones share state, so one store can back several devices and outlive a
/// dropped [`crate::device::Device`] the way a real backend outlives a
/// process. Availability can be switched off to exercise the
/// [`StoreError::Unavailable`] paths.
#[derive(Clone)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<EUI64, CounterRecord>>>,
    available: Arc<AtomicBool>,
    locks: IdentityLocks,
}

impl MemoryStore {
    /// Create an empty, available store
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            locks: IdentityLocks::new(),
        }
    }

    /// Simulate the backend going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored identities
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no identity is stored
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline"))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for MemoryStore {
    type Guard = IdentityGuard;

    fn lock(&self, dev_eui: &EUI64) -> Result<Self::Guard, StoreError> {
        self.check()?;
        Ok(self.locks.acquire(dev_eui))
    }

    fn get(&self, dev_eui: &EUI64) -> Result<Option<CounterRecord>, StoreError> {
        self.check()?;
        Ok(self.records.lock().get(dev_eui).copied())
    }

    fn set(&self, dev_eui: &EUI64, fields: &[CounterField]) -> Result<(), StoreError> {
        self.check()?;
        self.records
            .lock()
            .entry(*dev_eui)
            .or_default()
            .apply(fields);
        Ok(())
    }

    fn delete(&self, dev_eui: &EUI64) -> Result<(), StoreError> {
        self.check()?;
        self.records.lock().remove(dev_eui);
        Ok(())
    }
}
