//! Frame counter and nonce persistence
//!
//! A [`CounterStore`] keeps one [`CounterRecord`] per DevEUI so counters and
//! nonces survive process restarts. A missing record means the identity has
//! never been used; a store that cannot be reached fails with
//! [`StoreError::Unavailable`] and is never read as zero counters.

use crate::config::device::EUI64;

/// In-memory store
#[cfg(feature = "std")]
pub mod memory;

/// JSON file store
#[cfg(feature = "std")]
pub mod file;

/// Per-identity locks shared by the std stores
#[cfg(feature = "std")]
pub mod locks;

/// Persisted counters and nonces of one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CounterRecord {
    /// Last used uplink frame counter
    pub fcnt_up: u32,
    /// Last accepted downlink frame counter, `None` until a downlink of the
    /// current session is accepted
    #[cfg_attr(feature = "std", serde(default))]
    pub fcnt_down: Option<u32>,
    /// Last used DevNonce
    pub dev_nonce: u16,
    /// Last accepted JoinNonce, `None` before the first join-accept
    #[cfg_attr(feature = "std", serde(default))]
    pub join_nonce: Option<u32>,
}

impl CounterRecord {
    /// Apply field updates in order
    pub fn apply(&mut self, fields: &[CounterField]) {
        for field in fields {
            match *field {
                CounterField::FCntUp(v) => self.fcnt_up = v,
                CounterField::FCntDown(v) => self.fcnt_down = v,
                CounterField::DevNonce(v) => self.dev_nonce = v,
                CounterField::JoinNonce(v) => self.join_nonce = Some(v),
            }
        }
    }
}

/// A single field update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterField {
    /// Uplink frame counter
    FCntUp(u32),
    /// Downlink frame counter; `None` clears it for a fresh session
    FCntDown(Option<u32>),
    /// DevNonce
    DevNonce(u16),
    /// JoinNonce
    JoinNonce(u32),
}

/// Store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backing store cannot be reached
    #[error("counter store unavailable: {0}")]
    Unavailable(&'static str),
    /// Stored data cannot be decoded
    #[error("counter store data is corrupt")]
    Corrupt,
}

/// External key-value persistence for counters and nonces, keyed by DevEUI
///
/// Writes are last-writer-wins. Callers serialize read-modify-write cycles of
/// one identity by holding the guard returned from [`CounterStore::lock`].
pub trait CounterStore {
    /// Guard serializing access to one identity; released on drop
    type Guard;

    /// Acquire the per-identity lock
    fn lock(&self, dev_eui: &EUI64) -> Result<Self::Guard, StoreError>;

    /// Read the record, `None` if the identity was never stored
    fn get(&self, dev_eui: &EUI64) -> Result<Option<CounterRecord>, StoreError>;

    /// Write the given fields in one operation, creating the record if needed
    fn set(&self, dev_eui: &EUI64, fields: &[CounterField]) -> Result<(), StoreError>;

    /// Remove the record
    fn delete(&self, dev_eui: &EUI64) -> Result<(), StoreError>;
}

impl<S: CounterStore + ?Sized> CounterStore for &S {
    type Guard = S::Guard;

    fn lock(&self, dev_eui: &EUI64) -> Result<Self::Guard, StoreError> {
        (**self).lock(dev_eui)
    }

    fn get(&self, dev_eui: &EUI64) -> Result<Option<CounterRecord>, StoreError> {
        (**self).get(dev_eui)
    }

    fn set(&self, dev_eui: &EUI64, fields: &[CounterField]) -> Result<(), StoreError> {
        (**self).set(dev_eui, fields)
    }

    fn delete(&self, dev_eui: &EUI64) -> Result<(), StoreError> {
        (**self).delete(dev_eui)
    }
}
