use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::locks::{IdentityGuard, IdentityLocks};
use super::{CounterField, CounterRecord, CounterStore, StoreError};
use crate::config::device::EUI64;

type Records = BTreeMap<String, CounterRecord>;

/// Counter store kept in one JSON document
///
/// Records are keyed by the hex DevEUI. Every write replaces the document
/// through a temporary file that is synced to disk before the rename, so a
/// crash leaves either the old or the new document.
///
/// Open one store per file and share it by cloning. Clones share the I/O
/// mutex and the identity locks; two stores opened separately on the same
/// path do not serialize each other.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    io: Arc<Mutex<()>>,
    locks: IdentityLocks,
}

impl FileStore {
    /// Open a store at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Arc::new(Mutex::new(())),
            locks: IdentityLocks::new(),
        }
    }

    /// Location of the JSON document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Records, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Records::new()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "counter store read failed");
                return Err(StoreError::Unavailable("file store read failed"));
            }
        };
        serde_json::from_str(&text).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "counter store is corrupt");
            StoreError::Corrupt
        })
    }

    fn write(&self, records: &Records) -> Result<(), StoreError> {
        let text = serde_json::to_vec_pretty(records).map_err(|_| StoreError::Corrupt)?;
        self.replace(&text).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "counter store write failed");
            StoreError::Unavailable("file store write failed")
        })
    }

    fn replace(&self, contents: &[u8]) -> io::Result<()> {
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)
    }

    fn key(dev_eui: &EUI64) -> String {
        hex::encode(dev_eui.as_bytes())
    }
}

impl CounterStore for FileStore {
    type Guard = IdentityGuard;

    fn lock(&self, dev_eui: &EUI64) -> Result<Self::Guard, StoreError> {
        Ok(self.locks.acquire(dev_eui))
    }

    fn get(&self, dev_eui: &EUI64) -> Result<Option<CounterRecord>, StoreError> {
        let _io = self.io.lock();
        Ok(self.read()?.get(&Self::key(dev_eui)).copied())
    }

    fn set(&self, dev_eui: &EUI64, fields: &[CounterField]) -> Result<(), StoreError> {
        let _io = self.io.lock();
        let mut records = self.read()?;
        records.entry(Self::key(dev_eui)).or_default().apply(fields);
        self.write(&records)
    }

    fn delete(&self, dev_eui: &EUI64) -> Result<(), StoreError> {
        let _io = self.io.lock();
        let mut records = self.read()?;
        if records.remove(&Self::key(dev_eui)).is_some() {
            self.write(&records)?;
        }
        Ok(())
    }
}
