//! Committed store state
//!
//! Thread-safe implementation using RwLock. Records are kept in insertion
//! order; every committed write bumps the record's version, which is what
//! write contexts use to detect conflicts.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use shared::{Record, RecordId, StoreError};

/// A committed record and its version
#[derive(Debug, Clone)]
pub(crate) struct StoredRecord {
    pub record: Record,
    pub version: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    by_seq: BTreeMap<u64, StoredRecord>,
    index: HashMap<RecordId, u64>,
    next_seq: u64,
}

impl StoreState {
    pub fn get(&self, id: &RecordId) -> Option<&StoredRecord> {
        self.index.get(id).and_then(|seq| self.by_seq.get(seq))
    }

    /// Committed records in insertion order
    pub fn records(&self) -> impl Iterator<Item = &StoredRecord> {
        self.by_seq.values()
    }

    /// Insert at the end of the order with version 1
    pub fn insert(&mut self, record: Record) {
        if let Some(seq) = self.index.remove(&record.id()) {
            self.by_seq.remove(&seq);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(record.id(), seq);
        self.by_seq.insert(seq, StoredRecord { record, version: 1 });
    }

    /// Overwrite in place, bumping the version
    pub fn replace(&mut self, record: Record) -> Result<(), StoreError> {
        let id = record.id();
        let seq = *self.index.get(&id).ok_or(StoreError::UnknownRecord(id))?;
        let slot = self
            .by_seq
            .get_mut(&seq)
            .ok_or(StoreError::UnknownRecord(id))?;
        slot.record = record;
        slot.version += 1;
        Ok(())
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<StoredRecord> {
        let seq = self.index.remove(id)?;
        self.by_seq.remove(&seq)
    }
}

/// Shared handle to the committed state
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("Failed to acquire read lock".to_string()))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("Failed to acquire write lock".to_string()))
    }

    /// Committed record by identity
    pub fn get(&self, id: &RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.read()?.get(id).map(|stored| stored.record.clone()))
    }

    /// Committed version of a record, starting at 1
    pub fn version(&self, id: &RecordId) -> Result<Option<u64>, StoreError> {
        Ok(self.read()?.get(id).map(|stored| stored.version))
    }

    /// Number of committed records of `entity`
    pub fn count(&self, entity: &str) -> Result<usize, StoreError> {
        Ok(self
            .read()?
            .records()
            .filter(|stored| stored.record.entity() == entity)
            .count())
    }
}
