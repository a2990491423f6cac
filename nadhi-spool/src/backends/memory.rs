use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use nadhi_common::LogItem;
use parking_lot::RwLock;

use crate::{DiskStore, RecordId, Result, SpoolError, types::IdGenerator};

/// In-memory disk store
///
/// Primarily for tests. Writes can be made to fail on demand with
/// [`MemoryStore::set_failing`], and a capacity limit rejects appends once
/// reached, which is how disk-full conditions are simulated.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordId, LogItem>>,
    ids: IdGenerator,
    capacity: Option<usize>,
    failing: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Make every subsequent append fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of the stored items, oldest first.
    #[must_use]
    pub fn items(&self) -> Vec<LogItem> {
        self.records.read().values().cloned().collect()
    }
}

impl DiskStore for MemoryStore {
    fn append(&self, item: &LogItem) -> Result<RecordId> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SpoolError::Unavailable("memory store set to fail".into()));
        }

        let mut records = self.records.write();
        if let Some(capacity) = self.capacity
            && records.len() >= capacity
        {
            return Err(SpoolError::Unavailable(format!(
                "memory store at capacity ({capacity})"
            )));
        }

        let id = self.ids.next()?;
        records.insert(id, item.clone());
        Ok(id)
    }

    fn list(&self) -> Result<Vec<RecordId>> {
        Ok(self.records.read().keys().copied().collect())
    }

    fn read(&self, id: &RecordId) -> Result<LogItem> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or(SpoolError::NotFound(*id))
    }

    fn remove(&self, id: &RecordId) -> Result<()> {
        self.records
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or(SpoolError::NotFound(*id))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}
