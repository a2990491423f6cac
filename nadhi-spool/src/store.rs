use std::fmt::Debug;

use nadhi_common::LogItem;

use crate::{RecordId, Result, SpoolError};

/// Durable append/replay storage for log items.
///
/// Implementations must tolerate concurrent callers: the drain worker,
/// delivery workers and the producer's writeback path all append to the
/// same store. Identifiers must sort in append order.
pub trait DiskStore: Send + Sync + Debug {
    /// Persist `item` and return the identifier it was stored under.
    fn append(&self, item: &LogItem) -> Result<RecordId>;

    /// Every stored record, oldest first.
    fn list(&self) -> Result<Vec<RecordId>>;

    fn read(&self, id: &RecordId) -> Result<LogItem>;

    fn remove(&self, id: &RecordId) -> Result<()>;

    fn len(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<'s> dyn DiskStore + 's {
    /// Lazily walk the store in arrival order.
    ///
    /// The set of records is fixed when this is called; records appended
    /// afterwards are picked up by the next replay. Records removed in the
    /// meantime are skipped. Nothing is removed by iterating.
    pub fn replay(&self) -> Result<Replay<'_>> {
        Ok(Replay {
            store: self,
            ids: self.list()?.into_iter(),
        })
    }
}

/// Arrival-order walk over a store, created by `replay`.
#[derive(Debug)]
pub struct Replay<'a> {
    store: &'a dyn DiskStore,
    ids: std::vec::IntoIter<RecordId>,
}

impl Iterator for Replay<'_> {
    type Item = (RecordId, Result<LogItem>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.ids.next()?;
            match self.store.read(&id) {
                Err(SpoolError::NotFound(_)) => {}
                result => return Some((id, result)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}
