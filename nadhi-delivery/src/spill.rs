use nadhi_common::{ItemState, LogItem};
use nadhi_spool::{DiskStore, RecordId};
use tracing::{debug, error};

/// Write `item` to disk, leaving it `Persisted` or `Dropped`.
///
/// A failed write is logged here; callers only count the outcome.
pub(crate) fn spill(store: &dyn DiskStore, item: &mut LogItem, reason: &str) -> Option<RecordId> {
    match store.append(item) {
        Ok(record) => {
            item.state = ItemState::Persisted;
            debug!(item = %item.id, %record, reason, "Item persisted to disk");
            Some(record)
        }
        Err(e) => {
            item.state = ItemState::Dropped;
            error!(
                item = %item.id,
                trace_id = item.record.trace_id().unwrap_or_default(),
                reason,
                error = %e,
                "Dropping item: disk write failed"
            );
            None
        }
    }
}
