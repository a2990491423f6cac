//! Disk persistence for log items that could not be delivered.
//!
//! Items are appended in arrival order and replayed in the same order. The
//! store is synchronous: appends happen on the producer's enqueue path and
//! must stay bounded to a single write.

pub mod backends;
pub mod error;
pub mod store;
pub mod types;

pub use backends::{FileStore, FileStoreBuilder, MemoryStore};
pub use error::{Result, SpoolError};
pub use store::{DiskStore, Replay};
pub use types::RecordId;
