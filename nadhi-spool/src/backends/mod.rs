mod file;
mod memory;

pub use file::{FileStore, FileStoreBuilder};
pub use memory::MemoryStore;
