pub mod config;
pub mod item;
pub mod logging;
pub mod record;
pub mod tier;

pub use config::{Level, ResolvedConfig};
pub use item::{ItemId, ItemState, LogItem};
pub use record::EvaluatedRecord;
pub use tier::Tier;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
