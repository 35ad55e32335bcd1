#![allow(clippy::must_use_candidate)]

//! Local persistence for the gateway: the model-rotation cursor and the
//! token-usage log, both small SQLite databases under the data directory.

mod rotation;
mod usage;

pub use rotation::RotationStore;
pub use usage::{AggregatedUsage, UsagePeriod, UsageRecord, UsageRow, UsageSink, UsageStore};
