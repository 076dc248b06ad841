//! `/proc/stat` sampling and utilization.
//!
//! Leaves first: [`source`] holds the descriptor, [`tokenizer`] and
//! [`dispatch`] turn lines into typed fields, [`builder`] assembles a
//! [`Snapshot`](data::Snapshot), [`delta`] compares two of them and
//! [`ticker`] runs the whole pipeline in the background.

pub mod builder;
pub mod clock;
pub mod data;
pub mod delta;
pub mod dispatch;
pub mod source;
pub mod ticker;
pub mod tokenizer;
pub mod traits;

// Re-export commonly used items
pub use builder::SnapshotBuilder;
pub use clock::ClockRate;
pub use data::{Delta, Snapshot};
pub use delta::DeltaCalculator;
pub use ticker::{SamplingTicker, TickerState};
pub use traits::MetricsProvider;
