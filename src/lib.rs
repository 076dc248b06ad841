//! # procpulse - streaming /proc/stat sampler
//!
//! Samples the kernel's CPU accounting file on an interval and streams
//! utilization deltas to a consumer.
//!
//! ## Features
//!
//! - **Allocation-free parsing**: one persistent descriptor, one reused line
//!   buffer, byte-pattern field dispatch
//! - **Keyed deltas**: per-CPU rows are matched by name, so hot-plugged CPUs
//!   surface as errors instead of misaligned numbers
//! - **Explicit backpressure**: block, bounded, drop-newest or drop-oldest
//! - **Separate error stream**: a bad sample never ends the Delta stream
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use procpulse::{SamplerConfig, SamplingTicker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut ticker = SamplingTicker::from_config(SamplerConfig::default())?;
//!     ticker.start()?;
//!
//!     while let Some(delta) = ticker.next_delta().await {
//!         println!("cpu {:.1}%", delta.aggregate.usage_percent);
//!     }
//!
//!     ticker.stop();
//!     ticker.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;

// Re-export public API
pub use config::{DeliveryPolicy, SamplerConfig};
pub use error::{Result, SamplerError};
pub use metrics::{
    builder::SnapshotBuilder,
    clock::ClockRate,
    data::{Delta, GlobalCounters, Snapshot, UnitCounters, UnitUtilization},
    delta::DeltaCalculator,
    ticker::{SamplingTicker, TickerState},
    traits::MetricsProvider,
};

/// The kernel's aggregate CPU accounting file
pub const PROC_STAT_PATH: &str = "/proc/stat";

/// The default sampling interval in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 500;

/// The default error channel capacity
pub const DEFAULT_ERROR_CAPACITY: usize = 16;
