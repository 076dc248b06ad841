//! Sampler configuration.

use crate::error::{Result, SamplerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How Deltas are handed to a consumer that is slower than the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Single-slot queue; the sampler waits for the consumer.
    Block,
    /// Queue of `capacity` Deltas; the sampler waits once it is full.
    Bounded { capacity: usize },
    /// Queue of `capacity` Deltas; new Deltas are discarded while it is full.
    DropNewest { capacity: usize },
    /// Ring of `capacity` Deltas; a lagging consumer loses the oldest ones.
    DropOldest { capacity: usize },
}

impl DeliveryPolicy {
    /// Number of Deltas that may be in flight.
    pub fn capacity(&self) -> usize {
        match *self {
            Self::Block => 1,
            Self::Bounded { capacity }
            | Self::DropNewest { capacity }
            | Self::DropOldest { capacity } => capacity,
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::Block
    }
}

/// Configuration for a sampling ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Kernel pseudo-file to sample
    pub source_path: PathBuf,
    /// Sampling interval in milliseconds
    pub interval_ms: u64,
    /// Delta delivery policy
    pub delivery: DeliveryPolicy,
    /// Capacity of the error channel
    pub error_capacity: usize,
    /// Stop sampling on its own after this many ticks
    pub max_ticks: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from(crate::PROC_STAT_PATH),
            interval_ms: crate::DEFAULT_INTERVAL_MS,
            delivery: DeliveryPolicy::default(),
            error_capacity: crate::DEFAULT_ERROR_CAPACITY,
            max_ticks: None,
        }
    }
}

impl SamplerConfig {
    /// Create a new configuration sampling `path` every `interval_ms`.
    pub fn new(path: impl Into<PathBuf>, interval_ms: u64) -> Self {
        Self {
            source_path: path.into(),
            interval_ms,
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| SamplerError::open_error(path, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| SamplerError::config_error(format!("{}: {}", path.display(), e)))
    }

    /// Set the source path.
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = path.into();
        self
    }

    /// Set the sampling interval.
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Set the delivery policy.
    pub fn with_delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the error channel capacity.
    pub fn with_error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity;
        self
    }

    /// Limit the number of ticks.
    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Get the sampling interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Reject values the ticker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(SamplerError::config_error("interval_ms must be greater than zero"));
        }
        if self.delivery.capacity() == 0 {
            return Err(SamplerError::config_error("delivery capacity must be greater than zero"));
        }
        if self.error_capacity == 0 {
            return Err(SamplerError::config_error("error_capacity must be greater than zero"));
        }
        Ok(())
    }
}
