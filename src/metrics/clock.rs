//! Kernel clock-tick rate (`USER_HZ`).

use crate::error::{Result, SamplerError};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Ticks per second assumed when the system cannot be asked.
pub const FALLBACK_CLOCK_RATE: u32 = 100;

lazy_static! {
    static ref SYSTEM_CLOCK_RATE: ClockRate = detect();
}

/// Clock ticks per second used by the kernel's CPU accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockRate(u32);

impl ClockRate {
    /// Create a clock rate; zero is rejected.
    pub fn new(ticks_per_second: u32) -> Result<Self> {
        if ticks_per_second == 0 {
            return Err(SamplerError::config_error("clock rate must be non-zero"));
        }
        Ok(Self(ticks_per_second))
    }

    /// The system clock rate, queried once per process.
    pub fn system() -> Self {
        *SYSTEM_CLOCK_RATE
    }

    pub fn ticks_per_second(&self) -> u32 {
        self.0
    }

    /// Convert a tick count into seconds.
    pub fn ticks_to_secs(&self, ticks: u128) -> f64 {
        ticks as f64 / self.0 as f64
    }
}

impl Default for ClockRate {
    fn default() -> Self {
        Self(FALLBACK_CLOCK_RATE)
    }
}

#[cfg(unix)]
fn detect() -> ClockRate {
    // SAFETY: sysconf has no preconditions and only reads a constant.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    match u32::try_from(ticks).ok().and_then(|t| ClockRate::new(t).ok()) {
        Some(rate) => {
            tracing::debug!("Detected clock rate of {} ticks/s", rate.0);
            rate
        }
        None => {
            tracing::warn!(
                "sysconf(_SC_CLK_TCK) returned {}, assuming {} ticks/s",
                ticks,
                FALLBACK_CLOCK_RATE
            );
            ClockRate::default()
        }
    }
}

#[cfg(not(unix))]
fn detect() -> ClockRate {
    tracing::warn!("Clock rate unavailable on this platform, assuming {} ticks/s", FALLBACK_CLOCK_RATE);
    ClockRate::default()
}
