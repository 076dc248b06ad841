//! Data structures for sampled counters and derived utilization.

use serde::{Deserialize, Serialize};

/// Name of the aggregate row in `/proc/stat`.
pub const AGGREGATE_UNIT: &str = "cpu";

/// Number of tick counters on a full `/proc/stat` cpu row.
pub const COUNTER_COUNT: usize = 10;

/// Column names of a cpu row, in file order.
pub const COUNTER_NAMES: [&str; COUNTER_COUNT] = [
    "user",
    "nice",
    "system",
    "idle",
    "iowait",
    "irq",
    "softirq",
    "steal",
    "guest",
    "guest_nice",
];

/// Counters read from one pass over `/proc/stat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Timestamp when this snapshot was taken (Unix timestamp in milliseconds)
    pub taken_at: u64,
    /// System-wide scalar counters
    pub global: GlobalCounters,
    /// The `cpu` row, summed over all CPUs
    pub aggregate: UnitCounters,
    /// One entry per `cpuN` row, in file order
    pub units: Vec<UnitCounters>,
}

/// System-wide counters from `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCounters {
    /// Context switches since boot
    pub context_switches: u64,
    /// Boot time (Unix timestamp in seconds)
    pub boot_time: u64,
    /// Forks since boot
    pub processes: u64,
    /// Runnable tasks at sampling time
    pub procs_running: u64,
    /// Tasks blocked on I/O at sampling time
    pub procs_blocked: u64,
}

/// Tick counters for one CPU, keyed by its row name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCounters {
    /// Row name (`cpu`, `cpu0`, ...)
    pub name: String,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    /// Already included in `user`
    pub guest: u64,
    /// Already included in `nice`
    pub guest_nice: u64,
}

impl UnitCounters {
    /// Create an all-zero row named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user: 0,
            nice: 0,
            system: 0,
            idle: 0,
            iowait: 0,
            irq: 0,
            softirq: 0,
            steal: 0,
            guest: 0,
            guest_nice: 0,
        }
    }

    /// Counters in column order.
    pub fn counters(&self) -> [u64; COUNTER_COUNT] {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ]
    }

    /// Mutable counter by column index.
    pub(crate) fn counter_mut(&mut self, column: usize) -> Option<&mut u64> {
        Some(match column {
            0 => &mut self.user,
            1 => &mut self.nice,
            2 => &mut self.system,
            3 => &mut self.idle,
            4 => &mut self.iowait,
            5 => &mut self.irq,
            6 => &mut self.softirq,
            7 => &mut self.steal,
            8 => &mut self.guest,
            9 => &mut self.guest_nice,
            _ => return None,
        })
    }

    /// Ticks counted toward the user+nice+system busy share.
    ///
    /// Summed in `u128` so that no combination of `u64` counters overflows.
    pub fn busy(&self) -> u128 {
        [self.user, self.nice, self.system].into_iter().map(u128::from).sum()
    }

    /// All elapsed ticks. Guest time is part of user/nice and not added again.
    pub fn total(&self) -> u128 {
        self.counters()[..8].iter().copied().map(u128::from).sum()
    }
}

impl Default for UnitCounters {
    fn default() -> Self {
        Self::new(AGGREGATE_UNIT)
    }
}

/// Rates derived from two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Timestamp of the later snapshot (Unix timestamp in milliseconds)
    pub taken_at: u64,
    /// Wall-clock time between the two snapshots
    pub interval_ms: u64,
    /// Seconds since boot at the later snapshot
    pub uptime_secs: u64,
    /// Context switches during the interval
    pub context_switches: u64,
    /// Forks during the interval
    pub processes_created: u64,
    /// Runnable tasks at the later snapshot
    pub procs_running: u64,
    /// Blocked tasks at the later snapshot
    pub procs_blocked: u64,
    /// Utilization over all CPUs
    pub aggregate: UnitUtilization,
    /// Per-CPU utilization, in the order of the later snapshot
    pub units: Vec<UnitUtilization>,
}

/// Share of one CPU's elapsed ticks spent in each state.
///
/// Every fraction is in `0.0..=1.0`. An interval with no elapsed ticks
/// reports all zeroes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitUtilization {
    pub name: String,
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    /// user + nice + system share
    pub busy: f64,
    /// `busy` as a percentage (0.0 to 100.0)
    pub usage_percent: f64,
    /// Elapsed CPU time in seconds
    pub elapsed_secs: f64,
    /// Busy CPU time in seconds
    pub busy_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_columns_round_trip() {
        let mut row = UnitCounters::new("cpu3");
        for column in 0..COUNTER_COUNT {
            *row.counter_mut(column).unwrap() = column as u64 + 1;
        }
        assert!(row.counter_mut(COUNTER_COUNT).is_none());
        assert_eq!(row.counters(), [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(row.busy(), 1 + 2 + 3);
        assert_eq!(row.total(), 1 + 2 + 3 + 4 + 5 + 6 + 7 + 8);
    }

    #[test]
    fn sums_do_not_overflow_at_counter_limit() {
        let mut row = UnitCounters::new("cpu");
        row.user = u64::MAX;
        row.nice = 1;
        row.idle = u64::MAX;
        assert_eq!(row.busy(), u128::from(u64::MAX) + 1);
        assert_eq!(row.total(), 2 * u128::from(u64::MAX) + 1);
    }

    #[test]
    fn snapshot_json_shape() {
        let snapshot = Snapshot {
            taken_at: 1_690_000_000_000,
            units: vec![UnitCounters::new("cpu0")],
            ..Default::default()
        };
        let json: serde_json::Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["aggregate"]["name"], "cpu");
        assert_eq!(json["units"][0]["name"], "cpu0");
        assert!(json["global"].get("context_switches").is_some());
    }
}
