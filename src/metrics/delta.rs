//! Utilization from two snapshots.

use crate::error::{Result, SamplerError};
use crate::metrics::{
    clock::ClockRate,
    data::{Delta, Snapshot, UnitCounters, UnitUtilization, COUNTER_COUNT, COUNTER_NAMES},
};

/// Turns a pair of snapshots into a [`Delta`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaCalculator {
    clock: ClockRate,
}

impl DeltaCalculator {
    pub fn new(clock: ClockRate) -> Self {
        Self { clock }
    }

    pub fn clock_rate(&self) -> ClockRate {
        self.clock
    }

    /// Compute rates for the interval `prev..cur`.
    ///
    /// Units are matched by name. A unit present on only one side fails with
    /// `ShapeMismatch`; a counter that went backwards fails with
    /// `CounterRegression`.
    pub fn compute(&self, prev: &Snapshot, cur: &Snapshot) -> Result<Delta> {
        if prev.units.len() != cur.units.len() {
            return Err(shape_error(prev, cur));
        }

        // Each previous unit pairs with exactly one current unit, so a
        // duplicated name cannot stand in for a missing one.
        let mut matched = vec![false; prev.units.len()];
        let mut units = Vec::with_capacity(cur.units.len());
        for (index, unit) in cur.units.iter().enumerate() {
            let found = match prev.units.get(index) {
                Some(candidate) if candidate.name == unit.name => Some(index),
                _ => prev.units.iter().position(|candidate| candidate.name == unit.name),
            };
            let Some(position) = found else {
                return Err(SamplerError::shape_mismatch(
                    &unit.name,
                    prev.units.len(),
                    cur.units.len(),
                ));
            };
            if std::mem::replace(&mut matched[position], true) {
                return Err(shape_error(prev, cur));
            }
            units.push(self.utilization(&prev.units[position], unit)?);
        }

        let global = &cur.global;
        Ok(Delta {
            taken_at: cur.taken_at,
            interval_ms: cur.taken_at.saturating_sub(prev.taken_at),
            uptime_secs: (cur.taken_at / 1000).saturating_sub(global.boot_time),
            context_switches: monotonic_sub(
                "ctxt",
                "count",
                prev.global.context_switches,
                global.context_switches,
            )?,
            processes_created: monotonic_sub(
                "processes",
                "count",
                prev.global.processes,
                global.processes,
            )?,
            procs_running: global.procs_running,
            procs_blocked: global.procs_blocked,
            aggregate: self.utilization(&prev.aggregate, &cur.aggregate)?,
            units,
        })
    }

    fn utilization(&self, prev: &UnitCounters, cur: &UnitCounters) -> Result<UnitUtilization> {
        let before = prev.counters();
        let after = cur.counters();
        let mut diff = [0u64; COUNTER_COUNT];
        for column in 0..COUNTER_COUNT {
            diff[column] = monotonic_sub(&cur.name, COUNTER_NAMES[column], before[column], after[column])?;
        }

        let [user, nice, system, idle, iowait, irq, softirq, steal, _, _] = diff.map(u128::from);
        let busy = user + nice + system;
        let total = busy + idle + iowait + irq + softirq + steal;
        let share = |ticks: u128| {
            if total == 0 {
                0.0
            } else {
                ticks as f64 / total as f64
            }
        };

        Ok(UnitUtilization {
            name: cur.name.clone(),
            user: share(user),
            nice: share(nice),
            system: share(system),
            idle: share(idle),
            iowait: share(iowait),
            irq: share(irq),
            softirq: share(softirq),
            steal: share(steal),
            busy: share(busy),
            usage_percent: share(busy) * 100.0,
            elapsed_secs: self.clock.ticks_to_secs(total),
            busy_secs: self.clock.ticks_to_secs(busy),
        })
    }
}

fn monotonic_sub(unit: &str, counter: &'static str, previous: u64, current: u64) -> Result<u64> {
    current
        .checked_sub(previous)
        .ok_or_else(|| SamplerError::CounterRegression {
            unit: unit.to_string(),
            counter,
            previous,
            current,
        })
}

/// Name the first unit missing from one side.
fn shape_error(prev: &Snapshot, cur: &Snapshot) -> SamplerError {
    let missing = prev
        .units
        .iter()
        .find(|p| !cur.units.iter().any(|c| c.name == p.name))
        .or_else(|| {
            cur.units
                .iter()
                .find(|c| !prev.units.iter().any(|p| p.name == c.name))
        })
        .map(|unit| unit.name.as_str())
        .unwrap_or("<duplicate>");
    SamplerError::shape_mismatch(missing, prev.units.len(), cur.units.len())
}
