//! Single-pass `/proc/stat` reader.

use crate::error::{Result, SamplerError};
use crate::metrics::{
    data::{GlobalCounters, Snapshot, UnitCounters, AGGREGATE_UNIT, COUNTER_NAMES},
    dispatch::FieldKind,
    source::SourceHandle,
    tokenizer::LineTokenizer,
    traits::MetricsProvider,
};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fills [`Snapshot`]s from a persistent `/proc/stat` handle.
#[derive(Debug)]
pub struct SnapshotBuilder {
    source: SourceHandle,
    tokenizer: LineTokenizer,
}

impl SnapshotBuilder {
    /// Open a stat-formatted file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            source: SourceHandle::open(path)?,
            tokenizer: LineTokenizer::default(),
        })
    }

    /// Open the system's `/proc/stat`.
    pub fn proc_stat() -> Result<Self> {
        Self::open(crate::PROC_STAT_PATH)
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    /// Read the whole file into a new snapshot.
    pub fn build(&mut self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        self.build_into(&mut snapshot)?;
        Ok(snapshot)
    }

    /// Read the whole file into `out`, reusing its unit storage.
    ///
    /// Any read or parse failure aborts the pass; `out` is then unspecified.
    pub fn build_into(&mut self, out: &mut Snapshot) -> Result<()> {
        self.source.reset()?;

        out.taken_at = now_millis();
        out.global = GlobalCounters::default();
        fill_counters(&mut out.aggregate, AGGREGATE_UNIT, "")?;

        let mut unit_count = 0;
        while let Some(line) = self.source.next_line()? {
            let Some((name, value)) = self.tokenizer.split(line) else {
                continue;
            };

            match FieldKind::classify(name.as_bytes()) {
                FieldKind::CpuTotal => fill_counters(&mut out.aggregate, name, value)?,
                FieldKind::CpuUnit => {
                    if unit_count == out.units.len() {
                        out.units.push(UnitCounters::new(name));
                    }
                    fill_counters(&mut out.units[unit_count], name, value)?;
                    unit_count += 1;
                }
                FieldKind::ContextSwitches => {
                    out.global.context_switches = parse_scalar(name, value)?
                }
                FieldKind::BootTime => out.global.boot_time = parse_scalar(name, value)?,
                FieldKind::Processes => out.global.processes = parse_scalar(name, value)?,
                FieldKind::ProcsRunning => out.global.procs_running = parse_scalar(name, value)?,
                FieldKind::ProcsBlocked => out.global.procs_blocked = parse_scalar(name, value)?,
                FieldKind::Interrupts | FieldKind::SoftIrqs | FieldKind::Unknown => {}
            }
        }

        out.units.truncate(unit_count);
        Ok(())
    }

    /// Release the underlying descriptor.
    pub fn close(self) {
        self.source.close();
    }
}

impl MetricsProvider for SnapshotBuilder {
    fn collect_into(&mut self, out: &mut Snapshot) -> Result<()> {
        self.build_into(out)
    }

    fn reopen(&mut self) -> Result<()> {
        self.source.reopen()
    }
}

/// Overwrite `row` with the counters in `value`. Missing trailing columns
/// (older kernels) read as zero; extra columns are ignored.
fn fill_counters(row: &mut UnitCounters, name: &str, value: &str) -> Result<()> {
    if row.name != name {
        row.name.clear();
        row.name.push_str(name);
    }

    let mut tokens = value.split_ascii_whitespace();
    for (column, counter_name) in COUNTER_NAMES.iter().enumerate() {
        let parsed = match tokens.next() {
            Some(token) => token
                .parse::<u64>()
                .map_err(|_| SamplerError::parse_error(format!("{}.{}", name, counter_name), token))?,
            None => 0,
        };
        if let Some(counter) = row.counter_mut(column) {
            *counter = parsed;
        }
    }
    Ok(())
}

fn parse_scalar(name: &str, value: &str) -> Result<u64> {
    let token = value.split_ascii_whitespace().next().unwrap_or("");
    token
        .parse()
        .map_err(|_| SamplerError::parse_error(name, token))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "\
cpu  1200 34 560 98000 120 0 15 0 0 0
cpu0 600 17 280 49000 60 0 7 0 0 0
cpu1 600 17 280 49000 60 0 8 0 0 0
intr 123456 1 2 3 4
ctxt 9876543
btime 1690000000
processes 54321
procs_running 3
procs_blocked 1
softirq 999 1 2 3
";

    fn builder_for(contents: &str) -> (tempfile::NamedTempFile, SnapshotBuilder) {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        let builder = SnapshotBuilder::open(file.path()).unwrap();
        (file, builder)
    }

    #[test]
    fn parses_full_stat() {
        let (_file, mut builder) = builder_for(STAT);
        let snapshot = builder.build().unwrap();

        assert!(snapshot.taken_at > 0);
        assert_eq!(snapshot.aggregate.name, "cpu");
        assert_eq!(snapshot.aggregate.user, 1200);
        assert_eq!(snapshot.aggregate.idle, 98000);
        assert_eq!(snapshot.aggregate.softirq, 15);
        assert_eq!(snapshot.units.len(), 2);
        assert_eq!(snapshot.units[0].name, "cpu0");
        assert_eq!(snapshot.units[1].name, "cpu1");
        assert_eq!(snapshot.units[1].softirq, 8);
        assert_eq!(
            snapshot.global,
            GlobalCounters {
                context_switches: 9876543,
                boot_time: 1690000000,
                processes: 54321,
                procs_running: 3,
                procs_blocked: 1,
            }
        );
    }

    #[test]
    fn short_rows_zero_fill() {
        let (_file, mut builder) = builder_for("cpu 1 2 3 4 5 6 7\n");
        let snapshot = builder.build().unwrap();
        assert_eq!(snapshot.aggregate.counters(), [1, 2, 3, 4, 5, 6, 7, 0, 0, 0]);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let (_file, mut builder) = builder_for("page 5 6\nctxt 7\nswap 1 2\n");
        let snapshot = builder.build().unwrap();
        assert_eq!(snapshot.global.context_switches, 7);
        assert!(snapshot.units.is_empty());
    }

    #[test]
    fn bad_counter_fails_whole_pass() {
        let (_file, mut builder) = builder_for("cpu 1 2 3\ncpu0 1 x 3\nctxt 4\n");
        let err = builder.build().unwrap_err();
        match err {
            SamplerError::Parse { field, value } => {
                assert_eq!(field, "cpu0.nice");
                assert_eq!(value, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_scalar_names_field() {
        let (_file, mut builder) = builder_for("ctxt -1\n");
        assert!(matches!(
            builder.build(),
            Err(SamplerError::Parse { ref field, .. }) if field == "ctxt"
        ));

        let (_file, mut builder) = builder_for("btime\n");
        assert!(matches!(builder.build(), Err(SamplerError::Parse { .. })));
    }

    #[test]
    fn build_into_reuses_and_shrinks_units() {
        let (file, mut builder) = builder_for(STAT);
        let mut snapshot = Snapshot::default();
        builder.build_into(&mut snapshot).unwrap();
        assert_eq!(snapshot.units.len(), 2);

        std::fs::write(file.path(), "cpu 1 1 1 1\ncpu7 2 2 2 2\n").unwrap();
        builder.build_into(&mut snapshot).unwrap();
        assert_eq!(snapshot.units.len(), 1);
        assert_eq!(snapshot.units[0].name, "cpu7");
        assert_eq!(snapshot.units[0].user, 2);
        assert_eq!(snapshot.global, GlobalCounters::default());
    }

    #[test]
    fn provider_reopen_works() {
        let (_file, mut builder) = builder_for(STAT);
        builder.reopen().unwrap();
        let snapshot = builder.collect_snapshot().unwrap();
        assert_eq!(snapshot.units.len(), 2);
        builder.close();
    }
}
