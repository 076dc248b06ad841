//! Traits for snapshot sources.

use crate::error::Result;
use crate::metrics::data::Snapshot;

/// Something that can fill a [`Snapshot`] on demand.
///
/// The sampling ticker drives its provider from a single background task,
/// so implementations need `Send` but never `Sync`.
pub trait MetricsProvider: Send + 'static {
    /// Overwrite `out` with a fresh sample, reusing its allocations.
    ///
    /// On error the contents of `out` are unspecified.
    fn collect_into(&mut self, out: &mut Snapshot) -> Result<()>;

    /// Collect a single snapshot into a new value.
    fn collect_snapshot(&mut self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        self.collect_into(&mut snapshot)?;
        Ok(snapshot)
    }

    /// Re-acquire the underlying source after an I/O failure.
    fn reopen(&mut self) -> Result<()> {
        Ok(())
    }
}
