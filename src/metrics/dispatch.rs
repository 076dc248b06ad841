//! Field classification for `/proc/stat` lines.
//!
//! The set of names is fixed, so classification is one `match` over the name
//! bytes. The compiler lowers it to a length check plus a few byte compares
//! and checks the mapping for overlap, which a chain of `==` tests would not.

/// Destination of one tokenized `/proc/stat` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `cpu`: counters summed over all CPUs
    CpuTotal,
    /// `cpuN`: counters for one logical CPU
    CpuUnit,
    /// `ctxt`
    ContextSwitches,
    /// `btime`
    BootTime,
    /// `processes`: forks since boot
    Processes,
    /// `procs_running`
    ProcsRunning,
    /// `procs_blocked`
    ProcsBlocked,
    /// `intr`: skipped
    Interrupts,
    /// `softirq`: skipped
    SoftIrqs,
    /// Anything this build does not know about
    Unknown,
}

impl FieldKind {
    /// Classify a field name.
    pub fn classify(name: &[u8]) -> Self {
        match name {
            [b'c', b'p', b'u'] => Self::CpuTotal,
            [b'c', b'p', b'u', index @ ..] if index.iter().all(u8::is_ascii_digit) => {
                Self::CpuUnit
            }
            [b'c', b't', b'x', b't'] => Self::ContextSwitches,
            [b'b', b't', b'i', b'm', b'e'] => Self::BootTime,
            [b'i', b'n', b't', b'r'] => Self::Interrupts,
            [b's', b'o', b'f', b't', b'i', b'r', b'q'] => Self::SoftIrqs,
            [b'p', b'r', b'o', b'c', b'e', b's', b's', b'e', b's'] => Self::Processes,
            [b'p', b'r', b'o', b'c', b's', b'_', rest @ ..] => match rest {
                [b'r', b'u', b'n', b'n', b'i', b'n', b'g'] => Self::ProcsRunning,
                [b'b', b'l', b'o', b'c', b'k', b'e', b'd'] => Self::ProcsBlocked,
                _ => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }

    /// Whether lines of this kind carry a full row of CPU counters.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Self::CpuTotal | Self::CpuUnit)
    }
}
