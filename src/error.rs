//! Error handling for the procpulse sampler.

use std::io;
use std::path::Path;

/// A specialized `Result` type for sampler operations.
pub type Result<T> = std::result::Result<T, SamplerError>;

/// The main error type for sampling, parsing and delta computation.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// The source pseudo-file does not exist
    #[error("Source not found: {path}")]
    NotFound { path: String },

    /// The source pseudo-file exists but cannot be read
    #[error("Permission denied opening source: {path}")]
    PermissionDenied { path: String },

    /// I/O operation failed mid-stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A numeric field could not be parsed
    #[error("Failed to parse field `{field}` from value {value:?}")]
    Parse { field: String, value: String },

    /// The unit sets of two snapshots do not line up
    #[error("Unit shape mismatch on `{unit}` (previous: {previous} units, current: {current} units)")]
    ShapeMismatch {
        unit: String,
        previous: usize,
        current: usize,
    },

    /// A monotonic counter went backwards between two snapshots
    #[error("Counter `{unit}.{counter}` went backwards ({previous} -> {current})")]
    CounterRegression {
        unit: String,
        counter: &'static str,
        previous: u64,
        current: u64,
    },

    /// A lifecycle method was called in the wrong state
    #[error("Cannot {operation} while ticker is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic system error
    #[error("System error: {0}")]
    System(String),
}

impl SamplerError {
    /// Classify a failure to open `path` by its I/O error kind.
    pub fn open_error(path: &Path, err: io::Error) -> Self {
        let path = path.display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io(err),
        }
    }

    /// Create a new parse error
    pub fn parse_error(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Parse {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a new shape mismatch error
    pub fn shape_mismatch(unit: impl Into<String>, previous: usize, current: usize) -> Self {
        Self::ShapeMismatch {
            unit: unit.into(),
            previous,
            current,
        }
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new generic system error
    #[allow(clippy::self_named_constructors)]
    pub fn system_error(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Whether the source can no longer be sampled at all.
    ///
    /// A missing or unreadable source will not heal between ticks, so the
    /// ticker gives up on it. Everything else is retried on the next tick.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::PermissionDenied { .. })
    }

    /// Whether this error came from the file descriptor itself.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_classifies_kind() {
        let path = Path::new("/proc/nope");
        let err = SamplerError::open_error(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, SamplerError::NotFound { ref path } if path == "/proc/nope"));
        assert!(err.is_terminal());

        let err = SamplerError::open_error(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, SamplerError::PermissionDenied { .. }));
        assert!(err.is_terminal());

        let err = SamplerError::open_error(path, io::Error::from(io::ErrorKind::Interrupted));
        assert!(err.is_io());
        assert!(!err.is_terminal());
    }

    #[test]
    fn parse_error_names_field() {
        let err = SamplerError::parse_error("cpu0.user", "12x");
        let msg = err.to_string();
        assert!(msg.contains("cpu0.user"));
        assert!(msg.contains("12x"));
        assert!(!err.is_terminal());
    }
}
