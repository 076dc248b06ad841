//! Persistent handle on a kernel pseudo-file.
//!
//! Files under `/proc` are tiny, regenerated on every read, and can be
//! refreshed by seeking back to the start. Keeping one descriptor and one
//! line buffer alive for the whole sampling session avoids an `open` and an
//! allocation per sample.

use crate::error::{Result, SamplerError};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};

/// Read buffer size; large enough for `/proc/stat` on most machines.
const READ_BUFFER_BYTES: usize = 8 * 1024;

/// An open kernel pseudo-file with a reusable reader and line buffer.
#[derive(Debug)]
pub struct SourceHandle {
    path: PathBuf,
    reader: BufReader<File>,
    line: String,
}

impl SourceHandle {
    /// Open `path` and keep the descriptor for repeated sampling.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SamplerError::open_error(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(READ_BUFFER_BYTES, file),
            line: String::with_capacity(256),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seek back to offset 0 and drop any buffered bytes.
    ///
    /// Buffer memory is kept. After an error the handle should be reopened.
    pub fn reset(&mut self) -> Result<()> {
        self.reader.rewind()?;
        Ok(())
    }

    /// Read the next line, without its terminator. `None` at end of file.
    pub fn next_line(&mut self) -> Result<Option<&str>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        Ok(Some(self.line.trim_end_matches(['\n', '\r'])))
    }

    /// Replace the descriptor with a freshly opened one.
    pub fn reopen(&mut self) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| SamplerError::open_error(&self.path, e))?;
        self.reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);
        tracing::debug!("Reopened {}", self.path.display());
        Ok(())
    }

    /// Release the descriptor.
    pub fn close(self) {
        tracing::debug!("Closing {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lines(handle: &mut SourceHandle) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = handle.next_line().unwrap() {
            out.push(line.to_string());
        }
        out
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = SourceHandle::open("/definitely/not/here/stat").unwrap_err();
        assert!(matches!(err, SamplerError::NotFound { .. }));
    }

    #[test]
    fn reset_rereads_from_start() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "cpu 1 2 3\nctxt 4\n").unwrap();

        let mut handle = SourceHandle::open(file.path()).unwrap();
        assert_eq!(lines(&mut handle), vec!["cpu 1 2 3", "ctxt 4"]);
        assert!(handle.next_line().unwrap().is_none());

        handle.reset().unwrap();
        assert_eq!(lines(&mut handle), vec!["cpu 1 2 3", "ctxt 4"]);
    }

    #[test]
    fn reset_sees_rewritten_contents() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "ctxt 1\n").unwrap();

        let mut handle = SourceHandle::open(file.path()).unwrap();
        assert_eq!(lines(&mut handle), vec!["ctxt 1"]);

        std::fs::write(file.path(), "ctxt 2\nbtime 3\n").unwrap();
        handle.reset().unwrap();
        assert_eq!(lines(&mut handle), vec!["ctxt 2", "btime 3"]);
    }

    #[test]
    fn reopen_keeps_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "ctxt 1").unwrap();

        let mut handle = SourceHandle::open(file.path()).unwrap();
        handle.reopen().unwrap();
        assert_eq!(handle.path(), file.path());
        assert_eq!(lines(&mut handle), vec!["ctxt 1"]);
        handle.close();
    }
}
