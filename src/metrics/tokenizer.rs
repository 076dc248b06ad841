//! Splits one pseudo-file line into a field name and its value text.

/// Separator between a field name and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// First run of spaces or tabs (`/proc/stat`).
    Whitespace,
    /// First colon (`/proc/meminfo`, `/proc/cpuinfo`).
    Colon,
}

/// Zero-allocation line splitter.
#[derive(Debug, Clone, Copy)]
pub struct LineTokenizer {
    delimiter: Delimiter,
}

impl LineTokenizer {
    pub const fn new(delimiter: Delimiter) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    /// Split `line` into trimmed `(name, value)`.
    ///
    /// Returns `None` for blank lines and for lines with no name. With
    /// [`Delimiter::Colon`] a line without a colon is also skipped.
    pub fn split<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let line = line.trim();
        let (name, value) = match self.delimiter {
            Delimiter::Whitespace => {
                match line.bytes().position(|b| b == b' ' || b == b'\t') {
                    Some(at) => (&line[..at], &line[at..]),
                    None => (line, ""),
                }
            }
            Delimiter::Colon => line.split_once(':')?,
        };

        let name = name.trim_end();
        if name.is_empty() {
            return None;
        }
        Some((name, value.trim()))
    }
}

impl Default for LineTokenizer {
    fn default() -> Self {
        Self::new(Delimiter::Whitespace)
    }
}
