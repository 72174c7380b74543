//! Console output helpers.
//!
//! Data rows go to stdout. Headers are stdout too but suppressed in batch
//! mode so `--batch` output can be piped straight into another tool;
//! footers and diagnostics go to stderr, also suppressed in batch mode.

/// Small handle deciding where a line of output belongs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    batch: bool,
}

impl Console {
    pub fn new(batch: bool) -> Self {
        Console { batch }
    }

    pub fn batch(&self) -> bool {
        self.batch
    }

    /// Data line, always written to stdout.
    pub fn print(&self, line: impl AsRef<str>) {
        println!("{}", line.as_ref());
    }

    /// Error line, always written to stderr.
    pub fn error(&self, line: impl AsRef<str>) {
        eprintln!("{}", line.as_ref());
    }

    /// Column header, suppressed in batch mode.
    pub fn header(&self, line: impl AsRef<str>) {
        if !self.batch {
            println!("{}", line.as_ref());
        }
    }

    /// Summary/footer line on stderr, suppressed in batch mode.
    pub fn footer(&self, line: impl AsRef<str>) {
        if !self.batch {
            eprintln!("{}", line.as_ref());
        }
    }
}
