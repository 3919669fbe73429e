//! Sorted output writer.

use std::fmt;
use std::fs;
use std::io::{self, prelude::*};
use std::path::PathBuf;

use crate::header::Header;
use crate::record::Record;

/// Output destination.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Output {
    #[default]
    Stdout,
    File(PathBuf),
}

impl Output {
    /// Opens the destination for writing, truncating an existing file.
    pub fn open(&self, buf_size: Option<usize>) -> io::Result<Box<dyn Write>> {
        let raw: Box<dyn Write> = match self {
            Output::Stdout => Box::new(io::stdout()),
            Output::File(path) => Box::new(fs::File::create(path)?),
        };
        return Ok(match buf_size {
            Some(buf_size) => Box::new(io::BufWriter::with_capacity(buf_size, raw)),
            None => Box::new(io::BufWriter::new(raw)),
        });
    }
}

impl From<&str> for Output {
    /// `-` stands for the standard output.
    fn from(arg: &str) -> Self {
        if arg == "-" {
            Output::Stdout
        } else {
            Output::File(PathBuf::from(arg))
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stdout => write!(f, "<stdout>"),
            Output::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Writes a header and records, one line each.
pub struct RecordWriter<W: Write> {
    inner: W,
    records: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        RecordWriter { inner, records: 0 }
    }

    pub fn write_header(&mut self, header: &Header) -> io::Result<()> {
        header.write_to(&mut self.inner)
    }

    pub fn write_record(&mut self, record: &Record) -> io::Result<()> {
        self.inner.write_all(record.line())?;
        self.inner.write_all(b"\n")?;
        self.records += 1;
        return Ok(());
    }

    /// Number of records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flushes buffered data and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        return Ok(self.inner);
    }
}
