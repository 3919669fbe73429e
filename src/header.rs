//! Variant file header.

use std::io::{self, prelude::*};

/// Header lines in the order they were read. Lines are kept verbatim and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    lines: Vec<Vec<u8>>,
}

impl Header {
    pub fn new() -> Self {
        Header::default()
    }

    /// Appends a header line.
    pub fn push(&mut self, line: impl Into<Vec<u8>>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Writes every header line followed by a line feed.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        for line in &self.lines {
            writer.write_all(line)?;
            writer.write_all(b"\n")?;
        }
        return Ok(());
    }
}
