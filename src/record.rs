//! Interval and variant records.
//!
//! A record keeps its original line verbatim, as raw bytes, and extracts only the fields it is sorted by. Only
//! the key columns have to be valid UTF-8. Everything after them is an opaque payload which is never
//! interpreted.

use std::str;

use serde::{Deserialize, Serialize};

use crate::format::Format;
use crate::header::Header;
use crate::input::{InputError, InputLines, InputSource, Origin};

const FIELD_DELIMITER: u8 = b'\t';

/// Malformed record error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{source_name}:{line}: {message}")]
pub struct ParseError {
    pub source_name: String,
    pub line: u64,
    pub message: String,
}

/// Record sort key: chromosome, primary position and optional secondary position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey<'a> {
    pub chrom: &'a str,
    pub primary: i64,
    pub secondary: Option<i64>,
}

fn fields(line: &[u8], count: usize) -> impl Iterator<Item = &[u8]> {
    line.splitn(count, |byte| *byte == FIELD_DELIMITER)
}

fn parse_chrom(field: Option<&[u8]>) -> Result<&str, String> {
    match field {
        None => Err("missing chromosome column".to_string()),
        Some(field) if field.is_empty() => Err("missing chromosome column".to_string()),
        Some(field) => str::from_utf8(field).map_err(|_| "chromosome name is not valid UTF-8".to_string()),
    }
}

fn parse_position(field: &[u8], name: &str) -> Result<i64, String> {
    // the last column may carry the carriage return of a CRLF line
    let field = field.strip_suffix(b"\r").unwrap_or(field);
    let text = str::from_utf8(field).map_err(|_| format!("{} is not valid UTF-8", name))?;

    text.parse()
        .map_err(|err| format!("failed to parse {} from '{}': {}", name, text, err))
}

fn payload_offset(prefix_len: usize, line: &[u8]) -> usize {
    (prefix_len + 1).min(line.len())
}

// chromosome bytes are checked to be UTF-8 when the record is parsed
fn chrom_of(line: &[u8], chrom_end: usize) -> &str {
    str::from_utf8(&line[..chrom_end]).unwrap_or_default()
}

/// Interval (BED) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "memory-limit", derive(deepsize::DeepSizeOf))]
pub struct IntervalRecord {
    line: Vec<u8>,
    chrom_end: usize,
    rest_start: usize,
    start: i64,
    end: i64,
}

impl IntervalRecord {
    /// Parses an interval line. `chrom`, `start` and `end` columns are mandatory.
    pub fn parse(line: impl Into<Vec<u8>>) -> Result<Self, String> {
        let line = line.into();
        let (chrom_end, rest_start, start, end) = {
            let mut columns = fields(&line, 4);

            let chrom = parse_chrom(columns.next())?;
            let start_field = columns.next().ok_or("missing start column")?;
            let end_field = columns.next().ok_or("missing end column")?;

            let start = parse_position(start_field, "start")?;
            let end = parse_position(end_field, "end")?;

            let prefix_len = chrom.len() + 1 + start_field.len() + 1 + end_field.len();
            (chrom.len(), payload_offset(prefix_len, &line), start, end)
        };

        Ok(IntervalRecord {
            line,
            chrom_end,
            rest_start,
            start,
            end,
        })
    }

    pub fn chrom(&self) -> &str {
        chrom_of(&self.line, self.chrom_end)
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Columns after `end`, verbatim.
    pub fn rest(&self) -> &[u8] {
        &self.line[self.rest_start..]
    }

    pub fn line(&self) -> &[u8] {
        &self.line
    }
}

/// Variant (VCF) data record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "memory-limit", derive(deepsize::DeepSizeOf))]
pub struct VariantRecord {
    line: Vec<u8>,
    chrom_end: usize,
    rest_start: usize,
    pos: i64,
}

impl VariantRecord {
    /// Parses a variant data line. `chrom` and `pos` columns are mandatory.
    pub fn parse(line: impl Into<Vec<u8>>) -> Result<Self, String> {
        let line = line.into();
        let (chrom_end, rest_start, pos) = {
            let mut columns = fields(&line, 3);

            let chrom = parse_chrom(columns.next())?;
            let pos_field = columns.next().ok_or("missing position column")?;
            let pos = parse_position(pos_field, "position")?;

            (chrom.len(), payload_offset(chrom.len() + 1 + pos_field.len(), &line), pos)
        };

        Ok(VariantRecord {
            line,
            chrom_end,
            rest_start,
            pos,
        })
    }

    pub fn chrom(&self) -> &str {
        chrom_of(&self.line, self.chrom_end)
    }

    pub fn pos(&self) -> i64 {
        self.pos
    }

    /// Columns after `pos`, verbatim.
    pub fn rest(&self) -> &[u8] {
        &self.line[self.rest_start..]
    }

    pub fn line(&self) -> &[u8] {
        &self.line
    }
}

/// Format specific part of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "memory-limit", derive(deepsize::DeepSizeOf))]
pub enum RecordKind {
    Interval(IntervalRecord),
    Variant(VariantRecord),
}

/// Sortable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "memory-limit", derive(deepsize::DeepSizeOf))]
pub struct Record {
    origin: Origin,
    kind: RecordKind,
}

impl Record {
    /// Parses a data line of the given format.
    pub fn parse(format: Format, origin: Origin, line: impl Into<Vec<u8>>) -> Result<Self, String> {
        let kind = match format {
            Format::Bed => RecordKind::Interval(IntervalRecord::parse(line)?),
            Format::Vcf => RecordKind::Variant(VariantRecord::parse(line)?),
        };
        Ok(Record { origin, kind })
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn key(&self) -> SortKey<'_> {
        match &self.kind {
            RecordKind::Interval(interval) => SortKey {
                chrom: interval.chrom(),
                primary: interval.start,
                secondary: Some(interval.end),
            },
            RecordKind::Variant(variant) => SortKey {
                chrom: variant.chrom(),
                primary: variant.pos,
                secondary: None,
            },
        }
    }

    /// Original line bytes without the line feed.
    pub fn line(&self) -> &[u8] {
        match &self.kind {
            RecordKind::Interval(interval) => interval.line(),
            RecordKind::Variant(variant) => variant.line(),
        }
    }

    /// Checks whether both records carry the same key and payload.
    pub fn same_content(&self, other: &Record) -> bool {
        self.line() == other.line()
    }
}

/// Parses input lines into records, routing header lines into a [`Header`].
pub struct RecordReader<'a> {
    lines: InputLines<'a>,
    sources: &'a [InputSource],
    format: Format,
    header: Header,
    records: u64,
    failed: bool,
}

impl<'a> RecordReader<'a> {
    pub fn new(lines: InputLines<'a>, sources: &'a [InputSource], format: Format) -> Self {
        RecordReader {
            lines,
            sources,
            format,
            header: Header::new(),
            records: 0,
            failed: false,
        }
    }

    /// Number of data records read so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Header lines. Complete only once the reader is exhausted.
    pub fn into_header(self) -> Header {
        self.header
    }

    fn parse_error(&self, origin: Origin, message: String) -> InputError {
        let source_name = self
            .sources
            .get(origin.file as usize)
            .map(|source| source.to_string())
            .unwrap_or_default();

        InputError::Parse(ParseError {
            source_name,
            line: origin.line,
            message,
        })
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = Result<Record, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            };

            if line.text.is_empty() {
                continue;
            }
            if let Some(marker) = self.format.header_marker() {
                if line.text.first() == Some(&marker) {
                    self.header.push(line.text);
                    continue;
                }
            }

            return match Record::parse(self.format, line.origin, line.text) {
                Ok(record) => {
                    self.records += 1;
                    Some(Ok(record))
                }
                Err(message) => {
                    self.failed = true;
                    Some(Err(self.parse_error(line.origin, message)))
                }
            };
        }
    }
}
