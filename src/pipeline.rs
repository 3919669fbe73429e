//! Genomic sort: ties the reader, the external sorter, the merger and the writer together.

use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use log;

#[cfg(feature = "memory-limit")]
use crate::buffer::MemoryLimitedBufferBuilder;
use crate::buffer::{ChunkBufferBuilder, LimitedBufferBuilder, DEFAULT_MAX_RECORDS};
use crate::chunk::{ChunkCompression, ExternalChunkError};
use crate::collate::ChromOrder;
use crate::compare::{RecordOrder, TieBreak};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::input::{InputError, InputLines, InputOpener, InputSource};
use crate::merger::Dedup;
use crate::record::{Record, RecordReader};
use crate::sort::{ExternalSorter, ExternalSorterBuilder};
use crate::writer::{Output, RecordWriter};

/// Temporary run compression level used when compression is enabled.
pub const TMP_COMPRESSION_LEVEL: u32 = 1;

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSummary {
    pub format: Format,
    /// Data records read from all inputs.
    pub records_read: u64,
    /// Data records written to the output.
    pub records_written: u64,
    /// Records dropped as duplicates.
    pub duplicates_dropped: u64,
    /// Runs spilled to temporary files.
    pub spilled_runs: usize,
    /// Intermediate merge passes.
    pub merge_passes: usize,
    /// Header lines written before the records.
    pub header_lines: usize,
}

/// [`GenomeSort`] builder.
pub struct GenomeSortBuilder {
    format: Option<Format>,
    tie_break: TieBreak,
    unique: bool,
    max_records: usize,
    max_memory: Option<u64>,
    tmp_dir: Option<PathBuf>,
    threads_number: Option<usize>,
    chrom_order: ChromOrder,
    merge_fan_in: Option<usize>,
    compression: ChunkCompression,
    rw_buf_size: Option<usize>,
    opener: InputOpener,
}

impl GenomeSortBuilder {
    pub fn new() -> Self {
        GenomeSortBuilder::default()
    }

    /// Validates the configuration and builds a [`GenomeSort`] instance.
    pub fn build(self) -> Result<GenomeSort> {
        if self.max_records == 0 {
            return Err(Error::Usage("records per chunk must be at least 1".to_string()));
        }
        if self.max_memory == Some(0) {
            return Err(Error::Usage("chunk memory limit must be positive".to_string()));
        }
        if let Some(merge_fan_in) = self.merge_fan_in {
            if merge_fan_in < 2 {
                return Err(Error::Usage(format!(
                    "merge fan-in must be at least 2, got {}",
                    merge_fan_in
                )));
            }
        }

        return Ok(GenomeSort {
            format: self.format,
            order: RecordOrder::new(self.chrom_order, self.tie_break),
            unique: self.unique,
            max_records: self.max_records,
            max_memory: self.max_memory,
            tmp_dir: self.tmp_dir,
            threads_number: self.threads_number,
            merge_fan_in: self.merge_fan_in,
            compression: self.compression,
            rw_buf_size: self.rw_buf_size,
            opener: self.opener,
        });
    }

    /// Forces the input format instead of detecting it.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        return self;
    }

    /// Keeps equal-key records in input order.
    pub fn with_stable(mut self, stable: bool) -> Self {
        self.tie_break = if stable { TieBreak::Stable } else { TieBreak::Verbatim };
        return self;
    }

    /// Drops records identical to the previously written one.
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        return self;
    }

    /// Sets the number of records held in memory before a chunk is spilled.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        return self;
    }

    /// Limits chunks by the memory their records occupy instead of a record count.
    #[cfg(feature = "memory-limit")]
    pub fn with_max_memory(mut self, max_memory: u64) -> Self {
        self.max_memory = Some(max_memory);
        return self;
    }

    /// Sets the directory the temporary run directory is created in.
    pub fn with_tmp_dir(mut self, path: &Path) -> Self {
        self.tmp_dir = Some(path.to_path_buf());
        return self;
    }

    pub fn with_threads_number(mut self, threads_number: usize) -> Self {
        self.threads_number = Some(threads_number);
        return self;
    }

    pub fn with_chrom_order(mut self, chrom_order: ChromOrder) -> Self {
        self.chrom_order = chrom_order;
        return self;
    }

    /// Sets the maximum number of runs merged at once.
    pub fn with_merge_fan_in(mut self, merge_fan_in: usize) -> Self {
        self.merge_fan_in = Some(merge_fan_in);
        return self;
    }

    /// Compresses temporary runs.
    pub fn with_compressed_tmp(mut self, compress: bool) -> Self {
        self.compression = if compress {
            ChunkCompression::Gzip(TMP_COMPRESSION_LEVEL)
        } else {
            ChunkCompression::None
        };
        return self;
    }

    /// Sets read/write buffer size of inputs, runs and the output.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> Self {
        self.rw_buf_size = Some(buf_size);
        self.opener = self.opener.with_buf_size(buf_size);
        return self;
    }

    /// Replaces the input opener, for example to register additional codecs.
    pub fn with_input_opener(mut self, opener: InputOpener) -> Self {
        self.opener = opener;
        return self;
    }
}

impl Default for GenomeSortBuilder {
    fn default() -> Self {
        GenomeSortBuilder {
            format: None,
            tie_break: TieBreak::default(),
            unique: false,
            max_records: DEFAULT_MAX_RECORDS,
            max_memory: None,
            tmp_dir: None,
            threads_number: None,
            chrom_order: ChromOrder::default(),
            merge_fan_in: None,
            compression: ChunkCompression::None,
            rw_buf_size: None,
            opener: InputOpener::default(),
        }
    }
}

/// Genomic sort of interval or variant record files.
pub struct GenomeSort {
    format: Option<Format>,
    order: RecordOrder,
    unique: bool,
    max_records: usize,
    #[cfg_attr(not(feature = "memory-limit"), allow(dead_code))]
    max_memory: Option<u64>,
    tmp_dir: Option<PathBuf>,
    threads_number: Option<usize>,
    merge_fan_in: Option<usize>,
    compression: ChunkCompression,
    rw_buf_size: Option<usize>,
    opener: InputOpener,
}

impl GenomeSort {
    /// Resolves the format of the inputs and checks they can be sorted together.
    ///
    /// The format is taken from the configuration, then from the file extensions, then from the first line of
    /// the first input. Standard input is never sniffed since it can't be read twice, it is taken as interval
    /// records unless the format is configured. Only the sniffing reads input data.
    pub fn resolve_format(&self, inputs: &[InputSource]) -> Result<Format> {
        if inputs.is_empty() {
            return Err(Error::Usage("no input files".to_string()));
        }

        let format = match self.format {
            Some(format) => format,
            None => match Self::format_from_extensions(inputs)? {
                Some(format) => format,
                None => self.sniff_format(&inputs[0])?,
            },
        };

        if !format.allows_multiple_inputs() && inputs.len() > 1 {
            return Err(Error::Usage(format!(
                "only one {} input can be sorted at a time, got {}",
                format,
                inputs.len()
            )));
        }

        return Ok(format);
    }

    fn format_from_extensions(inputs: &[InputSource]) -> Result<Option<Format>> {
        let mut guessed: Option<(Format, &InputSource)> = None;
        for input in inputs {
            let format = match input.path().and_then(Format::from_path) {
                Some(format) => format,
                None => continue,
            };
            match guessed {
                Some((other, other_input)) if other != format => {
                    return Err(Error::Usage(format!(
                        "mixed input formats: {} is {} but {} is {}",
                        other_input, other, input, format
                    )));
                }
                Some(_) => {}
                None => guessed = Some((format, input)),
            }
        }

        return Ok(guessed.map(|(format, _)| format));
    }

    fn sniff_format(&self, input: &InputSource) -> Result<Format> {
        if input == &InputSource::Stdin {
            return Ok(Format::Bed);
        }

        let mut reader = self
            .opener
            .open(input)
            .map_err(|err| Error::io(format!("failed to read {}", input), err))?;
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|err| Error::io(format!("failed to read {}", input), err))?;
            if read == 0 {
                return Ok(Format::Bed);
            }
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(&['\r', '\n'][..]);
            if !text.is_empty() {
                let format = Format::sniff(text);
                log::info!("{} looks like {} input", input, format);
                return Ok(format);
            }
        }
    }

    /// Sorts the inputs into the output.
    ///
    /// Nothing is written and the output is not created unless all the inputs are read and parsed successfully.
    pub fn run(&self, inputs: &[InputSource], output: &Output) -> Result<SortSummary> {
        let format = self.resolve_format(inputs)?;
        log::info!("sorting {} {} input(s) into {}", inputs.len(), format, output);

        #[cfg(feature = "memory-limit")]
        if let Some(max_memory) = self.max_memory {
            return self.execute(MemoryLimitedBufferBuilder::new(max_memory), format, inputs, output);
        }

        self.execute(LimitedBufferBuilder::new(self.max_records, true), format, inputs, output)
    }

    fn execute<B>(&self, buffer_builder: B, format: Format, inputs: &[InputSource], output: &Output) -> Result<SortSummary>
    where
        B: ChunkBufferBuilder<Record>,
    {
        let sorter: ExternalSorter<Record, InputError, B> = self.sorter_builder(buffer_builder).build()?;

        let mut reader = RecordReader::new(InputLines::new(&self.opener, inputs), inputs, format);
        let order = self.order;
        let sorted = sorter.sort_by(&mut reader, move |a: &Record, b: &Record| order.compare(a, b))?;
        let records_read = reader.records();
        let header = reader.into_header();
        let stats = sorter.stats();

        let destination = output
            .open(self.rw_buf_size)
            .map_err(|err| Error::io(format!("failed to create {}", output), err))?;
        let mut writer = RecordWriter::new(destination);
        writer
            .write_header(&header)
            .map_err(|err| Error::io(format!("failed to write {}", output), err))?;

        let mut duplicates_dropped = 0;
        if self.unique {
            let mut deduplicated = Dedup::new(sorted, Record::same_content);
            write_records(&mut writer, &mut deduplicated, output)?;
            duplicates_dropped = deduplicated.dropped();
        } else {
            write_records(&mut writer, sorted, output)?;
        }

        let records_written = writer.records();
        writer
            .finish()
            .map_err(|err| Error::io(format!("failed to write {}", output), err))?;

        let summary = SortSummary {
            format,
            records_read,
            records_written,
            duplicates_dropped,
            spilled_runs: stats.spilled_chunks,
            merge_passes: stats.merge_passes,
            header_lines: header.len(),
        };
        log::info!(
            "{} records read, {} written, {} duplicates dropped, {} runs spilled",
            summary.records_read,
            summary.records_written,
            summary.duplicates_dropped,
            summary.spilled_runs
        );

        return Ok(summary);
    }

    fn sorter_builder<B>(&self, buffer_builder: B) -> ExternalSorterBuilder<Record, InputError, B>
    where
        B: ChunkBufferBuilder<Record>,
    {
        let mut sorter_builder = ExternalSorterBuilder::new()
            .with_buffer(buffer_builder)
            .with_compression(self.compression);
        if let Some(threads_number) = self.threads_number {
            sorter_builder = sorter_builder.with_threads_number(threads_number);
        }
        if let Some(tmp_dir) = &self.tmp_dir {
            sorter_builder = sorter_builder.with_tmp_dir(tmp_dir);
        }
        if let Some(rw_buf_size) = self.rw_buf_size {
            sorter_builder = sorter_builder.with_rw_buf_size(rw_buf_size);
        }
        if let Some(merge_fan_in) = self.merge_fan_in {
            sorter_builder = sorter_builder.with_merge_fan_in(merge_fan_in);
        }

        return sorter_builder;
    }
}

fn write_records<W, I>(writer: &mut RecordWriter<W>, records: I, output: &Output) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = std::result::Result<Record, ExternalChunkError>>,
{
    for record in records {
        let record = record?;
        writer
            .write_record(&record)
            .map_err(|err: io::Error| Error::io(format!("failed to write {}", output), err))?;
    }
    return Ok(());
}
