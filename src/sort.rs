//! External sorter.

use log;
use std::cell::Cell;
use std::cmp::Ordering;
use std::error::Error;
use std::io;
use std::marker::PhantomData;
use std::path::Path;
use std::vec;

use rayon::slice::ParallelSliceMut;

use crate::chunk::{ChunkCompression, ExternalChunk, ExternalChunkError, RmpExternalChunk};
use crate::merger::BinaryHeapMerger;
use crate::{ChunkBuffer, ChunkBufferBuilder, LimitedBufferBuilder};

const TMP_DIR_PREFIX: &str = "genome-sort-";

/// Sorting error.
#[derive(Debug, thiserror::Error)]
pub enum SortError<I> {
    /// Temporary directory or file creation error.
    #[error("temporary directory or file not created: {0}")]
    TempDir(#[source] io::Error),
    /// Workers thread pool initialization error.
    #[error("thread pool initialization failed: {0}")]
    ThreadPoolBuildError(#[source] rayon::ThreadPoolBuildError),
    /// Common I/O error.
    #[error("I/O operation failed: {0}")]
    IO(#[source] io::Error),
    /// Data serialization error.
    #[error("data serialization error: {0}")]
    SerializationError(#[source] rmp_serde::encode::Error),
    /// Data deserialization error.
    #[error("data deserialization error: {0}")]
    DeserializationError(#[source] rmp_serde::decode::Error),
    /// Input data stream error
    #[error("input data stream error: {0}")]
    InputError(#[source] I),
    /// Sorter parameters are out of range.
    #[error("invalid sorter configuration: {0}")]
    InvalidConfig(String),
}

impl<I> From<ExternalChunkError> for SortError<I> {
    fn from(err: ExternalChunkError) -> Self {
        match err {
            ExternalChunkError::TempFile(err) => SortError::TempDir(err),
            ExternalChunkError::IO(err) => SortError::IO(err),
            ExternalChunkError::Serialization(err) => SortError::SerializationError(err),
            ExternalChunkError::Deserialization(err) => SortError::DeserializationError(err),
        }
    }
}

/// Sorted run: either the only chunk, kept in memory, or a chunk spilled to a temporary file.
pub enum Run<T, C> {
    Memory(vec::IntoIter<T>),
    External(C),
}

impl<T, C> Iterator for Run<T, C>
where
    C: ExternalChunk<T>,
{
    type Item = Result<T, ExternalChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Run::Memory(items) => items.next().map(Ok),
            Run::External(chunk) => chunk.next(),
        }
    }
}

/// Sorted stream returned by [`ExternalSorter::sort_by`].
pub type SortedStream<T, F, C> = BinaryHeapMerger<T, ExternalChunkError, F, Run<T, C>>;

/// Statistics of the last sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Number of items read from the input.
    pub items: u64,
    /// Number of chunks spilled to disk while reading the input.
    pub spilled_chunks: usize,
    /// Number of intermediate merge passes.
    pub merge_passes: usize,
    /// Number of runs merged by the final merge.
    pub final_runs: usize,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder<T, E, B = LimitedBufferBuilder, C = RmpExternalChunk<T>>
where
    T: Send,
    E: Error,
    B: ChunkBufferBuilder<T>,
    C: ExternalChunk<T>,
{
    /// Number of threads to be used to sort data in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Chunk file compression.
    compression: ChunkCompression,
    /// Maximum number of runs merged at once.
    merge_fan_in: Option<usize>,
    /// Chunk buffer builder.
    buffer_builder: B,

    /// External chunk type.
    external_chunk_type: PhantomData<C>,
    /// Input item type.
    item_type: PhantomData<T>,
    /// Input error type.
    input_error_type: PhantomData<E>,
}

impl<T, E, B, C> ExternalSorterBuilder<T, E, B, C>
where
    T: Send,
    E: Error,
    B: ChunkBufferBuilder<T>,
    C: ExternalChunk<T>,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<T, E, B, C>, SortError<E>> {
        ExternalSorter::new(
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.buffer_builder,
            self.rw_buf_size,
            self.compression,
            self.merge_fan_in,
        )
    }

    /// Sets number of threads to be used to sort data in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder<T, E, B, C> {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder<T, E, B, C> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets buffer builder.
    pub fn with_buffer(mut self, buffer_builder: B) -> ExternalSorterBuilder<T, E, B, C> {
        self.buffer_builder = buffer_builder;
        return self;
    }

    /// Sets chunk read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder<T, E, B, C> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets chunk file compression.
    pub fn with_compression(mut self, compression: ChunkCompression) -> ExternalSorterBuilder<T, E, B, C> {
        self.compression = compression;
        return self;
    }

    /// Sets the maximum number of runs merged at once. If more runs are produced they are merged in several
    /// passes.
    pub fn with_merge_fan_in(mut self, merge_fan_in: usize) -> ExternalSorterBuilder<T, E, B, C> {
        self.merge_fan_in = Some(merge_fan_in);
        return self;
    }
}

impl<T, E, B, C> Default for ExternalSorterBuilder<T, E, B, C>
where
    T: Send,
    E: Error,
    B: ChunkBufferBuilder<T>,
    C: ExternalChunk<T>,
{
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
            compression: ChunkCompression::None,
            merge_fan_in: None,
            buffer_builder: B::default(),
            external_chunk_type: PhantomData,
            item_type: PhantomData,
            input_error_type: PhantomData,
        }
    }
}

/// External sorter.
///
/// The sorter owns the temporary directory all chunks are created in. The directory and everything left in it
/// is removed when the sorter is dropped.
pub struct ExternalSorter<T, E, B = LimitedBufferBuilder, C = RmpExternalChunk<T>>
where
    T: Send,
    E: Error,
    B: ChunkBufferBuilder<T>,
    C: ExternalChunk<T>,
{
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store temporary data.
    tmp_dir: tempfile::TempDir,
    /// Chunk buffer builder.
    buffer_builder: B,
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Chunk file compression.
    compression: ChunkCompression,
    /// Maximum number of runs merged at once.
    merge_fan_in: Option<usize>,
    /// Last sort statistics.
    stats: Cell<SortStats>,

    /// External chunk type.
    external_chunk_type: PhantomData<C>,
    /// Input item type.
    item_type: PhantomData<T>,
    /// Input error type.
    input_error_type: PhantomData<E>,
}

impl<T, E, B, C> ExternalSorter<T, E, B, C>
where
    T: Send,
    E: Error,
    B: ChunkBufferBuilder<T>,
    C: ExternalChunk<T>,
{
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort data in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `buffer_builder` - An instance of a buffer builder that will be used for chunk buffer creation.
    /// * `rw_buf_size` - Chunks file read/write buffer size.
    /// * `compression` - Chunks file compression.
    /// * `merge_fan_in` - Maximum number of runs merged at once, at least 2. If [`None`] all runs are merged in
    ///   a single pass.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        buffer_builder: B,
        rw_buf_size: Option<usize>,
        compression: ChunkCompression,
        merge_fan_in: Option<usize>,
    ) -> Result<Self, SortError<E>> {
        if let Some(merge_fan_in) = merge_fan_in {
            if merge_fan_in < 2 {
                return Err(SortError::InvalidConfig(format!(
                    "merge fan-in must be at least 2, got {}",
                    merge_fan_in
                )));
            }
        }

        return Ok(ExternalSorter {
            rw_buf_size,
            buffer_builder,
            compression,
            merge_fan_in,
            stats: Cell::new(SortStats::default()),
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
            external_chunk_type: PhantomData,
            item_type: PhantomData,
            input_error_type: PhantomData,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError<E>> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError<E>> {
        let mut tmp_dir_builder = tempfile::Builder::new();
        tmp_dir_builder.prefix(TMP_DIR_PREFIX);

        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tmp_dir_builder.tempdir_in(tmp_path)
        } else {
            tmp_dir_builder.tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Directory temporary chunks are created in.
    pub fn tmp_dir(&self) -> &Path {
        self.tmp_dir.path()
    }

    /// Statistics of the last sort.
    pub fn stats(&self) -> SortStats {
        self.stats.get()
    }

    /// Sorts data from the input.
    /// Returns an iterator that can be used to get sorted data stream.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    pub fn sort<I>(&self, input: I) -> Result<SortedStream<T, fn(&T, &T) -> Ordering, C>, SortError<E>>
    where
        T: Ord,
        I: IntoIterator<Item = Result<T, E>>,
    {
        self.sort_by(input, T::cmp as fn(&T, &T) -> Ordering)
    }

    /// Sorts data from the input using a custom compare function.
    /// Returns an iterator that can be used to get sorted data stream.
    ///
    /// Items are buffered until the buffer is full, then the buffer is sorted and spilled to a temporary file.
    /// If the whole input fits into a single buffer it is never written to disk.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `compare` - Function be be used to compare items
    pub fn sort_by<I, F>(&self, input: I, compare: F) -> Result<SortedStream<T, F, C>, SortError<E>>
    where
        I: IntoIterator<Item = Result<T, E>>,
        F: Fn(&T, &T) -> Ordering + Sync + Send + Copy,
    {
        let mut stats = SortStats::default();
        let mut chunk_buf = self.buffer_builder.build();
        let mut runs = Vec::new();

        for item in input.into_iter() {
            let item = match item {
                Ok(item) => item,
                Err(err) => return Err(SortError::InputError(err)),
            };

            // spilling is deferred until another item arrives so that an input of exactly one buffer stays
            // in memory
            if chunk_buf.is_full() {
                runs.push(Run::External(self.create_chunk(chunk_buf, compare)?));
                chunk_buf = self.buffer_builder.build();
            }

            chunk_buf.push(item);
            stats.items += 1;
        }

        if !chunk_buf.is_empty() {
            if runs.is_empty() {
                log::debug!("keeping the only chunk in memory ({} items)", chunk_buf.len());
                self.sort_chunk(&mut chunk_buf, compare);
                runs.push(Run::Memory(chunk_buf.into_iter()));
            } else {
                runs.push(Run::External(self.create_chunk(chunk_buf, compare)?));
            }
        }
        stats.spilled_chunks = runs.iter().filter(|run| matches!(run, Run::External(_))).count();

        let (runs, merge_passes) = self.cascade_merge(runs, compare)?;
        stats.merge_passes = merge_passes;
        stats.final_runs = runs.len();
        self.stats.set(stats);

        log::debug!(
            "external sort preparation done ({} items, {} chunks spilled, {} merge passes)",
            stats.items,
            stats.spilled_chunks,
            stats.merge_passes
        );

        return Ok(BinaryHeapMerger::new(runs, compare));
    }

    fn sort_chunk<F>(&self, buffer: &mut B::Buffer, compare: F)
    where
        F: Fn(&T, &T) -> Ordering + Sync + Send,
    {
        self.thread_pool.install(|| {
            buffer.par_sort_by(compare);
        });
    }

    fn create_chunk<F>(&self, mut buffer: B::Buffer, compare: F) -> Result<C, SortError<E>>
    where
        F: Fn(&T, &T) -> Ordering + Sync + Send,
    {
        log::debug!("sorting chunk data ({} items) ...", buffer.len());
        self.sort_chunk(&mut buffer, compare);

        log::debug!("saving chunk data");
        let external_chunk = C::build(&self.tmp_dir, buffer, self.rw_buf_size, self.compression)?;

        return Ok(external_chunk);
    }

    /// Merges runs in groups of `merge_fan_in` until no more than `merge_fan_in` runs are left.
    /// Groups are formed of adjacent runs and the merged run takes the place of the group, so creation order
    /// is preserved.
    fn cascade_merge<F>(&self, mut runs: Vec<Run<T, C>>, compare: F) -> Result<(Vec<Run<T, C>>, usize), SortError<E>>
    where
        F: Fn(&T, &T) -> Ordering + Copy,
    {
        let merge_fan_in = match self.merge_fan_in {
            Some(merge_fan_in) => merge_fan_in,
            None => return Ok((runs, 0)),
        };

        let mut passes = 0;
        while runs.len() > merge_fan_in {
            passes += 1;
            log::info!("merge pass {}: {} runs, fan-in {}", passes, runs.len(), merge_fan_in);

            let mut merged = Vec::with_capacity(runs.len() / merge_fan_in + 1);
            let mut pending = runs.into_iter().peekable();
            while pending.peek().is_some() {
                let group: Vec<Run<T, C>> = pending.by_ref().take(merge_fan_in).collect();
                if group.len() == 1 {
                    merged.extend(group);
                } else {
                    merged.push(Run::External(self.merge_runs(group, compare)?));
                }
            }
            runs = merged;
        }

        return Ok((runs, passes));
    }

    fn merge_runs<F>(&self, group: Vec<Run<T, C>>, compare: F) -> Result<C, SortError<E>>
    where
        F: Fn(&T, &T) -> Ordering + Copy,
    {
        let mut failure = None;
        let items = BinaryHeapMerger::new(group, compare).map_while(|item| match item {
            Ok(item) => Some(item),
            Err(err) => {
                failure = Some(err);
                None
            }
        });
        let external_chunk = C::build(&self.tmp_dir, items, self.rw_buf_size, self.compression);

        if let Some(err) = failure {
            return Err(err.into());
        }
        return Ok(external_chunk?);
    }
}

#[cfg(test)]
mod test {
    use std::fmt;
    use std::io;
    use std::path::Path;

    use rand::seq::SliceRandom;
    use rstest::*;

    use super::{ExternalSorter, ExternalSorterBuilder, LimitedBufferBuilder, SortError};
    use crate::chunk::ChunkCompression;
    use crate::collate::ChromOrder;
    use crate::compare::{RecordOrder, TieBreak};
    use crate::format::Format;
    use crate::input::Origin;
    use crate::record::Record;

    fn interval(file: u32, line: u64, text: String) -> Record {
        Record::parse(Format::Bed, Origin { file, line }, text).unwrap()
    }

    #[rstest]
    #[case(ChromOrder::Natural)]
    #[case(ChromOrder::Lexical)]
    fn test_external_sorter(#[case] chrom_order: ChromOrder) {
        let mut records: Vec<Record> = (0..100)
            .map(|i| interval(0, i + 1, format!("chr{}\t{}\t{}\tr{}", i % 12 + 1, (i * 7919) % 500, 600, i)))
            .collect();
        records.shuffle(&mut rand::thread_rng());

        let order = RecordOrder::new(chrom_order, TieBreak::Verbatim);
        let mut expected = records.clone();
        expected.sort_by(|a, b| order.compare(a, b));

        let sorter: ExternalSorter<Record, io::Error> = ExternalSorterBuilder::new()
            .with_buffer(LimitedBufferBuilder::new(8, true))
            .with_threads_number(2)
            .with_tmp_dir(Path::new("./"))
            .build()
            .unwrap();

        let input = records.into_iter().map(Ok::<_, io::Error>);
        let actual: Result<Vec<Record>, _> = sorter.sort_by(input, move |a, b| order.compare(a, b)).unwrap().collect();

        assert_eq!(actual.unwrap(), expected);
        assert_eq!(sorter.stats().items, 100);
        assert_eq!(sorter.stats().spilled_chunks, 13);
    }

    #[test]
    fn test_external_sorter_stability() {
        // five copies of every key spread over two files, fed in reverse
        let mut records = Vec::new();
        for copy in 0..5u64 {
            for pos in 0..20 {
                let file = (copy % 2) as u32;
                records.push(interval(file, copy * 100 + pos + 1, format!("chr1\t{}\t{}\tc{}", pos, pos + 1, 4 - copy)));
            }
        }
        let mut expected = records.clone();
        expected.sort_by_key(|record| (record.key().primary, record.origin()));
        records.reverse();

        let sorter: ExternalSorter<Record, io::Error> = ExternalSorterBuilder::new()
            .with_buffer(LimitedBufferBuilder::new(8, true))
            .with_threads_number(2)
            .with_tmp_dir(Path::new("./"))
            .build()
            .unwrap();

        let order = RecordOrder::new(ChromOrder::Natural, TieBreak::Stable);
        let input = records.into_iter().map(Ok::<_, io::Error>);
        let actual: Vec<Record> = sorter
            .sort_by(input, move |a, b| order.compare(a, b))
            .unwrap()
            .map(Result::unwrap)
            .collect();

        assert_eq!(actual, expected);
    }

    #[rstest]
    #[case(10)]
    #[case(3)]
    fn test_single_chunk_stays_in_memory(#[case] items: i32) {
        let input: Vec<Result<i32, io::Error>> = (0..items).rev().map(Ok).collect();

        let sorter: ExternalSorter<i32, _> = ExternalSorterBuilder::new()
            .with_buffer(LimitedBufferBuilder::new(10, false))
            .with_tmp_dir(Path::new("./"))
            .build()
            .unwrap();

        let actual: Vec<i32> = sorter.sort(input).unwrap().map(Result::unwrap).collect();

        assert_eq!(actual, Vec::from_iter(0..items));
        assert_eq!(sorter.stats().spilled_chunks, 0);
        assert_eq!(sorter.stats().final_runs, 1);
    }

    #[rstest]
    #[case(2, ChunkCompression::None)]
    #[case(3, ChunkCompression::Gzip(1))]
    #[case(16, ChunkCompression::None)]
    fn test_cascade_merge(#[case] merge_fan_in: usize, #[case] compression: ChunkCompression) {
        let mut input_shuffled = Vec::from_iter(0..500);
        input_shuffled.shuffle(&mut rand::thread_rng());
        let input: Vec<Result<i32, io::Error>> = input_shuffled.into_iter().map(Ok).collect();

        let sorter: ExternalSorter<i32, _> = ExternalSorterBuilder::new()
            .with_buffer(LimitedBufferBuilder::new(20, true))
            .with_tmp_dir(Path::new("./"))
            .with_compression(compression)
            .with_merge_fan_in(merge_fan_in)
            .build()
            .unwrap();

        let actual: Vec<i32> = sorter.sort(input).unwrap().map(Result::unwrap).collect();
        let stats = sorter.stats();

        assert_eq!(actual, Vec::from_iter(0..500));
        assert_eq!(stats.spilled_chunks, 25);
        assert!(stats.final_runs <= merge_fan_in);
        assert_eq!(stats.merge_passes > 0, 25 > merge_fan_in);
    }

    #[derive(Debug)]
    struct InputFailure;

    impl fmt::Display for InputFailure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "broken input")
        }
    }

    impl std::error::Error for InputFailure {}

    #[test]
    fn test_input_error() {
        let input: Vec<Result<i32, InputFailure>> = vec![Ok(1), Ok(2), Err(InputFailure), Ok(3)];

        let sorter: ExternalSorter<i32, InputFailure> = ExternalSorterBuilder::new()
            .with_buffer(LimitedBufferBuilder::new(1, false))
            .with_tmp_dir(Path::new("./"))
            .build()
            .unwrap();

        match sorter.sort(input) {
            Err(SortError::InputError(err)) => assert_eq!(err.to_string(), "broken input"),
            Err(err) => panic!("unexpected error: {}", err),
            Ok(_) => panic!("error expected"),
        }
    }

    #[test]
    fn test_invalid_fan_in() {
        let result: Result<ExternalSorter<i32, io::Error>, _> = ExternalSorterBuilder::new()
            .with_tmp_dir(Path::new("./"))
            .with_merge_fan_in(1)
            .build();

        assert!(matches!(result, Err(SortError::InvalidConfig(_))));
    }

    #[test]
    fn test_tmp_dir_removed_on_drop() {
        let sorter: ExternalSorter<i32, io::Error> = ExternalSorterBuilder::new()
            .with_tmp_dir(Path::new("./"))
            .build()
            .unwrap();

        let tmp_dir = sorter.tmp_dir().to_path_buf();
        assert!(tmp_dir.exists());

        drop(sorter);
        assert!(!tmp_dir.exists());
    }
}
