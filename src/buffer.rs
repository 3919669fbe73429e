//! Chunk buffers.
//!
//! A chunk buffer collects incoming items until their total weight reaches the limit, then the sorter sorts it
//! and turns it into a run. Items are weighed either by count ([`ItemCount`]) or by the memory they occupy
//! ([`DeepSize`], `memory-limit` feature).

use std::vec;

use rayon;

/// Default number of records held in memory before a chunk is spilled to disk.
pub const DEFAULT_MAX_RECORDS: usize = 1_000_000;

/// Default memory held by a memory limited chunk.
#[cfg(feature = "memory-limit")]
pub const DEFAULT_MAX_MEMORY: u64 = 512 * 1024 * 1024;

// upper bound of the up-front allocation, larger buffers grow on demand
const MAX_PREALLOCATED: usize = 64 * 1024;

/// Buffer builder.
pub trait ChunkBufferBuilder<T: Send>: Default {
    type Buffer: ChunkBuffer<T>;

    /// Creates a new buffer.
    fn build(&self) -> Self::Buffer;
}

/// Base limited buffer interface.
pub trait ChunkBuffer<T: Send>:
    IntoIterator<Item = T, IntoIter = vec::IntoIter<T>> + rayon::slice::ParallelSliceMut<T> + Send
{
    /// Adds a new element to the buffer.
    fn push(&mut self, item: T);

    /// Returns buffer length
    fn len(&self) -> usize;

    /// Checks if the buffer reached the limit.
    fn is_full(&self) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Weight of a buffered item, counted against the buffer limit.
pub trait ItemWeight<T>: Copy + Send + Sync {
    fn weight(&self, item: &T) -> u64;
}

/// Every item weighs one: the limit is an item count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemCount;

impl<T> ItemWeight<T> for ItemCount {
    fn weight(&self, _item: &T) -> u64 {
        1
    }
}

/// Items weigh their deep size in bytes: the limit is a memory size.
#[cfg(feature = "memory-limit")]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepSize;

#[cfg(feature = "memory-limit")]
impl<T: deepsize::DeepSizeOf> ItemWeight<T> for DeepSize {
    fn weight(&self, item: &T) -> u64 {
        item.deep_size_of() as u64
    }
}

/// Builds buffers holding items up to a total weight.
#[derive(Debug, Clone)]
pub struct WeightedBufferBuilder<W> {
    limit: u64,
    reserve: usize,
    weigher: W,
}

impl<W> WeightedBufferBuilder<W> {
    /// Buffer limit, in the weigher units.
    pub fn limit(&self) -> u64 {
        self.limit
    }
}

/// Buffers limited by the number of items.
pub type LimitedBufferBuilder = WeightedBufferBuilder<ItemCount>;
pub type LimitedBuffer<T> = WeightedBuffer<T, ItemCount>;

impl WeightedBufferBuilder<ItemCount> {
    /// # Arguments
    /// * `max_items` - Maximum number of items per chunk
    /// * `preallocate` - Reserve buffer memory up-front
    pub fn new(max_items: usize, preallocate: bool) -> Self {
        WeightedBufferBuilder {
            limit: max_items as u64,
            reserve: if preallocate { max_items.min(MAX_PREALLOCATED) } else { 0 },
            weigher: ItemCount,
        }
    }
}

impl Default for WeightedBufferBuilder<ItemCount> {
    fn default() -> Self {
        WeightedBufferBuilder::<ItemCount>::new(DEFAULT_MAX_RECORDS, false)
    }
}

/// Buffers limited by the memory their items occupy.
#[cfg(feature = "memory-limit")]
pub type MemoryLimitedBufferBuilder = WeightedBufferBuilder<DeepSize>;
#[cfg(feature = "memory-limit")]
pub type MemoryLimitedBuffer<T> = WeightedBuffer<T, DeepSize>;

#[cfg(feature = "memory-limit")]
impl WeightedBufferBuilder<DeepSize> {
    /// # Arguments
    /// * `max_memory` - Maximum chunk size in bytes
    pub fn new(max_memory: u64) -> Self {
        WeightedBufferBuilder {
            limit: max_memory,
            reserve: 0,
            weigher: DeepSize,
        }
    }
}

#[cfg(feature = "memory-limit")]
impl Default for WeightedBufferBuilder<DeepSize> {
    fn default() -> Self {
        WeightedBufferBuilder::<DeepSize>::new(DEFAULT_MAX_MEMORY)
    }
}

impl<T, W> ChunkBufferBuilder<T> for WeightedBufferBuilder<W>
where
    T: Send,
    W: ItemWeight<T>,
    WeightedBufferBuilder<W>: Default,
{
    type Buffer = WeightedBuffer<T, W>;

    fn build(&self) -> Self::Buffer {
        WeightedBuffer {
            items: Vec::with_capacity(self.reserve),
            weight: 0,
            limit: self.limit,
            weigher: self.weigher,
        }
    }
}

/// Buffer of items with their accumulated weight.
pub struct WeightedBuffer<T, W> {
    items: Vec<T>,
    weight: u64,
    limit: u64,
    weigher: W,
}

impl<T, W> WeightedBuffer<T, W> {
    /// Total weight of the buffered items.
    pub fn weight(&self) -> u64 {
        self.weight
    }
}

impl<T, W> ChunkBuffer<T> for WeightedBuffer<T, W>
where
    T: Send,
    W: ItemWeight<T>,
{
    fn push(&mut self, item: T) {
        self.weight += self.weigher.weight(&item);
        self.items.push(item);
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_full(&self) -> bool {
        self.weight >= self.limit
    }
}

impl<T, W> IntoIterator for WeightedBuffer<T, W> {
    type Item = T;
    type IntoIter = vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T: Send, W: Send> rayon::slice::ParallelSliceMut<T> for WeightedBuffer<T, W> {
    fn as_parallel_slice_mut(&mut self) -> &mut [T] {
        self.items.as_mut_slice()
    }
}

#[cfg(test)]
mod test {
    use super::{ChunkBuffer, ChunkBufferBuilder, LimitedBuffer, LimitedBufferBuilder, DEFAULT_MAX_RECORDS};

    #[test]
    fn test_limited_buffer() {
        let builder = LimitedBufferBuilder::new(2, true);
        let mut buffer: LimitedBuffer<i32> = builder.build();
        assert!(buffer.is_empty());

        buffer.push(0);
        assert_eq!(buffer.is_full(), false);
        buffer.push(1);
        assert_eq!(buffer.is_full(), true);
        assert_eq!(buffer.weight(), 2);

        assert_eq!(Vec::from_iter(buffer), vec![0, 1]);
    }

    #[test]
    fn test_default_limit() {
        let builder = LimitedBufferBuilder::default();
        assert_eq!(builder.limit(), DEFAULT_MAX_RECORDS as u64);

        let mut buffer: LimitedBuffer<u8> = builder.build();
        buffer.push(1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.is_full(), false);
    }

    #[cfg(feature = "memory-limit")]
    #[test]
    fn test_memory_limited_buffer() {
        use deepsize::DeepSizeOf;

        use super::{MemoryLimitedBuffer, MemoryLimitedBufferBuilder};
        use crate::format::Format;
        use crate::input::Origin;
        use crate::record::Record;

        let record = |line: u64| {
            Record::parse(Format::Bed, Origin { file: 0, line }, format!("chr1\t{}\t{}", line, line + 1)).unwrap()
        };
        let (first, second) = (record(1), record(2));
        let (first_size, second_size) = (first.deep_size_of() as u64, second.deep_size_of() as u64);
        let expected = vec![first.clone(), second.clone()];

        let builder = MemoryLimitedBufferBuilder::new(first_size + second_size);
        let mut buffer: MemoryLimitedBuffer<Record> = builder.build();

        buffer.push(first);
        assert_eq!(buffer.weight(), first_size);
        assert_eq!(buffer.is_full(), false);

        buffer.push(second);
        assert_eq!(buffer.weight(), first_size + second_size);
        assert_eq!(buffer.is_full(), true);

        assert_eq!(Vec::from_iter(buffer), expected);
    }
}
