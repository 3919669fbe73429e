//! Binary heap merger.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::error::Error;

// heap entry, ordered in reverse so that the max-heap pops the smallest item first
struct HeapEntry<T, F> {
    item: T,
    chunk_idx: usize,
    compare: F,
}

impl<T, F> PartialEq for HeapEntry<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, F> Eq for HeapEntry<T, F> where F: Fn(&T, &T) -> Ordering {}

impl<T, F> PartialOrd for HeapEntry<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, F> Ord for HeapEntry<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn cmp(&self, other: &Self) -> Ordering {
        // equal items are taken from the earliest created chunk first
        (self.compare)(&self.item, &other.item)
            .then(self.chunk_idx.cmp(&other.chunk_idx))
            .reverse()
    }
}

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of chunks (inputs).
pub struct BinaryHeapMerger<T, E, F, C>
where
    E: Error,
    F: Fn(&T, &T) -> Ordering + Copy,
    C: IntoIterator<Item = Result<T, E>>,
{
    items: BinaryHeap<HeapEntry<T, F>>,
    chunks: Vec<C::IntoIter>,
    compare: F,
    initiated: bool,
    failed: bool,
}

impl<T, E, F, C> BinaryHeapMerger<T, E, F, C>
where
    E: Error,
    F: Fn(&T, &T) -> Ordering + Copy,
    C: IntoIterator<Item = Result<T, E>>,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk items should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one, in their creation order
    /// * `compare` - Function to be used to compare items
    pub fn new<I>(chunks: I, compare: F) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let items = BinaryHeap::with_capacity(chunks.len());

        return BinaryHeapMerger {
            chunks,
            items,
            compare,
            initiated: false,
            failed: false,
        };
    }

    fn advance(&mut self, chunk_idx: usize) -> Result<(), E> {
        if let Some(item) = self.chunks[chunk_idx].next() {
            self.items.push(HeapEntry {
                item: item?,
                chunk_idx,
                compare: self.compare,
            });
        }
        return Ok(());
    }
}

impl<T, E, F, C> Iterator for BinaryHeapMerger<T, E, F, C>
where
    E: Error,
    F: Fn(&T, &T) -> Ordering + Copy,
    C: IntoIterator<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if !self.initiated {
            self.initiated = true;
            for chunk_idx in 0..self.chunks.len() {
                if let Err(err) = self.advance(chunk_idx) {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }

        let entry = self.items.pop()?;
        if let Err(err) = self.advance(entry.chunk_idx) {
            self.failed = true;
            return Some(Err(err));
        }

        return Some(Ok(entry.item));
    }
}

/// Drops items equal to the previously emitted one.
///
/// The input is expected to be sorted so that equal items are adjacent.
pub struct Dedup<I, T, F> {
    inner: I,
    pending: Option<T>,
    same: F,
    dropped: u64,
}

impl<I, T, E, F> Dedup<I, T, F>
where
    I: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> bool,
{
    /// # Arguments
    /// * `inner` - Sorted input
    /// * `same` - Function deciding whether two items are duplicates
    pub fn new(inner: I, same: F) -> Self {
        Dedup {
            inner,
            pending: None,
            same,
            dropped: 0,
        }
    }

    /// Number of items dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<I, T, E, F> Iterator for Dedup<I, T, F>
where
    I: Iterator<Item = Result<T, E>>,
    F: Fn(&T, &T) -> bool,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next() {
                None => return self.pending.take().map(Ok),
                Some(Err(err)) => {
                    self.pending = None;
                    return Some(Err(err));
                }
                Some(Ok(item)) => match self.pending.take() {
                    None => self.pending = Some(item),
                    Some(previous) if (self.same)(&previous, &item) => {
                        self.dropped += 1;
                        self.pending = Some(previous);
                    }
                    Some(previous) => {
                        self.pending = Some(item);
                        return Some(Ok(previous));
                    }
                },
            }
        }
    }
}
