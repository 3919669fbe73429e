//! External chunks: sorted runs spilled to temporary files.

use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;

use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use tempfile;

/// External chunk error.
#[derive(Debug, thiserror::Error)]
pub enum ExternalChunkError {
    /// Temporary file creation failed.
    #[error("temporary file not created: {0}")]
    TempFile(#[source] io::Error),
    /// Common I/O error.
    #[error("chunk I/O operation failed: {0}")]
    IO(#[from] io::Error),
    /// Item serialization error.
    #[error("chunk serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    /// Item deserialization error.
    #[error("chunk deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
}

/// Chunk file compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkCompression {
    /// Items are stored as is.
    #[default]
    None,
    /// Items are stored in a gzip stream of the given level (0-9).
    Gzip(u32),
}

/// Sequential reader over a chunk file that knows how many items are left.
pub struct ChunkReader {
    inner: Box<dyn Read>,
    remaining: u64,
}

impl ChunkReader {
    /// Number of items not read yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Decodes the next item using the provided function.
    pub fn next_item<T, E, F>(&mut self, decode: F) -> Option<Result<T, E>>
    where
        F: FnOnce(&mut dyn Read) -> Result<T, E>,
    {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(decode(&mut *self.inner))
    }
}

/// External chunk interface. Provides methods for creating a chunk stored on file system and reading data from it.
pub trait ExternalChunk<T>: Sized + Iterator<Item = Result<T, ExternalChunkError>> {
    /// Builds an instance of an external chunk.
    ///
    /// The backing file is anonymous: it is removed from the directory right away and its space is reclaimed
    /// as soon as the chunk is dropped.
    fn build(
        dir: &tempfile::TempDir,
        items: impl IntoIterator<Item = T>,
        buf_size: Option<usize>,
        compression: ChunkCompression,
    ) -> Result<Self, ExternalChunkError> {
        let tmp_file = tempfile::tempfile_in(dir).map_err(ExternalChunkError::TempFile)?;

        let chunk_writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufWriter::new(tmp_file.try_clone()?),
        };

        let items_count = match compression {
            ChunkCompression::None => {
                let mut chunk_writer = chunk_writer;
                let items_count = Self::dump(&mut chunk_writer, items)?;
                chunk_writer.flush()?;
                items_count
            }
            ChunkCompression::Gzip(level) => {
                let mut encoder = GzEncoder::new(chunk_writer, flate2::Compression::new(level));
                let items_count = Self::dump(&mut encoder, items)?;
                encoder.finish()?.flush()?;
                items_count
            }
        };

        let mut tmp_file = tmp_file;
        tmp_file.rewind()?;

        let chunk_reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, tmp_file),
            None => io::BufReader::new(tmp_file),
        };
        let inner: Box<dyn Read> = match compression {
            ChunkCompression::None => Box::new(chunk_reader),
            ChunkCompression::Gzip(_) => Box::new(io::BufReader::new(GzDecoder::new(chunk_reader))),
        };

        return Ok(Self::new(ChunkReader {
            inner,
            remaining: items_count,
        }));
    }

    /// Creates and instance of an external chunk.
    fn new(reader: ChunkReader) -> Self;

    /// Dumps items to an external file. Returns the number of items written.
    fn dump<W: Write>(chunk_writer: &mut W, items: impl IntoIterator<Item = T>) -> Result<u64, ExternalChunkError>;
}

/// RMP (Rust MessagePack) external chunk implementation.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
pub struct RmpExternalChunk<T> {
    reader: ChunkReader,

    item_type: PhantomData<T>,
}

impl<T> RmpExternalChunk<T> {
    /// Number of items left in the chunk.
    pub fn remaining(&self) -> u64 {
        self.reader.remaining()
    }
}

impl<T> ExternalChunk<T> for RmpExternalChunk<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    fn new(reader: ChunkReader) -> Self {
        RmpExternalChunk {
            reader,
            item_type: PhantomData,
        }
    }

    fn dump<W: Write>(chunk_writer: &mut W, items: impl IntoIterator<Item = T>) -> Result<u64, ExternalChunkError> {
        let mut items_count = 0;
        for item in items.into_iter() {
            rmp_serde::encode::write(chunk_writer, &item)?;
            items_count += 1;
        }

        return Ok(items_count);
    }
}

impl<T> Iterator for RmpExternalChunk<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type Item = Result<T, ExternalChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader
            .next_item(|reader| rmp_serde::decode::from_read(reader).map_err(ExternalChunkError::from))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.reader.remaining() as usize;
        (remaining, Some(remaining))
    }
}
