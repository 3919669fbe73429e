//! `genome-sort` sorts BED interval and VCF variant files in genomic order.
//!
//! Records are ordered by chromosome, then by position, and written back verbatim. Inputs larger than the
//! available memory are handled by an external merge sort: records are collected into bounded chunks, each
//! chunk is sorted in parallel and spilled to a temporary file as a sorted run, and the runs are merged back
//! with a k-way merge. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `genome-sort` supports the following features:
//!
//! * **Natural chromosome order:**
//!   chromosome names are compared with version ordering (`chr2` before `chr10`), plain byte order is available
//!   as well.
//! * **Stable and unique modes:**
//!   records with equal keys can keep their input order, exact duplicates can be dropped.
//! * **Compressed input:**
//!   gzip (including BGZF) inputs are detected by content and decoded on the fly.
//! * **Multithreading support:**
//!   chunks are sorted in multiple threads.
//! * **Memory limit support:**
//!   chunks can be bounded by the memory their records occupy instead of a record count
//!   (`memory-limit` feature required).
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use genome_sort::{GenomeSortBuilder, InputSource, Output};
//!
//! fn main() {
//!     let sort = GenomeSortBuilder::new()
//!         .with_tmp_dir(Path::new("./"))
//!         .with_max_records(100_000)
//!         .with_unique(true)
//!         .build()
//!         .unwrap();
//!
//!     let inputs = vec![InputSource::from("peaks1.bed.gz"), InputSource::from("peaks2.bed")];
//!     let summary = sort.run(&inputs, &Output::from("sorted.bed")).unwrap();
//!
//!     println!("{} records written", summary.records_written);
//! }
//! ```

pub mod buffer;
pub mod chunk;
pub mod collate;
pub mod compare;
pub mod error;
pub mod format;
pub mod header;
pub mod input;
pub mod merger;
pub mod pipeline;
pub mod record;
pub mod sort;
pub mod writer;

pub use buffer::{ChunkBuffer, ChunkBufferBuilder, ItemWeight, LimitedBuffer, LimitedBufferBuilder, WeightedBufferBuilder};
pub use chunk::{ChunkCompression, ExternalChunk, RmpExternalChunk};
pub use collate::ChromOrder;
pub use compare::{RecordOrder, TieBreak};
pub use error::{Error, Result};
pub use format::Format;
pub use input::{InputOpener, InputSource};
pub use merger::{BinaryHeapMerger, Dedup};
pub use pipeline::{GenomeSort, GenomeSortBuilder, SortSummary};
pub use record::Record;
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError};
pub use writer::Output;
