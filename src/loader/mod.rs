//! Loading dataset pairs from raw record streams.
//!
//! # Architecture
//!
//! - [`source`] - raw record streams (argument groups, JSONL)
//! - [`delimited`] - CSV record stream
//! - [`mapping`] - [`FieldMapping`], the raw record → element builder
//! - [`chunked`] - [`ChunkedLoader`], concurrent chunk-by-chunk reconciliation
//!
//! A load wires one source per side through a builder into the loader:
//!
//! ```no_run
//! use std::path::Path;
//! use importsync::loader::{ChunkedLoader, FieldMapping, JsonlSource, LoaderConfig};
//! use importsync::sync::Strategy;
//!
//! # fn main() -> importsync::Result<()> {
//! let mapping = FieldMapping::new(["id"], Vec::<String>::new())?;
//! let loader = ChunkedLoader::new(LoaderConfig::new(1024, Strategy::Full)?)?;
//! let summary = loader.run(
//!     JsonlSource::open(Path::new("feed.jsonl"))?,
//!     JsonlSource::open(Path::new("current.jsonl"))?,
//!     |raw| mapping.build(raw),
//!     |raw| mapping.build(raw),
//!     |chunk| {
//!         println!("chunk {}: {:?}", chunk.index, chunk.destination.diff());
//!         Ok(())
//!     },
//! )?;
//! println!("{} changes", summary.total_changes());
//! # Ok(())
//! # }
//! ```

pub mod chunked;
pub mod delimited;
pub mod mapping;
pub mod source;

pub use chunked::{CancelToken, Chunk, ChunkedLoader, DEFAULT_CHUNK_SIZE, LoaderConfig};
pub use delimited::{Column, CsvOptions, CsvSource};
pub use mapping::FieldMapping;
pub use source::{ArgsSource, JsonlSource, RawRecord};
