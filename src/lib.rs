//! tilesegy - SEG-Y surveys as chunked, coordinate-addressable volumes
//!
//! Converts a SEG-Y file once into chunked arrays plus a geometry descriptor,
//! then serves random access by physical trace number or by
//! (inline, crossline, offset) coordinate.
//!
//! # Features
//!
//! - Geometry inference: axis values, sort order, gaps and duplicates
//! - Dense coordinate index persisted with the dataset
//! - Write-once chunked storage with Deflate or Zstd compression
//! - Local filesystem and in-memory backends (implement `IOManager` for others)
//! - Async I/O throughout
//!
//! # Example
//!
//! ```rust,ignore
//! use tilesegy::{ingest, ArrayStore, IngestConfig, SegyVolume, SliceRequest};
//!
//! # async fn example(reader: &dyn tilesegy::SegyReader) -> tilesegy::Result<()> {
//! let store = ArrayStore::open("file:///data/survey.tsgy").await?;
//! ingest(reader, &store, &IngestConfig::default()).await?;
//!
//! let volume = SegyVolume::open_store(store).await?;
//! let trace = volume.get_by_coordinate(1000, 2000, 0).await?;
//! let cube = volume.get_slice(&SliceRequest::all()).await?;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod catalog;
pub mod compression;
pub mod convert;
pub mod error;
pub mod geometry;
pub mod index;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod segy;
pub mod selection;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports
pub use access::{AccessConfig, SegyVolume, SliceRequest};
pub use catalog::{HeaderCatalog, HeaderFieldMap};
pub use compression::{CompressionLevel, CompressionMethod, Compressor};
pub use convert::{ingest, ChunkingConfig, IngestConfig};
pub use error::{Result, SegyError};
pub use geometry::{infer, AxisName, AxisSpec, GeometryDescriptor, SortOrder, StructuredGeometry};
pub use index::{
    build, build_with_policy, DuplicateCoordinateWarning, DuplicatePolicy, DuplicateReport,
    GapReport, TraceIndex,
};
pub use io::{IOManager, StorageBackend};
pub use layout::ArrayLayout;
pub use metadata::DatasetMetadata;
pub use segy::{MemorySegyReader, SegyReader};
pub use selection::{AxisRange, FilteredRange};
pub use storage::ArrayStore;
pub use types::{Coordinate, DataType, HeaderRole, RawTraceHeader, TraceHeader};

/// Version of the tilesegy implementation
pub const TILESEGY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Magic number opening every stored chunk
pub const CHUNK_MAGIC: &[u8; 4] = b"TSC1";
