//! One-time conversion of a SEG-Y file into a chunked dataset
//!
//! [`ingest`] reads every trace header, infers the survey geometry, builds the
//! coordinate index and writes samples and headers as chunked arrays. The
//! arrays of one ingestion share a generation group whose names are recorded
//! only in the dataset metadata document, which is written last. A dataset
//! whose ingestion failed, or was cancelled by dropping the future, has no
//! metadata and cannot be opened; its arrays are swept by the next ingestion.

use crate::catalog::{HeaderCatalog, HeaderFieldMap};
use crate::compression::{CompressionLevel, CompressionMethod};
use crate::error::{Result, SegyError};
use crate::geometry::{infer, GeometryDescriptor, SortOrder, StructuredGeometry};
use crate::index::{build_with_policy, DuplicatePolicy, TraceIndex};
use crate::layout::ArrayLayout;
use crate::metadata::{DatasetMetadata, SegyMetadata, DATASET_METADATA_KEY};
use crate::segy::SegyReader;
use crate::storage::ArrayStore;
use crate::types::{ArrayElement, DataType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

/// How stored arrays are cut into chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunk extent along the slow sort axis. The default of 1 keeps every
    /// line of the slow axis in its own chunk row.
    pub slow_tile: usize,

    /// Chunk extent along the fast sort axis
    pub fast_tile: usize,

    /// Chunk extent along samples; whole traces when unset
    pub sample_tile: Option<usize>,

    /// Traces per chunk for `[trace, ...]` arrays
    pub trace_tile: usize,

    pub compression: CompressionMethod,

    pub compression_level: CompressionLevel,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            slow_tile: 1,
            fast_tile: 64,
            sample_tile: None,
            trace_tile: 256,
            compression: CompressionMethod::Zstd,
            compression_level: CompressionLevel::default(),
        }
    }
}

impl ChunkingConfig {
    pub fn with_slow_tile(mut self, tile: usize) -> Self {
        self.slow_tile = tile;
        self
    }

    pub fn with_fast_tile(mut self, tile: usize) -> Self {
        self.fast_tile = tile;
        self
    }

    pub fn with_sample_tile(mut self, tile: usize) -> Self {
        self.sample_tile = Some(tile);
        self
    }

    pub fn with_trace_tile(mut self, tile: usize) -> Self {
        self.trace_tile = tile;
        self
    }

    pub fn with_compression(mut self, method: CompressionMethod, level: CompressionLevel) -> Self {
        self.compression = method;
        self.compression_level = level;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.slow_tile == 0
            || self.fast_tile == 0
            || self.trace_tile == 0
            || self.sample_tile == Some(0)
        {
            return Err(SegyError::Configuration(
                "chunk tiles must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn sample_chunk(&self, samples: usize) -> usize {
        self.sample_tile.unwrap_or(samples).max(1)
    }

    /// Layout of the `[inline, crossline, offset, sample]` data array
    pub fn grid_layout(&self, geometry: &StructuredGeometry, samples: usize) -> Result<ArrayLayout> {
        let [n_il, n_xl, n_off] = geometry.shape();
        let (il_tile, xl_tile) = match geometry.sorting {
            SortOrder::InlineSorted => (self.slow_tile, self.fast_tile),
            SortOrder::CrosslineSorted => (self.fast_tile, self.slow_tile),
        };
        let layout = ArrayLayout::new(
            vec![n_il, n_xl, n_off, samples],
            vec![il_tile, xl_tile, n_off.max(1), self.sample_chunk(samples)],
            DataType::F32,
        )?;
        Ok(layout.with_compression(self.compression, self.compression_level))
    }

    /// Layout of a `[trace, column]` array
    pub fn rows_layout(&self, rows: usize, columns: usize, data_type: DataType) -> Result<ArrayLayout> {
        let column_chunk = match data_type {
            DataType::F32 | DataType::F64 => self.sample_chunk(columns),
            DataType::I32 | DataType::I64 => columns.max(1),
        };
        let layout = ArrayLayout::new(
            vec![rows, columns],
            vec![self.trace_tile, column_chunk],
            data_type,
        )?;
        Ok(layout.with_compression(self.compression, self.compression_level))
    }
}

/// Settings for one ingestion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub header_fields: HeaderFieldMap,
    pub duplicate_policy: DuplicatePolicy,
    pub chunking: ChunkingConfig,
    /// Copied into the dataset metadata
    pub custom_metadata: BTreeMap<String, String>,
}

impl IngestConfig {
    /// Parse a JSON config; omitted fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SegyError::Configuration(e.to_string()))
    }

    pub fn with_header_fields(mut self, fields: HeaderFieldMap) -> Self {
        self.header_fields = fields;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_metadata.insert(key.into(), value.into());
        self
    }
}

/// Convert the survey behind `reader` into a dataset in `store`.
///
/// The store holds one dataset and has one writer at a time. Arrays of an
/// ingestion that never reached its metadata write are removed before a new
/// ingestion starts, and right away when the ingestion fails with an error.
///
/// Reader calls are synchronous. On a multi-threaded runtime they run under
/// [`tokio::task::block_in_place`]; on a current-thread runtime they run
/// inline, so a reader that blocks stalls that runtime until it returns.
pub async fn ingest<R: SegyReader + ?Sized>(
    reader: &R,
    store: &ArrayStore,
    config: &IngestConfig,
) -> Result<GeometryDescriptor> {
    config.chunking.validate()?;
    if store.has_metadata(DATASET_METADATA_KEY).await? {
        return Err(SegyError::AlreadyExists("dataset".to_string()));
    }
    remove_orphaned_arrays(store).await?;

    let trace_count = reader.trace_count();
    let samples = reader.samples_per_trace();
    tracing::info!(traces = trace_count, samples, "Starting SEG-Y ingestion");

    let catalog = run_blocking(|| HeaderCatalog::build(reader, &config.header_fields))?;
    let descriptor = infer(&catalog);
    let mut metadata = DatasetMetadata::new(descriptor.clone(), trace_count, reader.sample_axis());

    let index = match &descriptor {
        GeometryDescriptor::Unstructured { .. } => None,
        _ => {
            let (index, duplicates, gaps) =
                build_with_policy(&catalog, &descriptor, config.duplicate_policy)?;
            metadata = metadata.with_index(&index, config.duplicate_policy, duplicates, gaps);
            Some(index)
        }
    };
    drop(catalog);

    if metadata.sample_axis.len() != samples {
        return Err(SegyError::InvalidDimensions(format!(
            "sample axis has {} values for {} samples per trace",
            metadata.sample_axis.len(),
            samples
        )));
    }

    let generation = metadata.arrays.generation.clone();
    tracing::debug!(generation = %generation, "Writing arrays");
    let written = write_arrays(reader, store, config, &mut metadata, index.as_ref()).await;
    let persisted = match written {
        Ok(()) => {
            metadata = metadata.with_segy_metadata(SegyMetadata {
                text_header: reader.text_headers(),
                binary_header: reader.binary_header(),
                trace_header_mappings: config.header_fields.clone(),
            });
            for (key, value) in &config.custom_metadata {
                metadata.add_metadata(key.as_str(), value.as_str());
            }
            tracing::debug!(key = DATASET_METADATA_KEY, "Persisting dataset metadata");
            store.put_metadata(DATASET_METADATA_KEY, &metadata).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = persisted {
        tracing::warn!(error = %e, generation = %generation, "Ingestion failed, removing partial arrays");
        if let Err(cleanup) = store.delete_group(&generation).await {
            tracing::warn!(generation = %generation, error = %cleanup, "Could not remove partial arrays");
        }
        return Err(e);
    }

    tracing::info!(
        traces = trace_count,
        structured = descriptor.is_structured(),
        duplicates = metadata.duplicates.len(),
        gaps = metadata.gaps.len(),
        "Ingestion complete"
    );
    Ok(descriptor)
}

/// Drop array groups left by an ingestion that was cancelled or crashed
/// before its metadata was written
async fn remove_orphaned_arrays(store: &ArrayStore) -> Result<()> {
    for group in store.array_groups().await? {
        tracing::warn!(generation = %group, "Removing arrays of an unfinished ingestion");
        store.delete_group(&group).await?;
    }
    Ok(())
}

/// Run a synchronous reader call without starving other tasks of a
/// multi-threaded runtime
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

async fn write_arrays<R: SegyReader + ?Sized>(
    reader: &R,
    store: &ArrayStore,
    config: &IngestConfig,
    metadata: &mut DatasetMetadata,
    index: Option<&TraceIndex>,
) -> Result<()> {
    let chunking = &config.chunking;
    let samples = reader.samples_per_trace();
    let data_name = metadata.arrays.data.clone();

    match index {
        Some(index) => {
            let layout = chunking.grid_layout(index.geometry(), samples)?;
            write_array(store, &data_name, layout, |ranges| {
                grid_chunk(reader, index, ranges, samples)
            })
            .await?;

            let discarded = metadata.duplicates.discarded_traces();
            if !discarded.is_empty() {
                let name = metadata.arrays.duplicates_name();
                let layout = chunking.rows_layout(discarded.len(), samples, DataType::F32)?;
                write_array(store, &name, layout, |ranges| {
                    rows_chunk(reader, &discarded, ranges, samples)
                })
                .await?;
                metadata.arrays.duplicates = Some(name);
            }
        }
        None => {
            let traces: Vec<usize> = (0..reader.trace_count()).collect();
            let layout = chunking.rows_layout(traces.len(), samples, DataType::F32)?;
            write_array(store, &data_name, layout, |ranges| {
                rows_chunk(reader, &traces, ranges, samples)
            })
            .await?;
        }
    }

    // Columns come from the first trace; fields it lacks are not stored
    let fields: Vec<String> = if reader.trace_count() > 0 {
        run_blocking(|| reader.read_header(0))?.into_keys().collect()
    } else {
        Vec::new()
    };
    let layout = chunking.rows_layout(reader.trace_count(), fields.len(), DataType::I64)?;
    let headers_name = metadata.arrays.headers.clone();
    write_array(store, &headers_name, layout, |ranges| {
        let mut data = Vec::with_capacity(ranges[0].len() * ranges[1].len());
        for trace in ranges[0].clone() {
            let header = reader.read_header(trace)?;
            data.extend(
                fields[ranges[1].clone()]
                    .iter()
                    .map(|f| header.get(f).copied().unwrap_or(0)),
            );
        }
        Ok(data)
    })
    .await?;

    metadata.header_fields = fields;
    Ok(())
}

/// Write every chunk of a new array, aborting it on the first failure
async fn write_array<T, F>(
    store: &ArrayStore,
    name: &str,
    layout: ArrayLayout,
    mut chunk_data: F,
) -> Result<()>
where
    T: ArrayElement,
    F: FnMut(&[Range<usize>]) -> Result<Vec<T>>,
{
    let mut sink = store.create_array::<T>(name, layout).await?;
    let total = sink.layout().total_chunks();

    for chunk in 0..total {
        let coords = sink.layout().chunk_index_to_coords(chunk);
        let ranges = sink.layout().chunk_data_range(&coords);
        let written = match run_blocking(|| chunk_data(&ranges)) {
            Ok(data) => sink.write_chunk(&coords, &data).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(abort) = sink.abort().await {
                tracing::warn!(array = name, error = %abort, "Could not discard staged chunks");
            }
            return Err(e);
        }
        tracing::trace!(array = name, chunk, total, "Wrote chunk");
    }

    let handle = sink.commit().await?;
    tracing::info!(array = name, layout = %handle.layout().summary(), "Wrote array");
    Ok(())
}

fn read_trace<R: SegyReader + ?Sized>(reader: &R, trace: usize, samples: usize) -> Result<Vec<f32>> {
    let data = reader.read_samples(trace)?;
    if data.len() != samples {
        return Err(SegyError::InvalidDimensions(format!(
            "trace {} has {} samples, expected {}",
            trace,
            data.len(),
            samples
        )));
    }
    Ok(data)
}

/// Samples of one `[inline, crossline, offset, sample]` chunk; gap cells are zero
fn grid_chunk<R: SegyReader + ?Sized>(
    reader: &R,
    index: &TraceIndex,
    ranges: &[Range<usize>],
    samples: usize,
) -> Result<Vec<f32>> {
    let cells = ranges[0].len() * ranges[1].len() * ranges[2].len();
    let mut data = Vec::with_capacity(cells * ranges[3].len());
    for il in ranges[0].clone() {
        for xl in ranges[1].clone() {
            for off in ranges[2].clone() {
                match index.get_position([il, xl, off]) {
                    Some(trace) => {
                        let trace_samples = read_trace(reader, trace, samples)?;
                        data.extend_from_slice(&trace_samples[ranges[3].clone()]);
                    }
                    None => data.extend(std::iter::repeat(0.0).take(ranges[3].len())),
                }
            }
        }
    }
    Ok(data)
}

/// Samples of one `[row, sample]` chunk where row `r` holds trace `traces[r]`
fn rows_chunk<R: SegyReader + ?Sized>(
    reader: &R,
    traces: &[usize],
    ranges: &[Range<usize>],
    samples: usize,
) -> Result<Vec<f32>> {
    let mut data = Vec::with_capacity(ranges[0].len() * ranges[1].len());
    for row in ranges[0].clone() {
        let trace_samples = read_trace(reader, traces[row], samples)?;
        data.extend_from_slice(&trace_samples[ranges[1].clone()]);
    }
    Ok(data)
}
