//! Structured access to a converted dataset - main API for reading surveys

use crate::error::{Result, SegyError};
use crate::geometry::{AxisName, GeometryDescriptor, SortOrder, StructuredGeometry};
use crate::index::{DuplicateReport, GapReport, TraceIndex};
use crate::metadata::{DatasetMetadata, DATASET_METADATA_KEY};
use crate::selection::{AxisRange, FilteredRange};
use crate::storage::{ArrayHandle, ArrayStore};
use crate::types::{Coordinate, RawTraceHeader};
use ndarray::{s, Array2, Array3, Array4, Axis, Ix2, Ix4};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Read-side settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Sample value returned for every sample of a gap cell
    pub fill_value: f32,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self { fill_value: 0.0 }
    }
}

impl AccessConfig {
    pub fn with_fill_value(mut self, fill_value: f32) -> Self {
        self.fill_value = fill_value;
        self
    }
}

/// Coordinate ranges of a [`SegyVolume::get_slice`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceRequest {
    pub inline: AxisRange,
    pub crossline: AxisRange,
    pub offset: AxisRange,
    /// Sample indices; whole traces when unset
    pub samples: Option<Range<usize>>,
}

impl SliceRequest {
    /// The whole survey
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_inline(mut self, range: AxisRange) -> Self {
        self.inline = range;
        self
    }

    pub fn with_crossline(mut self, range: AxisRange) -> Self {
        self.crossline = range;
        self
    }

    pub fn with_offset(mut self, range: AxisRange) -> Self {
        self.offset = range;
        self
    }

    pub fn with_samples(mut self, samples: Range<usize>) -> Self {
        self.samples = Some(samples);
        self
    }
}

/// Grid-side state of a structured dataset
struct GridAccess {
    index: TraceIndex,
    /// Grid position of every physical trace kept in the grid
    positions: Vec<Option<[usize; 3]>>,
    /// Row in the duplicates array of every discarded trace
    duplicate_rows: HashMap<usize, usize>,
    duplicates: Option<ArrayHandle<f32>>,
}

/// An open converted dataset.
///
/// The volume owns its store handle; dropping it releases everything. All
/// query methods take `&self` and can run concurrently.
pub struct SegyVolume {
    store: ArrayStore,
    metadata: DatasetMetadata,
    data: ArrayHandle<f32>,
    headers: ArrayHandle<i64>,
    grid: Option<GridAccess>,
    config: AccessConfig,
}

impl SegyVolume {
    /// Open the dataset stored at a URL
    pub async fn open(url: &str) -> Result<Self> {
        Self::open_store(ArrayStore::open(url).await?).await
    }

    /// Open the dataset held by `store`
    pub async fn open_store(store: ArrayStore) -> Result<Self> {
        let metadata: DatasetMetadata = store
            .get_metadata(DATASET_METADATA_KEY)
            .await
            .map_err(|e| match e {
                SegyError::NotFound(_) => SegyError::NotFound("dataset".to_string()),
                other => other,
            })?;
        metadata.check_version()?;

        let data = store.open_array::<f32>(&metadata.arrays.data).await?;
        let headers = store.open_array::<i64>(&metadata.arrays.headers).await?;
        if data.shape().last().copied() != Some(metadata.samples_per_trace()) {
            return Err(SegyError::Metadata(format!(
                "data array shape {:?} does not hold {} samples per trace",
                data.shape(),
                metadata.samples_per_trace()
            )));
        }

        let grid = match metadata.trace_index()? {
            Some(index) => {
                let positions = index.trace_positions(metadata.trace_count);
                let discarded = metadata.duplicates.discarded_traces();
                let duplicates = match (&metadata.arrays.duplicates, discarded.is_empty()) {
                    (_, true) => None,
                    (Some(name), false) => Some(store.open_array::<f32>(name).await?),
                    (None, false) => {
                        return Err(SegyError::Metadata(
                            "discarded duplicates without a duplicates array".to_string(),
                        ))
                    }
                };
                let duplicate_rows = discarded
                    .into_iter()
                    .enumerate()
                    .map(|(row, trace)| (trace, row))
                    .collect();
                Some(GridAccess {
                    index,
                    positions,
                    duplicate_rows,
                    duplicates,
                })
            }
            None => None,
        };

        tracing::debug!(
            traces = metadata.trace_count,
            structured = grid.is_some(),
            "Opened dataset"
        );
        Ok(Self {
            store,
            metadata,
            data,
            headers,
            grid,
            config: AccessConfig::default(),
        })
    }

    pub fn with_config(mut self, config: AccessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn store(&self) -> &ArrayStore {
        &self.store
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn geometry(&self) -> &GeometryDescriptor {
        &self.metadata.geometry
    }

    pub fn is_structured(&self) -> bool {
        self.grid.is_some()
    }

    /// Coordinate lookup; None for unstructured datasets
    pub fn index(&self) -> Option<&TraceIndex> {
        self.grid.as_ref().map(|g| &g.index)
    }

    /// Detected sort order; None when unstructured
    pub fn sorting(&self) -> Option<SortOrder> {
        self.metadata.geometry.sorting()
    }

    pub fn trace_count(&self) -> usize {
        self.metadata.trace_count
    }

    pub fn samples_per_trace(&self) -> usize {
        self.metadata.samples_per_trace()
    }

    /// Textual file headers
    pub fn text(&self) -> &[String] {
        &self.metadata.segy.text_header
    }

    /// Binary file header fields
    pub fn bin(&self) -> &BTreeMap<String, i64> {
        &self.metadata.segy.binary_header
    }

    /// Time or depth of every sample
    pub fn samples(&self) -> &[f64] {
        &self.metadata.sample_axis
    }

    pub fn duplicates(&self) -> &DuplicateReport {
        &self.metadata.duplicates
    }

    pub fn gaps(&self) -> &GapReport {
        &self.metadata.gaps
    }

    /// Column names of [`SegyVolume::trace_headers`]
    pub fn header_fields(&self) -> &[String] {
        &self.metadata.header_fields
    }

    fn structured(&self) -> Result<(&StructuredGeometry, &GridAccess)> {
        let geometry = self.metadata.geometry.require_structured()?;
        let grid = self.grid.as_ref().ok_or_else(|| {
            SegyError::Metadata("structured dataset without a trace index".to_string())
        })?;
        Ok((geometry, grid))
    }

    /// Ordered values of an axis (`"inline"`, `"crossline"` or `"offset"`)
    pub fn axis_values(&self, axis: &str) -> Result<&[i32]> {
        let name: AxisName = axis.parse()?;
        let geometry = self.metadata.geometry.require_structured()?;
        Ok(geometry.axis(name).values())
    }

    fn check_trace(&self, trace: usize) -> Result<()> {
        if trace >= self.trace_count() {
            return Err(SegyError::IndexOutOfRange {
                index: trace,
                len: self.trace_count(),
            });
        }
        Ok(())
    }

    fn check_samples(&self, samples: &Range<usize>) -> Result<()> {
        if samples.start > samples.end || samples.end > self.samples_per_trace() {
            return Err(SegyError::OutOfBounds(format!(
                "sample range {:?} outside 0..{}",
                samples,
                self.samples_per_trace()
            )));
        }
        Ok(())
    }

    /// Samples of a physical trace, in file order
    pub async fn get_trace(&self, trace: usize) -> Result<Vec<f32>> {
        self.get_trace_samples(trace, 0..self.samples_per_trace())
            .await
    }

    /// A sample range of a physical trace
    pub async fn get_trace_samples(&self, trace: usize, samples: Range<usize>) -> Result<Vec<f32>> {
        self.check_trace(trace)?;
        self.check_samples(&samples)?;
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let Some(grid) = &self.grid else {
            let block = self.data.read_slice(&[trace..trace + 1, samples]).await?;
            return Ok(block.iter().copied().collect());
        };

        if let Some([il, xl, off]) = grid.positions.get(trace).copied().flatten() {
            let block = self
                .data
                .read_slice(&[il..il + 1, xl..xl + 1, off..off + 1, samples])
                .await?;
            return Ok(block.iter().copied().collect());
        }

        match (grid.duplicate_rows.get(&trace), &grid.duplicates) {
            (Some(&row), Some(duplicates)) => {
                let block = duplicates.read_slice(&[row..row + 1, samples]).await?;
                Ok(block.iter().copied().collect())
            }
            _ => Err(SegyError::Metadata(format!(
                "trace {} is neither in the grid nor in the duplicates array",
                trace
            ))),
        }
    }

    /// Consecutive physical traces as `[trace, sample]`, in file order.
    ///
    /// Whole traces when `samples` is unset. Grid traces are read with one
    /// request over their bounding box, discarded duplicates with another.
    pub async fn get_traces(
        &self,
        traces: Range<usize>,
        samples: Option<Range<usize>>,
    ) -> Result<Array2<f32>> {
        self.check_trace_range(&traces)?;
        let samples = samples.unwrap_or(0..self.samples_per_trace());
        self.check_samples(&samples)?;
        let mut out = Array2::zeros((traces.len(), samples.len()));
        if out.is_empty() {
            return Ok(out);
        }

        let Some(grid) = &self.grid else {
            return self
                .data
                .read_slice(&[traces, samples])
                .await?
                .into_dimensionality::<Ix2>()
                .map_err(|e| SegyError::InvalidFormat(e.to_string()));
        };

        let mut in_grid = Vec::new();
        let mut discarded = Vec::new();
        for (row, trace) in traces.clone().enumerate() {
            match grid.positions.get(trace).copied().flatten() {
                Some(position) => in_grid.push((row, position)),
                None => match grid.duplicate_rows.get(&trace) {
                    Some(&duplicate) => discarded.push((row, duplicate)),
                    None => {
                        return Err(SegyError::Metadata(format!(
                            "trace {} is neither in the grid nor in the duplicates array",
                            trace
                        )))
                    }
                },
            }
        }

        if !in_grid.is_empty() {
            let bounds: Vec<Range<usize>> = (0..3)
                .map(|dim| {
                    let lo = in_grid.iter().map(|(_, p)| p[dim]).min().unwrap_or(0);
                    let hi = in_grid.iter().map(|(_, p)| p[dim]).max().unwrap_or(0);
                    lo..hi + 1
                })
                .collect();
            let block = self
                .data
                .read_slice(&[
                    bounds[0].clone(),
                    bounds[1].clone(),
                    bounds[2].clone(),
                    samples.clone(),
                ])
                .await?
                .into_dimensionality::<Ix4>()
                .map_err(|e| SegyError::InvalidFormat(e.to_string()))?;
            for &(row, [il, xl, off]) in &in_grid {
                out.row_mut(row).assign(&block.slice(s![
                    il - bounds[0].start,
                    xl - bounds[1].start,
                    off - bounds[2].start,
                    ..
                ]));
            }
        }

        if !discarded.is_empty() {
            let duplicates = grid.duplicates.as_ref().ok_or_else(|| {
                SegyError::Metadata("discarded duplicates without a duplicates array".to_string())
            })?;
            let lo = discarded.iter().map(|&(_, d)| d).min().unwrap_or(0);
            let hi = discarded.iter().map(|&(_, d)| d).max().unwrap_or(0);
            let block = duplicates
                .read_slice(&[lo..hi + 1, samples])
                .await?
                .into_dimensionality::<Ix2>()
                .map_err(|e| SegyError::InvalidFormat(e.to_string()))?;
            for &(row, duplicate) in &discarded {
                out.row_mut(row).assign(&block.row(duplicate - lo));
            }
        }
        Ok(out)
    }

    /// Samples of the trace at a coordinate
    pub async fn get_by_coordinate(&self, inline: i32, crossline: i32, offset: i32) -> Result<Vec<f32>> {
        let (geometry, grid) = self.structured()?;
        let coordinate = Coordinate::new(inline, crossline, offset);
        let position = geometry
            .position(&coordinate)
            .ok_or(SegyError::CoordinateOutOfRange(coordinate))?;
        if grid.index.get_position(position).is_none() {
            return Err(SegyError::Gap(coordinate));
        }

        let [il, xl, off] = position;
        let block = self
            .data
            .read_slice(&[il..il + 1, xl..xl + 1, off..off + 1, 0..self.samples_per_trace()])
            .await?;
        Ok(block.iter().copied().collect())
    }

    /// Dense `[inline, crossline, offset, sample]` block.
    ///
    /// Axis ranges select by value. Every sample of a gap cell is set to
    /// [`AccessConfig::fill_value`]; gaps never fail the slice.
    pub async fn get_slice(&self, request: &SliceRequest) -> Result<Array4<f32>> {
        let (geometry, grid) = self.structured()?;
        let samples = request
            .samples
            .clone()
            .unwrap_or(0..self.samples_per_trace());
        self.check_samples(&samples)?;

        let selected = [
            select_positions(geometry, AxisName::Inline, &request.inline)?,
            select_positions(geometry, AxisName::Crossline, &request.crossline)?,
            select_positions(geometry, AxisName::Offset, &request.offset)?,
        ];
        let mut out = Array4::from_elem(
            (
                selected[0].len(),
                selected[1].len(),
                selected[2].len(),
                samples.len(),
            ),
            self.config.fill_value,
        );
        if out.is_empty() {
            return Ok(out);
        }

        // One read over the bounding box of the selection
        let bounds: Vec<Range<usize>> = selected
            .iter()
            .map(|positions| {
                let lo = positions.iter().copied().min().unwrap_or(0);
                let hi = positions.iter().copied().max().unwrap_or(0);
                lo..hi + 1
            })
            .collect();
        let block = self
            .data
            .read_slice(&[
                bounds[0].clone(),
                bounds[1].clone(),
                bounds[2].clone(),
                samples.clone(),
            ])
            .await?
            .into_dimensionality::<Ix4>()
            .map_err(|e| SegyError::InvalidFormat(e.to_string()))?;

        for (a, &il) in selected[0].iter().enumerate() {
            for (b, &xl) in selected[1].iter().enumerate() {
                for (c, &off) in selected[2].iter().enumerate() {
                    if grid.index.get_position([il, xl, off]).is_none() {
                        continue;
                    }
                    out.slice_mut(s![a, b, c, ..]).assign(&block.slice(s![
                        il - bounds[0].start,
                        xl - bounds[1].start,
                        off - bounds[2].start,
                        ..
                    ]));
                }
            }
        }
        Ok(out)
    }

    /// One inline as `[crossline, offset, sample]`
    pub async fn inline(&self, value: i32) -> Result<Array3<f32>> {
        self.line(AxisName::Inline, value).await
    }

    /// One crossline as `[inline, offset, sample]`
    pub async fn crossline(&self, value: i32) -> Result<Array3<f32>> {
        self.line(AxisName::Crossline, value).await
    }

    async fn line(&self, axis: AxisName, value: i32) -> Result<Array3<f32>> {
        let (geometry, _) = self.structured()?;
        if !geometry.axis(axis).contains(value) {
            return Err(SegyError::OutOfBounds(format!(
                "{} {} is not in the survey",
                axis, value
            )));
        }
        let request = match axis {
            AxisName::Inline => SliceRequest::all().with_inline(AxisRange::single(value)),
            AxisName::Crossline => SliceRequest::all().with_crossline(AxisRange::single(value)),
            AxisName::Offset => SliceRequest::all().with_offset(AxisRange::single(value)),
        };
        let slice = self.get_slice(&request).await?;
        Ok(slice.index_axis_move(Axis(axis.dimension()), 0))
    }

    /// One sample of every cell as `[inline, crossline, offset]`
    pub async fn depth_slice(&self, sample: usize) -> Result<Array3<f32>> {
        if sample >= self.samples_per_trace() {
            return Err(SegyError::OutOfBounds(format!(
                "sample {} outside 0..{}",
                sample,
                self.samples_per_trace()
            )));
        }
        let slice = self
            .get_slice(&SliceRequest::all().with_samples(sample..sample + 1))
            .await?;
        Ok(slice.index_axis_move(Axis(3), 0))
    }

    fn check_trace_range(&self, traces: &Range<usize>) -> Result<()> {
        if traces.end > self.trace_count() {
            return Err(SegyError::IndexOutOfRange {
                index: traces.end - 1,
                len: self.trace_count(),
            });
        }
        if traces.start > traces.end {
            return Err(SegyError::OutOfBounds(format!(
                "trace range {:?} is reversed",
                traces
            )));
        }
        Ok(())
    }

    /// Every stored header field of one trace
    pub async fn trace_header(&self, trace: usize) -> Result<RawTraceHeader> {
        self.check_trace(trace)?;
        let mut headers = self.trace_headers(trace..trace + 1).await?;
        Ok(headers.pop().unwrap_or_default())
    }

    /// Every stored header field of a range of traces
    pub async fn trace_headers(&self, traces: Range<usize>) -> Result<Vec<RawTraceHeader>> {
        self.check_trace_range(&traces)?;
        let fields = self.header_fields();
        if traces.is_empty() {
            return Ok(Vec::new());
        }
        if fields.is_empty() {
            return Ok(vec![RawTraceHeader::new(); traces.len()]);
        }

        let block = self
            .headers
            .read_slice(&[traces, 0..fields.len()])
            .await?;
        Ok(block
            .outer_iter()
            .map(|row| fields.iter().cloned().zip(row.iter().copied()).collect())
            .collect())
    }

    /// One header field for a range of traces
    pub async fn header_column(&self, field: &str, traces: Range<usize>) -> Result<Vec<i64>> {
        let column = self
            .header_fields()
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| SegyError::UnknownHeaderField(field.to_string()))?;
        self.check_trace_range(&traces)?;
        if traces.is_empty() {
            return Ok(Vec::new());
        }

        let block = self
            .headers
            .read_slice(&[traces, column..column + 1])
            .await?;
        Ok(block.iter().copied().collect())
    }

    /// Human-readable description of the dataset
    pub fn summary(&self) -> String {
        let geometry = match &self.metadata.geometry {
            GeometryDescriptor::Unstructured { trace_count } => {
                format!("unstructured, {} traces", trace_count)
            }
            GeometryDescriptor::Structured3D(g) | GeometryDescriptor::Structured2D(g) => {
                let [n_il, n_xl, n_off] = g.shape();
                format!(
                    "{} inlines x {} crosslines x {} offsets, {:?}",
                    n_il, n_xl, n_off, g.sorting
                )
            }
        };
        format!(
            "{}; {} samples per trace; {} duplicates; {} gaps; data: {}",
            geometry,
            self.samples_per_trace(),
            self.metadata.duplicates.len(),
            self.metadata.gaps.len(),
            self.data.layout().summary()
        )
    }
}

/// Grid positions along `axis` of the values `range` selects
fn select_positions(
    geometry: &StructuredGeometry,
    axis: AxisName,
    range: &AxisRange,
) -> Result<Vec<usize>> {
    let spec = geometry.axis(axis);
    Ok(FilteredRange::new(spec)
        .select(range)?
        .into_iter()
        .filter_map(|value| spec.position(value))
        .collect())
}
