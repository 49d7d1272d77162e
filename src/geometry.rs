//! Survey geometry inference
//!
//! SEG-Y stores traces as a flat sequence. [`infer`] recovers the inline ×
//! crossline × offset grid they were laid out on, and the order in which the
//! file walks that grid.
//!
//! All comparisons are on integer header values, so inference is exact and
//! deterministic for a given catalog.

use crate::catalog::HeaderCatalog;
use crate::error::{Result, SegyError};
use crate::types::{Coordinate, HeaderRole};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Minimum number of distinct values one of inline/crossline must have
/// for the survey to be treated as structured
pub const MIN_LINE_VALUES: usize = 2;

/// Largest number of grid cells per trace a structured survey may have.
/// Sparser grids (a 2D line whose inline and crossline both change on every
/// trace, say) are treated as unstructured.
pub const MAX_CELLS_PER_TRACE: usize = 4;

/// Grid axes of a structured survey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisName {
    Inline,
    Crossline,
    Offset,
}

impl AxisName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisName::Inline => "inline",
            AxisName::Crossline => "crossline",
            AxisName::Offset => "offset",
        }
    }

    /// Dimension of this axis in the `[inline, crossline, offset, sample]` data layout
    pub fn dimension(&self) -> usize {
        match self {
            AxisName::Inline => 0,
            AxisName::Crossline => 1,
            AxisName::Offset => 2,
        }
    }
}

impl FromStr for AxisName {
    type Err = SegyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inline" | "iline" | "ilines" => Ok(AxisName::Inline),
            "crossline" | "xline" | "xlines" => Ok(AxisName::Crossline),
            "offset" | "offsets" => Ok(AxisName::Offset),
            _ => Err(SegyError::UnknownAxis(s.to_string())),
        }
    }
}

impl fmt::Display for AxisName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted unique values of one axis.
///
/// Persisted as the plain ascending list; the step is recomputed on load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<i32>", into = "Vec<i32>")]
pub struct AxisSpec {
    values: Vec<i32>,
    step: Option<i32>,
}

impl AxisSpec {
    /// Build an axis from values in any order, duplicates allowed
    pub fn from_values(values: impl IntoIterator<Item = i32>) -> Self {
        let mut values: Vec<i32> = values.into_iter().collect();
        values.sort_unstable();
        values.dedup();
        let step = uniform_step(&values);
        Self { values, step }
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Constant spacing between consecutive values, if there is one
    pub fn step(&self) -> Option<i32> {
        self.step
    }

    /// False when consecutive values are not evenly spaced
    pub fn is_regular(&self) -> bool {
        self.values.len() < 2 || self.step.is_some()
    }

    /// Index of `value` along the axis
    pub fn position(&self, value: i32) -> Option<usize> {
        self.values.binary_search(&value).ok()
    }

    pub fn contains(&self, value: i32) -> bool {
        self.position(value).is_some()
    }

    pub fn min(&self) -> Option<i32> {
        self.values.first().copied()
    }

    pub fn max(&self) -> Option<i32> {
        self.values.last().copied()
    }
}

impl From<Vec<i32>> for AxisSpec {
    fn from(values: Vec<i32>) -> Self {
        Self::from_values(values)
    }
}

impl From<AxisSpec> for Vec<i32> {
    fn from(axis: AxisSpec) -> Self {
        axis.values
    }
}

fn uniform_step(values: &[i32]) -> Option<i32> {
    let mut diffs = values.windows(2).map(|w| i64::from(w[1]) - i64::from(w[0]));
    let first = diffs.next()?;
    if diffs.all(|d| d == first) {
        i32::try_from(first).ok()
    } else {
        None
    }
}

/// Order in which the file walks the inline/crossline plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Inline is the slow axis, crossline changes fastest
    InlineSorted,
    /// Crossline is the slow axis, inline changes fastest
    CrosslineSorted,
}

impl SortOrder {
    pub fn slow_axis(&self) -> AxisName {
        match self {
            SortOrder::InlineSorted => AxisName::Inline,
            SortOrder::CrosslineSorted => AxisName::Crossline,
        }
    }

    pub fn fast_axis(&self) -> AxisName {
        match self {
            SortOrder::InlineSorted => AxisName::Crossline,
            SortOrder::CrosslineSorted => AxisName::Inline,
        }
    }
}

/// Axes and sort order of a structured survey
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructuredGeometry {
    pub inline: AxisSpec,
    pub crossline: AxisSpec,
    pub offset: AxisSpec,
    pub sorting: SortOrder,
    /// Some grid cell has no trace
    pub has_gaps: bool,
}

impl StructuredGeometry {
    pub fn axis(&self, name: AxisName) -> &AxisSpec {
        match name {
            AxisName::Inline => &self.inline,
            AxisName::Crossline => &self.crossline,
            AxisName::Offset => &self.offset,
        }
    }

    /// Grid shape as `[inline, crossline, offset]`
    pub fn shape(&self) -> [usize; 3] {
        [self.inline.len(), self.crossline.len(), self.offset.len()]
    }

    /// Number of grid cells; None when the product overflows
    pub fn cell_count(&self) -> Option<usize> {
        self.shape()
            .iter()
            .try_fold(1usize, |cells, &n| cells.checked_mul(n))
    }

    /// More than one offset per (inline, crossline) pair
    pub fn is_prestack(&self) -> bool {
        self.offset.len() > 1
    }

    /// Grid position `[inline, crossline, offset]` of a coordinate
    pub fn position(&self, coordinate: &Coordinate) -> Option<[usize; 3]> {
        Some([
            self.inline.position(coordinate.inline)?,
            self.crossline.position(coordinate.crossline)?,
            self.offset.position(coordinate.offset)?,
        ])
    }

    /// Coordinate at a grid position; the position must be in bounds
    pub fn coordinate_at(&self, position: [usize; 3]) -> Coordinate {
        Coordinate::new(
            self.inline.values()[position[0]],
            self.crossline.values()[position[1]],
            self.offset.values()[position[2]],
        )
    }

    /// Row-major cell number of a grid position
    pub fn cell(&self, position: [usize; 3]) -> usize {
        let [_, n_xl, n_off] = self.shape();
        (position[0] * n_xl + position[1]) * n_off + position[2]
    }

    /// Grid positions in the order a file with this sorting stores them:
    /// slow axis outermost, offset innermost
    pub fn canonical_positions(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let [n_il, n_xl, n_off] = self.shape();
        let (n_slow, n_fast) = match self.sorting {
            SortOrder::InlineSorted => (n_il, n_xl),
            SortOrder::CrosslineSorted => (n_xl, n_il),
        };
        let sorting = self.sorting;
        (0..n_slow).flat_map(move |slow| {
            (0..n_fast).flat_map(move |fast| {
                (0..n_off).map(move |off| match sorting {
                    SortOrder::InlineSorted => [slow, fast, off],
                    SortOrder::CrosslineSorted => [fast, slow, off],
                })
            })
        })
    }
}

/// Inferred layout of a survey
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum GeometryDescriptor {
    /// Traces are only addressable by physical index
    #[serde(rename = "unstructured")]
    Unstructured { trace_count: usize },
    #[serde(rename = "structured_3d")]
    Structured3D(StructuredGeometry),
    /// Degenerate grid with a single inline or a single crossline
    #[serde(rename = "structured_2d")]
    Structured2D(StructuredGeometry),
}

impl GeometryDescriptor {
    pub fn structured(&self) -> Option<&StructuredGeometry> {
        match self {
            GeometryDescriptor::Unstructured { .. } => None,
            GeometryDescriptor::Structured3D(g) | GeometryDescriptor::Structured2D(g) => Some(g),
        }
    }

    pub fn is_structured(&self) -> bool {
        self.structured().is_some()
    }

    /// Structured geometry or `UnstructuredSurvey`
    pub fn require_structured(&self) -> Result<&StructuredGeometry> {
        self.structured().ok_or_else(|| {
            SegyError::UnstructuredSurvey(
                "traces are only addressable by physical index".to_string(),
            )
        })
    }

    pub fn sorting(&self) -> Option<SortOrder> {
        self.structured().map(|g| g.sorting)
    }
}

/// Distinct values of one header role, in first-seen order, with trace counts
#[derive(Debug, Clone, Default)]
pub struct AxisTally {
    first_seen: Vec<i32>,
    counts: HashMap<i32, usize>,
}

impl AxisTally {
    fn record(&mut self, value: i32) {
        let count = self.counts.entry(value).or_insert(0);
        if *count == 0 {
            self.first_seen.push(value);
        }
        *count += 1;
    }

    pub fn first_seen(&self) -> &[i32] {
        &self.first_seen
    }

    /// Number of traces carrying `value`
    pub fn count(&self, value: i32) -> usize {
        self.counts.get(&value).copied().unwrap_or(0)
    }

    pub fn distinct(&self) -> usize {
        self.first_seen.len()
    }

    pub fn to_axis(&self) -> AxisSpec {
        AxisSpec::from_values(self.first_seen.iter().copied())
    }
}

/// One pass over a catalog: distinct axis values and how often inline and
/// crossline change between consecutive traces
#[derive(Debug, Clone, Default)]
pub struct SurveyScan {
    pub inline: AxisTally,
    pub crossline: AxisTally,
    pub offset: AxisTally,
    pub inline_changes: usize,
    pub crossline_changes: usize,
    pub distinct_coordinates: usize,
    pub trace_count: usize,
}

impl SurveyScan {
    pub fn new(catalog: &HeaderCatalog) -> Self {
        let mut scan = SurveyScan {
            trace_count: catalog.len(),
            ..Default::default()
        };
        let mut coordinates = HashSet::with_capacity(catalog.len());
        let mut previous: Option<(i32, i32)> = None;

        for header in catalog.iter() {
            scan.inline.record(header.get(HeaderRole::Inline));
            scan.crossline.record(header.get(HeaderRole::Crossline));
            scan.offset.record(header.get(HeaderRole::Offset));
            coordinates.insert(header.coordinate());

            if let Some((il, xl)) = previous {
                if il != header.inline {
                    scan.inline_changes += 1;
                }
                if xl != header.crossline {
                    scan.crossline_changes += 1;
                }
            }
            previous = Some((header.inline, header.crossline));
        }

        scan.distinct_coordinates = coordinates.len();
        scan
    }

    /// The axis that changes most often is fast; ties keep inline slow
    pub fn sorting(&self) -> SortOrder {
        if self.inline_changes > self.crossline_changes {
            SortOrder::CrosslineSorted
        } else {
            SortOrder::InlineSorted
        }
    }
}

/// Infer the survey geometry of a header catalog
pub fn infer(catalog: &HeaderCatalog) -> GeometryDescriptor {
    let scan = SurveyScan::new(catalog);
    let trace_count = catalog.len();

    if scan.inline.distinct() < MIN_LINE_VALUES && scan.crossline.distinct() < MIN_LINE_VALUES {
        tracing::info!(
            traces = trace_count,
            inlines = scan.inline.distinct(),
            crosslines = scan.crossline.distinct(),
            "Survey has no line structure, treating as unstructured"
        );
        return GeometryDescriptor::Unstructured { trace_count };
    }

    let geometry = StructuredGeometry {
        inline: scan.inline.to_axis(),
        crossline: scan.crossline.to_axis(),
        offset: scan.offset.to_axis(),
        sorting: scan.sorting(),
        has_gaps: false,
    };
    let cells = match geometry.cell_count() {
        Some(cells) if cells <= trace_count.saturating_mul(MAX_CELLS_PER_TRACE) => cells,
        cells => {
            tracing::warn!(
                traces = trace_count,
                cells = ?cells,
                max_cells_per_trace = MAX_CELLS_PER_TRACE,
                "Grid is too sparse for its traces, treating as unstructured"
            );
            return GeometryDescriptor::Unstructured { trace_count };
        }
    };
    let has_gaps = scan.distinct_coordinates < cells;
    let geometry = StructuredGeometry {
        has_gaps,
        ..geometry
    };

    if has_gaps {
        tracing::warn!(
            traces = trace_count,
            cells,
            distinct = scan.distinct_coordinates,
            "Irregular survey: grid has cells without traces"
        );
    }
    for (name, axis) in [
        (AxisName::Inline, &geometry.inline),
        (AxisName::Crossline, &geometry.crossline),
        (AxisName::Offset, &geometry.offset),
    ] {
        if !axis.is_regular() {
            tracing::debug!(axis = %name, values = axis.len(), "Axis values are not evenly spaced");
        }
    }

    tracing::info!(
        inlines = geometry.inline.len(),
        crosslines = geometry.crossline.len(),
        offsets = geometry.offset.len(),
        sorting = ?geometry.sorting,
        "Inferred structured geometry"
    );

    if geometry.inline.len() == 1 || geometry.crossline.len() == 1 {
        GeometryDescriptor::Structured2D(geometry)
    } else {
        GeometryDescriptor::Structured3D(geometry)
    }
}
