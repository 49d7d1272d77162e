//! Coordinate → trace lookup for structured surveys
//!
//! [`build`] walks the catalog once, drops every trace into its grid cell and
//! reports what does not fit a bijection: coordinates claimed by more than
//! one trace ([`DuplicateReport`]) and cells no trace claims ([`GapReport`]).
//!
//! Which of two traces sharing a coordinate wins is a [`DuplicatePolicy`].
//! The default keeps the first trace in file order.

use crate::catalog::HeaderCatalog;
use crate::error::{Result, SegyError};
use crate::geometry::{GeometryDescriptor, StructuredGeometry};
use crate::types::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What to do when two traces share a coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Map the coordinate to the first trace in file order
    #[default]
    KeepFirst,
    /// Map the coordinate to the last trace in file order
    KeepLast,
    /// Abort with `DuplicateCoordinate`
    Reject,
}

/// A coordinate claimed by more than one trace. Not an error: ingestion goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCoordinateWarning {
    pub coordinate: Coordinate,
    /// Trace the index maps the coordinate to
    pub kept: usize,
    /// Trace left out of the index
    pub discarded: usize,
}

/// Every duplicate found while building an index, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateReport {
    entries: Vec<DuplicateCoordinateWarning>,
}

impl DuplicateReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DuplicateCoordinateWarning> {
        self.entries.iter()
    }

    /// Distinct coordinates with more than one trace
    pub fn coordinates(&self) -> BTreeSet<Coordinate> {
        self.entries.iter().map(|e| e.coordinate).collect()
    }

    /// Traces absent from the index, ascending
    pub fn discarded_traces(&self) -> Vec<usize> {
        let mut traces: Vec<usize> = self.entries.iter().map(|e| e.discarded).collect();
        traces.sort_unstable();
        traces
    }
}

/// Grid cells without a trace, ascending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    gaps: Vec<Coordinate>,
}

impl GapReport {
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.gaps.binary_search(coordinate).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coordinate> {
        self.gaps.iter()
    }
}

/// Serialized form of a [`TraceIndex`].
///
/// A sequential index (file order is exactly the canonical grid walk) carries
/// no pairs; anything else lists every `([inline, crossline, offset], trace)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIndex {
    pub sequential: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pairs: Vec<([i32; 3], usize)>,
}

/// Dense lookup from grid cell to physical trace number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceIndex {
    geometry: StructuredGeometry,
    cells: Vec<Option<u32>>,
}

impl TraceIndex {
    fn empty(geometry: &StructuredGeometry) -> Result<Self> {
        let cells = geometry.cell_count().ok_or_else(|| {
            SegyError::InvalidDimensions("grid cell count overflows the address space".to_string())
        })?;
        Ok(Self {
            cells: vec![None; cells],
            geometry: geometry.clone(),
        })
    }

    pub fn geometry(&self) -> &StructuredGeometry {
        &self.geometry
    }

    /// Trace at a coordinate, None for gaps and off-grid coordinates
    pub fn get(&self, coordinate: &Coordinate) -> Option<usize> {
        let position = self.geometry.position(coordinate)?;
        self.get_position(position)
    }

    /// Trace at a grid position `[inline, crossline, offset]`
    pub fn get_position(&self, position: [usize; 3]) -> Option<usize> {
        self.cells
            .get(self.geometry.cell(position))
            .copied()
            .flatten()
            .map(|t| t as usize)
    }

    /// Number of mapped cells
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mapped `(coordinate, trace)` pairs in ascending coordinate order
    pub fn iter(&self) -> impl Iterator<Item = (Coordinate, usize)> + '_ {
        let [n_il, n_xl, n_off] = self.geometry.shape();
        (0..n_il)
            .flat_map(move |il| (0..n_xl).flat_map(move |xl| (0..n_off).map(move |off| [il, xl, off])))
            .filter_map(move |position| {
                self.get_position(position)
                    .map(|trace| (self.geometry.coordinate_at(position), trace))
            })
    }

    /// Grid position of every physical trace; None for traces not in the index
    pub fn trace_positions(&self, trace_count: usize) -> Vec<Option<[usize; 3]>> {
        let mut positions = vec![None; trace_count];
        for (coordinate, trace) in self.iter() {
            if let (Some(slot), Some(position)) =
                (positions.get_mut(trace), self.geometry.position(&coordinate))
            {
                *slot = Some(position);
            }
        }
        positions
    }

    /// File order is exactly the canonical walk of a gap-free grid
    pub fn is_sequential(&self) -> bool {
        self.geometry
            .canonical_positions()
            .enumerate()
            .all(|(trace, position)| self.get_position(position) == Some(trace))
    }

    pub fn to_persisted(&self) -> PersistedIndex {
        if self.is_sequential() {
            return PersistedIndex {
                sequential: true,
                pairs: Vec::new(),
            };
        }
        PersistedIndex {
            sequential: false,
            pairs: self
                .iter()
                .map(|(c, trace)| ([c.inline, c.crossline, c.offset], trace))
                .collect(),
        }
    }

    /// Rebuild an index persisted alongside `geometry`
    pub fn from_persisted(geometry: &StructuredGeometry, persisted: &PersistedIndex) -> Result<Self> {
        let mut index = Self::empty(geometry)?;
        if persisted.sequential {
            for (trace, position) in geometry.canonical_positions().enumerate() {
                let cell = geometry.cell(position);
                index.cells[cell] = Some(to_trace_id(trace)?);
            }
            return Ok(index);
        }

        for &([il, xl, off], trace) in &persisted.pairs {
            let coordinate = Coordinate::new(il, xl, off);
            let position = geometry.position(&coordinate).ok_or_else(|| {
                SegyError::Metadata(format!("indexed coordinate {coordinate} is off the grid"))
            })?;
            let cell = geometry.cell(position);
            if index.cells[cell].is_some() {
                return Err(SegyError::Metadata(format!(
                    "coordinate {coordinate} indexed twice"
                )));
            }
            index.cells[cell] = Some(to_trace_id(trace)?);
        }
        Ok(index)
    }
}

fn to_trace_id(trace: usize) -> Result<u32> {
    u32::try_from(trace)
        .map_err(|_| SegyError::InvalidDimensions(format!("trace number {trace} exceeds u32")))
}

/// Build the index of a structured survey with the default duplicate policy
pub fn build(
    catalog: &HeaderCatalog,
    descriptor: &GeometryDescriptor,
) -> Result<(TraceIndex, DuplicateReport, GapReport)> {
    build_with_policy(catalog, descriptor, DuplicatePolicy::default())
}

/// Build the index of a structured survey
pub fn build_with_policy(
    catalog: &HeaderCatalog,
    descriptor: &GeometryDescriptor,
    policy: DuplicatePolicy,
) -> Result<(TraceIndex, DuplicateReport, GapReport)> {
    let geometry = descriptor.require_structured()?;
    let mut index = TraceIndex::empty(geometry)?;
    let mut duplicates = DuplicateReport::default();

    for (trace, header) in catalog.iter().enumerate() {
        let coordinate = header.coordinate();
        let position = geometry.position(&coordinate).ok_or_else(|| {
            SegyError::InvalidDimensions(format!(
                "trace {trace} at {coordinate} is not on the inferred grid"
            ))
        })?;
        let cell = geometry.cell(position);
        let trace_id = to_trace_id(trace)?;

        let Some(existing) = index.cells[cell] else {
            index.cells[cell] = Some(trace_id);
            continue;
        };
        let first = existing as usize;
        let warning = match policy {
            DuplicatePolicy::KeepFirst => DuplicateCoordinateWarning {
                coordinate,
                kept: first,
                discarded: trace,
            },
            DuplicatePolicy::KeepLast => {
                index.cells[cell] = Some(trace_id);
                DuplicateCoordinateWarning {
                    coordinate,
                    kept: trace,
                    discarded: first,
                }
            }
            DuplicatePolicy::Reject => {
                return Err(SegyError::DuplicateCoordinate {
                    coordinate,
                    first,
                    duplicate: trace,
                })
            }
        };
        tracing::warn!(
            coordinate = %coordinate,
            kept = warning.kept,
            discarded = warning.discarded,
            "Duplicate trace coordinate"
        );
        duplicates.entries.push(warning);
    }

    let [n_il, n_xl, n_off] = geometry.shape();
    let mut gaps = GapReport::default();
    for il in 0..n_il {
        for xl in 0..n_xl {
            for off in 0..n_off {
                let position = [il, xl, off];
                if index.get_position(position).is_none() {
                    gaps.gaps.push(geometry.coordinate_at(position));
                }
            }
        }
    }

    if !gaps.is_empty() {
        tracing::warn!(gaps = gaps.len(), "Grid cells without traces");
    }
    tracing::info!(
        mapped = catalog.len() - duplicates.len(),
        duplicates = duplicates.len(),
        gaps = gaps.len(),
        "Built trace index"
    );

    Ok((index, duplicates, gaps))
}
