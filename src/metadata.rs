//! Dataset metadata persisted next to the arrays

use crate::catalog::HeaderFieldMap;
use crate::error::{Result, SegyError};
use crate::geometry::GeometryDescriptor;
use crate::index::{DuplicatePolicy, DuplicateReport, GapReport, PersistedIndex, TraceIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata document key of a converted dataset
pub const DATASET_METADATA_KEY: &str = "dataset";

/// Trace samples, `[inline, crossline, offset, sample]` or `[trace, sample]`
pub const DATA_ARRAY: &str = "data";

/// Every header field of every trace, `[trace, field]`
pub const HEADERS_ARRAY: &str = "headers";

/// Samples of traces left out of the grid by the duplicate policy, `[n, sample]`
pub const DUPLICATES_ARRAY: &str = "duplicates";

/// Names of the arrays written by one ingestion.
///
/// Every ingestion writes its arrays under a fresh generation group, so a
/// retried ingestion never collides with the leftovers of an interrupted one.
/// Only the names recorded here are ever read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetArrays {
    /// Group shared by the arrays of this ingestion
    pub generation: String,
    pub data: String,
    pub headers: String,
    /// Present when the duplicate policy discarded traces
    pub duplicates: Option<String>,
}

impl DatasetArrays {
    /// Array names under a new random generation
    pub fn generate() -> Self {
        Self::scoped(uuid::Uuid::new_v4().to_string())
    }

    pub fn scoped(generation: impl Into<String>) -> Self {
        let generation = generation.into();
        Self {
            data: format!("{generation}/{DATA_ARRAY}"),
            headers: format!("{generation}/{HEADERS_ARRAY}"),
            duplicates: None,
            generation,
        }
    }

    /// Name the duplicates array would have in this generation
    pub fn duplicates_name(&self) -> String {
        format!("{}/{}", self.generation, DUPLICATES_ARRAY)
    }
}

/// Dataset format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// SEG-Y file-level headers carried over from the source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegyMetadata {
    /// Textual headers
    pub text_header: Vec<String>,

    /// Binary header fields
    pub binary_header: BTreeMap<String, i64>,

    /// Raw header fields used for each geometry role
    pub trace_header_mappings: HeaderFieldMap,
}

/// Everything a reader needs besides the arrays themselves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Format version
    pub version: FormatVersion,

    /// Conversion timestamp
    pub created_at: DateTime<Utc>,

    /// Number of traces in the source file
    pub trace_count: usize,

    /// Time or depth of every sample
    pub sample_axis: Vec<f64>,

    /// Column names of the headers array
    pub header_fields: Vec<String>,

    pub geometry: GeometryDescriptor,

    pub arrays: DatasetArrays,

    /// Coordinate lookup; present for structured geometries
    pub index: Option<PersistedIndex>,

    pub duplicate_policy: DuplicatePolicy,

    pub duplicates: DuplicateReport,

    pub gaps: GapReport,

    pub segy: SegyMetadata,

    /// Custom metadata key-value pairs
    pub custom_metadata: BTreeMap<String, String>,
}

impl DatasetMetadata {
    pub fn new(geometry: GeometryDescriptor, trace_count: usize, sample_axis: Vec<f64>) -> Self {
        Self {
            version: FormatVersion::default(),
            created_at: Utc::now(),
            trace_count,
            sample_axis,
            header_fields: Vec::new(),
            geometry,
            arrays: DatasetArrays::generate(),
            index: None,
            duplicate_policy: DuplicatePolicy::default(),
            duplicates: DuplicateReport::default(),
            gaps: GapReport::default(),
            segy: SegyMetadata::default(),
            custom_metadata: BTreeMap::new(),
        }
    }

    /// Attach a built index and the reports produced with it
    pub fn with_index(
        mut self,
        index: &TraceIndex,
        policy: DuplicatePolicy,
        duplicates: DuplicateReport,
        gaps: GapReport,
    ) -> Self {
        self.index = Some(index.to_persisted());
        self.duplicate_policy = policy;
        self.duplicates = duplicates;
        self.gaps = gaps;
        self
    }

    pub fn with_arrays(mut self, arrays: DatasetArrays) -> Self {
        self.arrays = arrays;
        self
    }

    pub fn with_header_fields(mut self, fields: Vec<String>) -> Self {
        self.header_fields = fields;
        self
    }

    pub fn with_segy_metadata(mut self, segy: SegyMetadata) -> Self {
        self.segy = segy;
        self
    }

    /// Add custom metadata
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_metadata.insert(key.into(), value.into());
    }

    /// Get custom metadata
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.custom_metadata.get(key).map(|s| s.as_str())
    }

    pub fn samples_per_trace(&self) -> usize {
        self.sample_axis.len()
    }

    /// Rebuild the coordinate lookup; None for unstructured datasets
    pub fn trace_index(&self) -> Result<Option<TraceIndex>> {
        let Some(geometry) = self.geometry.structured() else {
            return Ok(None);
        };
        let persisted = self.index.as_ref().ok_or_else(|| {
            SegyError::Metadata("structured dataset without a trace index".to_string())
        })?;
        TraceIndex::from_persisted(geometry, persisted).map(Some)
    }

    /// Reject metadata written by an incompatible format version
    pub fn check_version(&self) -> Result<()> {
        if self.version.is_compatible(&FormatVersion::CURRENT) {
            Ok(())
        } else {
            Err(SegyError::Metadata(format!(
                "unsupported dataset format {}.{}",
                self.version.major, self.version.minor
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::HeaderCatalog;
    use crate::geometry::infer;
    use crate::index::build;
    use crate::types::TraceHeader;

    fn catalog() -> HeaderCatalog {
        let mut headers = Vec::new();
        for inline in [1, 2] {
            for crossline in [5, 6] {
                headers.push(TraceHeader {
                    inline,
                    crossline,
                    ..Default::default()
                });
            }
        }
        HeaderCatalog::from_headers(headers)
    }

    #[test]
    fn test_version_compatibility() {
        let v1_0 = FormatVersion::new(1, 0);
        let v1_3 = FormatVersion::new(1, 3);
        let v2_0 = FormatVersion::new(2, 0);

        assert!(v1_0.is_compatible(&v1_3));
        assert!(!v1_0.is_compatible(&v2_0));
    }

    #[test]
    fn test_json_round_trip_restores_index() {
        let catalog = catalog();
        let descriptor = infer(&catalog);
        let (index, duplicates, gaps) = build(&catalog, &descriptor).unwrap();

        let mut metadata = DatasetMetadata::new(descriptor, catalog.len(), vec![0.0, 4.0])
            .with_index(&index, DuplicatePolicy::KeepFirst, duplicates, gaps);
        metadata.add_metadata("survey", "North Sea 3D");

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"kind\":\"structured_3d\""));
        assert!(json.contains("\"inline\":[1,2]"));

        let restored: DatasetMetadata = serde_json::from_str(&json).unwrap();
        restored.check_version().unwrap();
        assert_eq!(restored.geometry, metadata.geometry);
        assert_eq!(restored.arrays, metadata.arrays);
        assert_eq!(restored.trace_index().unwrap(), Some(index));
        assert_eq!(restored.get_metadata("survey"), Some("North Sea 3D"));
        assert_eq!(restored.samples_per_trace(), 2);
    }

    #[test]
    fn test_array_names_share_a_generation() {
        let arrays = DatasetArrays::scoped("g1");
        assert_eq!(arrays.data, "g1/data");
        assert_eq!(arrays.headers, "g1/headers");
        assert_eq!(arrays.duplicates, None);
        assert_eq!(arrays.duplicates_name(), "g1/duplicates");

        assert_ne!(DatasetArrays::generate().generation, DatasetArrays::generate().generation);
    }

    #[test]
    fn test_unstructured_has_no_index() {
        let metadata =
            DatasetMetadata::new(GeometryDescriptor::Unstructured { trace_count: 3 }, 3, vec![]);
        assert_eq!(metadata.trace_index().unwrap(), None);
    }

    #[test]
    fn test_structured_without_index_is_an_error() {
        let descriptor = infer(&catalog());
        let metadata = DatasetMetadata::new(descriptor, 4, vec![]);
        assert!(matches!(
            metadata.trace_index(),
            Err(SegyError::Metadata(_))
        ));
    }
}
